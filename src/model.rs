//!
//! commentboard data model
//! -----------------------
//! `Comment` is the persisted record; it is created once by a store insert and never
//! changed afterwards. `CreateCommentRequest` is the loose wire shape of a create
//! call and `NewComment` the validated form that stores accept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, AppResult};

/// Store-assigned identifier. Hosted tables commonly use integer identity columns
/// while the local stores use UUIDs, so both decode into the same string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CommentId(pub String);

impl<'de> Deserialize<'de> for CommentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Int(i64),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => CommentId(s),
            Raw::Int(n) => CommentId(n.to_string()),
        })
    }
}

impl CommentId {
    pub fn new_v4() -> Self { CommentId(uuid::Uuid::new_v4().to_string()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for CommentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub text: String,
    pub author: String,
    /// Assigned by the store at insert time; retrieval order key.
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/comments`. Both fields are optional on the wire so that an
/// absent field is a validation failure rather than a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

/// A create request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub text: String,
    pub author: String,
}

impl CreateCommentRequest {
    pub fn new(text: impl Into<String>, author: impl Into<String>) -> Self {
        Self { text: Some(text.into()), author: Some(author.into()) }
    }

    /// Both fields must be present and non-empty. Values are kept exactly as
    /// submitted; whitespace-only text is a valid comment here.
    pub fn validate(self) -> AppResult<NewComment> {
        let present = |v: &Option<String>| v.as_deref().map(|s| !s.is_empty()).unwrap_or(false);
        if !present(&self.text) || !present(&self.author) {
            return Err(AppError::missing_fields());
        }
        match (self.text, self.author) {
            (Some(text), Some(author)) => Ok(NewComment { text, author }),
            _ => Err(AppError::missing_fields()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListCommentsResponse {
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommentResponse {
    pub comment: Comment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_non_empty_fields() {
        let ok = CreateCommentRequest::new("hello", "a@x.com").validate().unwrap();
        assert_eq!(ok, NewComment { text: "hello".into(), author: "a@x.com".into() });
    }

    #[test]
    fn validate_keeps_surrounding_whitespace() {
        let ok = CreateCommentRequest::new("  hi ", "a@x.com").validate().unwrap();
        assert_eq!(ok.text, "  hi ");
    }

    #[test]
    fn validate_accepts_whitespace_only_values() {
        let ok = CreateCommentRequest::new("   ", " a@x.com").validate().unwrap();
        assert_eq!(ok, NewComment { text: "   ".into(), author: " a@x.com".into() });
    }

    #[test]
    fn validate_rejects_missing_or_empty() {
        for req in [
            CreateCommentRequest::new("", "a@x.com"),
            CreateCommentRequest::new("hello", ""),
            CreateCommentRequest { text: None, author: Some("a@x.com".into()) },
            CreateCommentRequest { text: Some("hello".into()), author: None },
            CreateCommentRequest::default(),
        ] {
            let err = req.validate().unwrap_err();
            assert_eq!(err.http_status(), 400);
            assert_eq!(err.message(), "Missing author or text");
        }
    }

    #[test]
    fn comment_id_accepts_numbers_and_strings() {
        let c: Comment = serde_json::from_str(
            r#"{"id":42,"text":"t","author":"a@x.com","created_at":"2025-03-01T10:00:00.123456+00:00"}"#,
        ).unwrap();
        assert_eq!(c.id.as_str(), "42");
        let c: Comment = serde_json::from_str(
            r#"{"id":"9f1c","text":"t","author":"a@x.com","created_at":"2025-03-01T10:00:00Z"}"#,
        ).unwrap();
        assert_eq!(c.id, CommentId("9f1c".into()));
    }
}
