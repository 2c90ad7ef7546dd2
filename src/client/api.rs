use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Url;

use crate::model::{Comment, CreateCommentRequest, CreateCommentResponse, ErrorResponse, ListCommentsResponse};
use crate::server::COMMENTS_PATH;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() { ClientError::Decode(e.to_string()) } else { ClientError::Transport(e.to_string()) }
    }
}

/// The comments endpoint as the client view uses it.
#[async_trait]
pub trait CommentsApi: Send + Sync {
    async fn list(&self) -> Result<Vec<Comment>, ClientError>;
    async fn create(&self, req: &CreateCommentRequest, access_token: Option<&str>) -> Result<Comment, ClientError>;
}

/// `CommentsApi` over HTTP with reqwest.
#[derive(Clone)]
pub struct HttpCommentsApi {
    endpoint: Url,
    client: reqwest::Client,
}

impl HttpCommentsApi {
    pub fn new(base: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base)?;
        let endpoint = base_url.join(COMMENTS_PATH)?;
        Ok(Self { endpoint, client: reqwest::Client::new() })
    }

    pub fn endpoint(&self) -> &Url { &self.endpoint }
}

/// Error body of a failed call; falls back to the status line when the body is
/// not the endpoint's `{ error }` shape.
async fn status_error(resp: reqwest::Response) -> ClientError {
    let status = resp.status();
    let message = match resp.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
    };
    ClientError::Status { status: status.as_u16(), message }
}

#[async_trait]
impl CommentsApi for HttpCommentsApi {
    async fn list(&self) -> Result<Vec<Comment>, ClientError> {
        let resp = self.client.get(self.endpoint.clone()).send().await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        let body: ListCommentsResponse = resp.json().await?;
        Ok(body.comments)
    }

    async fn create(&self, req: &CreateCommentRequest, access_token: Option<&str>) -> Result<Comment, ClientError> {
        let mut builder = self.client.post(self.endpoint.clone()).json(req);
        if let Some(token) = access_token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let resp = builder.send().await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        let body: CreateCommentResponse = resp.json().await?;
        Ok(body.comment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_resolved_against_base() {
        let api = HttpCommentsApi::new("http://127.0.0.1:7979/some/page").unwrap();
        assert_eq!(api.endpoint().as_str(), "http://127.0.0.1:7979/api/comments");
        assert!(HttpCommentsApi::new("not a url").is_err());
    }

    #[test]
    fn error_display() {
        let e = ClientError::Status { status: 400, message: "Missing author or text".into() };
        assert_eq!(e.to_string(), "HTTP 400: Missing author or text");
    }
}
