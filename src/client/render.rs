use std::fmt::{Display, Write as _};

use chrono::TimeZone;

use crate::identity::Session;
use crate::model::Comment;

pub const LOGIN_PROMPT: &str = "Please log in to view comments";
pub const LOGIN_BUTTON: &str = "[Sign in with Google]";
pub const SIGN_OUT_BUTTON: &str = "[Sign Out]";

/// Text UI for one view state. Timestamps are shown in `tz`.
pub fn render<Tz>(session: Option<&Session>, comments: &[Comment], draft: &str, posting: bool, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut out = String::new();
    let Some(session) = session else {
        let _ = writeln!(out, "{}", LOGIN_PROMPT);
        let _ = writeln!(out, "{}", LOGIN_BUTTON);
        return out;
    };

    let _ = writeln!(out, "Logged in as: {}  {}", session.email(), SIGN_OUT_BUTTON);
    let _ = writeln!(out);
    let _ = writeln!(out, "Comments");
    if comments.is_empty() {
        let _ = writeln!(out, "  (no comments yet)");
    }
    for c in comments {
        let when = c.created_at.with_timezone(tz).format("%Y-%m-%d %H:%M:%S");
        let _ = writeln!(out, "  {}: {}", c.author, c.text);
        let _ = writeln!(out, "    {}", when);
    }
    let _ = writeln!(out);
    let control = if posting { "[Posting...]" } else { "[Post]" };
    let _ = writeln!(out, "> {}  {}", draft, control);
    out
}
