//!
//! commentboard client view
//! ------------------------
//! Terminal-side counterpart of the comments endpoint: a two-state view
//! (LoggedOut / LoggedIn) driven by identity-provider session changes, holding the
//! in-memory comment list and the draft, and talking to the endpoint through
//! `CommentsApi`.

pub mod api;
pub mod render;
pub mod view;

pub use api::{ClientError, CommentsApi, HttpCommentsApi};
pub use view::{ClientView, SubmitMode, SubmitOutcome, ViewOptions, ViewState};
