//! Client view state machine.
//!
//! Two top-level states, LoggedOut and LoggedIn, driven by the identity provider.
//! All state sits behind one mutex that is never held across an await; each
//! transition bumps an epoch so responses that arrive after the view has moved on
//! are dropped instead of applied.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::api::{ClientError, CommentsApi};
use super::render;
use crate::identity::{AuthEvent, IdentityProvider, OAuthProvider, ProviderError, Session, Subscription};
use crate::model::{Comment, CreateCommentRequest};

/// What the view does with the collection after a successful submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitMode {
    /// Append the returned record locally. Order can drift from the store's
    /// under concurrent writers until the next list.
    #[default]
    Append,
    /// Replace the collection with a fresh list, giving store order.
    Refetch,
}

#[derive(Debug, Clone)]
pub struct ViewOptions {
    /// Redirect target handed to the provider on login.
    pub origin: String,
    pub oauth_provider: OAuthProvider,
    pub submit_mode: SubmitMode,
}

impl ViewOptions {
    pub fn new(origin: impl Into<String>) -> Self {
        Self { origin: origin.into(), oauth_provider: OAuthProvider::Google, submit_mode: SubmitMode::Append }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    LoggedOut,
    LoggedIn(Session),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Posted(Comment),
    /// Draft was empty after trimming; nothing sent.
    EmptyDraft,
    /// A submit is already in flight.
    Busy,
    NotLoggedIn,
    Failed(String),
    /// The create succeeded but the view had left that session meanwhile.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    EnteredLoggedIn,
    EnteredLoggedOut,
    Refreshed,
    Unchanged,
}

#[derive(Debug, Default)]
struct ViewModel {
    session: Option<Session>,
    comments: Vec<Comment>,
    draft: String,
    posting: bool,
    epoch: u64,
}

struct SessionChange {
    event: AuthEvent,
    session: Option<Session>,
}

pub struct ClientView {
    identity: Arc<dyn IdentityProvider>,
    api: Arc<dyn CommentsApi>,
    options: ViewOptions,
    model: Mutex<ViewModel>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<SessionChange>>,
    subscription: Mutex<Option<Subscription>>,
}

fn same_principal(a: &Session, b: &Session) -> bool {
    a.principal.email.eq_ignore_ascii_case(&b.principal.email)
}

impl ClientView {
    /// Subscribe to session changes, then settle the initial state from the
    /// provider's current session.
    pub async fn start(identity: Arc<dyn IdentityProvider>, api: Arc<dyn CommentsApi>, options: ViewOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = identity.subscribe(Arc::new(move |event: AuthEvent, session: Option<Session>| {
            let _ = tx.send(SessionChange { event, session });
        }));
        let view = Self {
            identity,
            api,
            options,
            model: Mutex::new(ViewModel::default()),
            events: tokio::sync::Mutex::new(rx),
            subscription: Mutex::new(Some(subscription)),
        };
        let initial = view.identity.get_current_session().await;
        view.apply_session(initial).await;
        view
    }

    pub fn state(&self) -> ViewState {
        match &self.model.lock().session {
            Some(s) => ViewState::LoggedIn(s.clone()),
            None => ViewState::LoggedOut,
        }
    }

    pub fn is_logged_in(&self) -> bool { self.model.lock().session.is_some() }

    pub fn comments(&self) -> Vec<Comment> { self.model.lock().comments.clone() }

    pub fn draft(&self) -> String { self.model.lock().draft.clone() }

    pub fn set_draft(&self, text: impl Into<String>) { self.model.lock().draft = text.into(); }

    pub fn is_posting(&self) -> bool { self.model.lock().posting }

    /// Text rendering of the current state.
    pub fn render(&self) -> String {
        let m = self.model.lock();
        render::render(m.session.as_ref(), &m.comments, &m.draft, m.posting, &chrono::Local)
    }

    /// Apply every session change queued by the subscription; returns how many.
    pub async fn process_events(&self) -> usize {
        let mut applied = 0;
        loop {
            let next = self.events.lock().await.try_recv();
            match next {
                Ok(change) => {
                    self.apply_change(change).await;
                    applied += 1;
                }
                Err(_) => break,
            }
        }
        applied
    }

    /// Wait for the next session change and apply it. `None` once the provider
    /// side of the subscription is gone.
    pub async fn next_event(&self) -> Option<AuthEvent> {
        let change = self.events.lock().await.recv().await?;
        let event = change.event;
        self.apply_change(change).await;
        Some(event)
    }

    async fn apply_change(&self, change: SessionChange) {
        debug!(target: "client", event = ?change.event, "session change");
        self.apply_session(change.session).await;
    }

    /// Move to the state `session` implies. Entering LoggedIn lists once.
    async fn apply_session(&self, session: Option<Session>) -> Transition {
        let (transition, epoch) = {
            let mut m = self.model.lock();
            let had_session = m.session.is_some();
            let same = match (m.session.as_ref(), session.as_ref()) {
                (Some(cur), Some(next)) => same_principal(cur, next),
                _ => false,
            };
            let transition = match (had_session, session) {
                (false, None) => Transition::Unchanged,
                (true, None) => {
                    m.session = None;
                    m.comments.clear();
                    m.draft.clear();
                    m.posting = false;
                    m.epoch += 1;
                    Transition::EnteredLoggedOut
                }
                (false, Some(s)) => {
                    m.session = Some(s);
                    m.epoch += 1;
                    Transition::EnteredLoggedIn
                }
                (true, Some(s)) if same => {
                    m.session = Some(s);
                    Transition::Refreshed
                }
                (true, Some(s)) => {
                    m.session = Some(s);
                    m.draft.clear();
                    m.posting = false;
                    m.epoch += 1;
                    Transition::EnteredLoggedIn
                }
            };
            (transition, m.epoch)
        };
        match transition {
            Transition::EnteredLoggedIn => {
                info!(target: "client", "logged in");
                let _ = self.fetch_comments(epoch).await;
            }
            Transition::EnteredLoggedOut => info!(target: "client", "logged out"),
            Transition::Refreshed | Transition::Unchanged => {}
        }
        transition
    }

    /// List and replace the collection if the view is still in `epoch`.
    /// Failures are logged and leave the current list in place.
    async fn fetch_comments(&self, epoch: u64) -> Result<usize, ClientError> {
        match self.api.list().await {
            Ok(list) => {
                let mut m = self.model.lock();
                if m.epoch != epoch {
                    debug!(target: "client", "dropping list response from a previous session");
                    return Ok(0);
                }
                m.comments = list;
                Ok(m.comments.len())
            }
            Err(e) => {
                warn!(target: "client", "failed to fetch comments: {}", e);
                Err(e)
            }
        }
    }

    /// Reload the collection on demand while logged in.
    pub async fn reload(&self) -> Result<usize, ClientError> {
        let epoch = {
            let m = self.model.lock();
            if m.session.is_none() {
                return Ok(0);
            }
            m.epoch
        };
        self.fetch_comments(epoch).await
    }

    pub async fn submit(&self) -> SubmitOutcome {
        let (req, token, epoch) = {
            let mut m = self.model.lock();
            let Some(session) = m.session.as_ref() else { return SubmitOutcome::NotLoggedIn; };
            if m.draft.trim().is_empty() {
                return SubmitOutcome::EmptyDraft;
            }
            if m.posting {
                return SubmitOutcome::Busy;
            }
            let req = CreateCommentRequest::new(m.draft.clone(), session.principal.email.clone());
            let token = session.access_token.clone();
            m.posting = true;
            (req, token, m.epoch)
        };
        let submitted = req.text.clone().unwrap_or_default();

        let outcome = match self.api.create(&req, Some(&token)).await {
            Ok(comment) => {
                let current = {
                    let mut m = self.model.lock();
                    if m.epoch == epoch {
                        if self.options.submit_mode == SubmitMode::Append {
                            m.comments.push(comment.clone());
                        }
                        // Keep anything typed while the post was in flight.
                        if m.draft == submitted {
                            m.draft.clear();
                        }
                        true
                    } else {
                        false
                    }
                };
                if !current {
                    debug!(target: "client", id = %comment.id, "dropping create response from a previous session");
                    SubmitOutcome::Discarded
                } else {
                    if self.options.submit_mode == SubmitMode::Refetch {
                        let _ = self.fetch_comments(epoch).await;
                    }
                    SubmitOutcome::Posted(comment)
                }
            }
            Err(e) => {
                error!(target: "client", "failed to post comment: {}", e);
                SubmitOutcome::Failed(e.to_string())
            }
        };

        let mut m = self.model.lock();
        if m.epoch == epoch {
            m.posting = false;
        }
        outcome
    }

    /// Start the provider's OAuth flow back to this view's origin. The flow's
    /// outcome arrives later as a session change.
    pub async fn login(&self) -> Result<(), ProviderError> {
        let res = self.identity.sign_in_with_oauth(self.options.oauth_provider, &self.options.origin).await;
        if let Err(e) = &res {
            error!(target: "client", "login failed: {}", e);
        }
        res
    }

    /// Sign out with the provider, then go to LoggedOut whatever it answered.
    pub async fn sign_out(&self) {
        if let Err(e) = self.identity.sign_out().await {
            error!(target: "client", "sign out failed: {}", e);
        }
        self.apply_session(None).await;
    }

    /// Drop the session subscription. Only the first call unsubscribes.
    pub fn teardown(&self) -> bool {
        match self.subscription.lock().take() {
            Some(sub) => sub.unsubscribe(),
            None => false,
        }
    }
}
