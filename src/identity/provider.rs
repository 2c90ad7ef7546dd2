use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use reqwest::Url;

use super::principal::Principal;
use super::session::{Session, SessionManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Github,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Github => "github",
        }
    }
}

/// What changed, delivered with the session as it stands afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid redirect url: {0}")]
    InvalidRedirect(String),
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error("no login in progress")]
    NoPendingLogin,
    #[error("no active session")]
    NoSession,
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

pub type SessionCallback = Arc<dyn Fn(AuthEvent, Option<Session>) + Send + Sync>;

/// The hosted identity service as the client view sees it.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn get_current_session(&self) -> Option<Session>;
    /// Register for session changes. The listener stays registered until the
    /// returned handle is unsubscribed or dropped.
    fn subscribe(&self, callback: SessionCallback) -> Subscription;
    async fn sign_in_with_oauth(&self, provider: OAuthProvider, redirect_to: &str) -> Result<(), ProviderError>;
    async fn sign_out(&self) -> Result<(), ProviderError>;
}

/// Listener registry shared between a provider and its subscription handles.
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    map: RwLock<BTreeMap<u64, SessionCallback>>,
}

impl Listeners {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn add(self: &Arc<Self>, callback: SessionCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.map.write().insert(id, callback);
        Subscription { id, registry: Some(Arc::downgrade(self)) }
    }

    fn remove(&self, id: u64) -> bool { self.map.write().remove(&id).is_some() }

    pub fn len(&self) -> usize { self.map.read().len() }

    pub fn is_empty(&self) -> bool { self.map.read().is_empty() }

    /// Callbacks run outside the registry lock so they may subscribe or unsubscribe.
    pub fn notify(&self, event: AuthEvent, session: Option<Session>) {
        let callbacks: Vec<SessionCallback> = self.map.read().values().cloned().collect();
        for cb in callbacks {
            cb(event, session.clone());
        }
    }
}

/// Handle for one registered listener.
pub struct Subscription {
    id: u64,
    registry: Option<Weak<Listeners>>,
}

impl Subscription {
    pub fn id(&self) -> u64 { self.id }

    /// Remove the listener. Returns false if the provider was already gone.
    pub fn unsubscribe(mut self) -> bool { self.detach() }

    fn detach(&mut self) -> bool {
        match self.registry.take().and_then(|w| w.upgrade()) {
            Some(reg) => reg.remove(self.id),
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).field("attached", &self.registry.is_some()).finish()
    }
}

#[derive(Debug, Clone)]
struct PendingLogin {
    provider: OAuthProvider,
    authorize_url: Url,
}

/// In-process identity provider.
///
/// Stands in for the hosted auth service: `sign_in_with_oauth` starts an
/// authorization and `complete_oauth` plays the provider's redirect coming back
/// with a verified address. Sessions are signed with the shared `TokenSigner`, so
/// the comments endpoint can verify them without talking to this provider.
pub struct LocalIdentityProvider {
    sessions: SessionManager,
    auth_url: Url,
    current: RwLock<Option<Session>>,
    pending: Mutex<Option<PendingLogin>>,
    users: Mutex<HashMap<String, String>>,
    listeners: Arc<Listeners>,
}

impl LocalIdentityProvider {
    pub fn new(sessions: SessionManager, auth_url: Url) -> Self {
        Self {
            sessions,
            auth_url,
            current: RwLock::new(None),
            pending: Mutex::new(None),
            users: Mutex::new(HashMap::new()),
            listeners: Listeners::new(),
        }
    }

    pub fn session_manager(&self) -> &SessionManager { &self.sessions }

    pub fn listener_count(&self) -> usize { self.listeners.len() }

    /// Authorization URL of the login in progress, if any.
    pub fn pending_authorize_url(&self) -> Option<Url> {
        self.pending.lock().as_ref().map(|p| p.authorize_url.clone())
    }

    /// Finish the login in progress as `email`.
    pub fn complete_oauth(&self, email: &str) -> Result<Session, ProviderError> {
        let email = email.trim();
        if !Principal::is_valid_email(email) {
            return Err(ProviderError::InvalidEmail(email.to_string()));
        }
        let pending = self.pending.lock().take().ok_or(ProviderError::NoPendingLogin)?;
        let user_id = self
            .users
            .lock()
            .entry(email.to_ascii_lowercase())
            .or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();
        let session = self.sessions.issue(Principal { user_id, email: email.to_string() });
        *self.current.write() = Some(session.clone());
        tracing::info!(target: "identity", provider = pending.provider.as_str(), email = %email, "signed in");
        self.listeners.notify(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Reissue the current session's token.
    pub fn refresh_session(&self) -> Result<Session, ProviderError> {
        let refreshed = {
            let mut cur = self.current.write();
            let session = cur.as_ref().ok_or(ProviderError::NoSession)?;
            let refreshed = self.sessions.reissue(session);
            *cur = Some(refreshed.clone());
            refreshed
        };
        tracing::debug!(target: "identity", sid = %refreshed.session_id, "token refreshed");
        self.listeners.notify(AuthEvent::TokenRefreshed, Some(refreshed.clone()));
        Ok(refreshed)
    }

    fn authorize_url(&self, provider: OAuthProvider, redirect_to: &Url) -> Result<Url, ProviderError> {
        let base = self.auth_url.as_str().trim_end_matches('/');
        let raw = format!(
            "{}/authorize?provider={}&redirect_to={}",
            base,
            provider.as_str(),
            urlencoding::encode(redirect_to.as_str())
        );
        Url::parse(&raw).map_err(|e| ProviderError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn get_current_session(&self) -> Option<Session> {
        {
            let mut cur = self.current.write();
            match cur.as_ref() {
                Some(s) if !s.is_expired(Utc::now()) => return Some(s.clone()),
                Some(_) => *cur = None,
                None => return None,
            }
        }
        tracing::info!(target: "identity", "session expired");
        self.listeners.notify(AuthEvent::SignedOut, None);
        None
    }

    fn subscribe(&self, callback: SessionCallback) -> Subscription { self.listeners.add(callback) }

    async fn sign_in_with_oauth(&self, provider: OAuthProvider, redirect_to: &str) -> Result<(), ProviderError> {
        let redirect = Url::parse(redirect_to).map_err(|e| ProviderError::InvalidRedirect(format!("{}: {}", redirect_to, e)))?;
        let authorize_url = self.authorize_url(provider, &redirect)?;
        tracing::info!(target: "identity", provider = provider.as_str(), url = %authorize_url, "authorization started");
        *self.pending.lock() = Some(PendingLogin { provider, authorize_url });
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.pending.lock().take();
        let had = self.current.write().take().is_some();
        if had {
            tracing::info!(target: "identity", "signed out");
        }
        self.listeners.notify(AuthEvent::SignedOut, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::TokenSigner;
    use std::sync::atomic::AtomicUsize;

    fn provider() -> LocalIdentityProvider {
        LocalIdentityProvider::new(
            SessionManager::new(TokenSigner::new("k")),
            Url::parse("https://auth.example.com/auth/v1").unwrap(),
        )
    }

    #[tokio::test]
    async fn oauth_round_trip_notifies_listeners() {
        let p = provider();
        let seen: Arc<Mutex<Vec<(AuthEvent, Option<String>)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = p.subscribe(Arc::new(move |ev: AuthEvent, s: Option<Session>| {
            sink.lock().push((ev, s.map(|s| s.principal.email)));
        }));

        assert!(p.get_current_session().await.is_none());
        p.sign_in_with_oauth(OAuthProvider::Google, "http://localhost:3000").await.unwrap();
        let url = p.pending_authorize_url().unwrap();
        assert_eq!(
            url.as_str(),
            "https://auth.example.com/auth/v1/authorize?provider=google&redirect_to=http%3A%2F%2Flocalhost%3A3000%2F"
        );
        let s = p.complete_oauth("a@x.com").unwrap();
        assert_eq!(p.get_current_session().await, Some(s.clone()));
        assert_eq!(p.session_manager().validate(&s.access_token).unwrap().email, "a@x.com");

        p.refresh_session().unwrap();
        p.sign_out().await.unwrap();
        assert!(p.get_current_session().await.is_none());

        assert_eq!(
            *seen.lock(),
            vec![
                (AuthEvent::SignedIn, Some("a@x.com".to_string())),
                (AuthEvent::TokenRefreshed, Some("a@x.com".to_string())),
                (AuthEvent::SignedOut, None),
            ]
        );
        assert!(sub.unsubscribe());
        assert_eq!(p.listener_count(), 0);
    }

    #[tokio::test]
    async fn complete_requires_pending_login_and_valid_email() {
        let p = provider();
        assert_eq!(p.complete_oauth("a@x.com"), Err(ProviderError::NoPendingLogin));
        p.sign_in_with_oauth(OAuthProvider::Github, "http://localhost:3000").await.unwrap();
        assert!(matches!(p.complete_oauth("nope"), Err(ProviderError::InvalidEmail(_))));
        // the pending login survives a bad address
        assert!(p.complete_oauth("a@x.com").is_ok());
    }

    #[tokio::test]
    async fn bad_redirect_is_an_error() {
        let p = provider();
        let err = p.sign_in_with_oauth(OAuthProvider::Google, "not a url").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRedirect(_)));
        assert!(p.pending_authorize_url().is_none());
    }

    #[tokio::test]
    async fn same_email_keeps_user_id() {
        let p = provider();
        p.sign_in_with_oauth(OAuthProvider::Google, "http://localhost").await.unwrap();
        let first = p.complete_oauth("a@x.com").unwrap();
        p.sign_out().await.unwrap();
        p.sign_in_with_oauth(OAuthProvider::Google, "http://localhost").await.unwrap();
        let second = p.complete_oauth("A@x.com").unwrap();
        assert_eq!(first.principal.user_id, second.principal.user_id);
    }

    #[tokio::test]
    async fn expired_session_reports_signed_out() {
        let p = LocalIdentityProvider::new(
            SessionManager::new(TokenSigner::new("k")).with_ttl(chrono::Duration::seconds(-1)),
            Url::parse("https://auth.example.com").unwrap(),
        );
        let signed_out = Arc::new(AtomicUsize::new(0));
        let counter = signed_out.clone();
        let _sub = p.subscribe(Arc::new(move |ev: AuthEvent, _: Option<Session>| {
            if ev == AuthEvent::SignedOut {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));
        p.sign_in_with_oauth(OAuthProvider::Google, "http://localhost").await.unwrap();
        p.complete_oauth("a@x.com").unwrap();
        assert!(p.get_current_session().await.is_none());
        assert_eq!(signed_out.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_the_handle_unsubscribes_once() {
        let p = provider();
        let sub = p.subscribe(Arc::new(|_: AuthEvent, _: Option<Session>| {}));
        let _other = p.subscribe(Arc::new(|_: AuthEvent, _: Option<Session>| {}));
        assert_eq!(p.listener_count(), 2);
        drop(sub);
        assert_eq!(p.listener_count(), 1);
    }
}
