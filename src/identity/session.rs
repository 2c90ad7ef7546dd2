use base64::Engine;
use chrono::{DateTime, Duration, Utc};

use super::principal::Principal;
use super::token::{SessionClaims, TokenSigner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    /// Signed bearer token presented to the comments endpoint.
    pub access_token: String,
    pub principal: Principal,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn email(&self) -> &str { &self.principal.email }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool { self.expires_at <= now }
}

fn gen_id() -> String {
    let mut buf = [0u8; 16];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// Issues signed sessions. Verification needs only the `TokenSigner`.
#[derive(Debug, Clone)]
pub struct SessionManager {
    pub ttl: Duration,
    signer: TokenSigner,
}

impl SessionManager {
    pub fn new(signer: TokenSigner) -> Self { Self { ttl: Duration::hours(1), signer } }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn signer(&self) -> &TokenSigner { &self.signer }

    pub fn issue(&self, principal: Principal) -> Session {
        self.issue_with_id(gen_id(), principal)
    }

    /// Reissue a token for an existing session id (refresh).
    pub fn reissue(&self, session: &Session) -> Session {
        self.issue_with_id(session.session_id.clone(), session.principal.clone())
    }

    fn issue_with_id(&self, session_id: String, principal: Principal) -> Session {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let claims = SessionClaims {
            sid: session_id.clone(),
            sub: principal.user_id.clone(),
            email: principal.email.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let access_token = self.signer.sign(&claims);
        tracing::debug!(target: "identity", user = %principal.user_id, sid = %session_id, ttl_secs = self.ttl.num_seconds(), "session.issue");
        Session { session_id, access_token, principal, issued_at: now, expires_at }
    }

    /// Principal for a token, if its signature holds and it has not expired.
    pub fn validate(&self, token: &str) -> Option<Principal> {
        let claims = self.signer.verify(token, Utc::now().timestamp()).ok()?;
        Some(Principal { user_id: claims.sub, email: claims.email })
    }
}
