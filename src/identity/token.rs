use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;
const TOKEN_VERSION_V1: &str = "v1";
const MAX_TOKEN_LEN: usize = 2048;

/// Signed body of a session token. Times are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sid: String,
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    InvalidFormat,
    #[error("token version unsupported")]
    UnsupportedVersion,
    #[error("token signature mismatch")]
    InvalidSignature,
    #[error("token payload invalid: {0}")]
    InvalidPayload(String),
    #[error("token expired")]
    Expired,
}

/// HMAC-SHA256 signer shared by whoever issues sessions and whoever verifies them.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").field("secret", &"<redacted>").finish()
    }
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self { Self { secret: secret.into() } }

    /// Random 32-byte secret; tokens signed with it only verify in this process.
    /// Fails if the OS random source does.
    pub fn generate() -> anyhow::Result<Self> {
        let mut buf = [0u8; 32];
        getrandom::getrandom(&mut buf).map_err(|e| anyhow::anyhow!(e.to_string()))?;
        Ok(Self { secret: buf.to_vec() })
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        HmacSha256::new_from_slice(&self.secret).expect("hmac key of any length")
    }

    pub fn sign(&self, claims: &SessionClaims) -> String {
        let payload = serde_json::to_vec(claims).unwrap_or_default();
        let payload_part = URL_SAFE_NO_PAD.encode(payload);
        let mut mac = self.mac();
        mac.update(payload_part.as_bytes());
        let sig_part = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{}.{}.{}", TOKEN_VERSION_V1, payload_part, sig_part)
    }

    /// Check signature and expiry against `now` (unix seconds).
    pub fn verify(&self, token: &str, now: i64) -> Result<SessionClaims, TokenError> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(TokenError::InvalidFormat);
        }
        let mut parts = token.split('.');
        let (Some(version), Some(payload_part), Some(sig_part), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
            return Err(TokenError::InvalidFormat);
        };
        if version != TOKEN_VERSION_V1 {
            return Err(TokenError::UnsupportedVersion);
        }
        let sig = URL_SAFE_NO_PAD.decode(sig_part).map_err(|_| TokenError::InvalidFormat)?;
        let mut mac = self.mac();
        mac.update(payload_part.as_bytes());
        mac.verify_slice(&sig).map_err(|_| TokenError::InvalidSignature)?;
        let payload = URL_SAFE_NO_PAD.decode(payload_part).map_err(|_| TokenError::InvalidFormat)?;
        let claims: SessionClaims =
            serde_json::from_slice(&payload).map_err(|e| TokenError::InvalidPayload(e.to_string()))?;
        if claims.exp <= now {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}
