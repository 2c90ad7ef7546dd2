//! Identity provider sessions for the comment board.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod token;
mod session;
mod provider;

pub use principal::Principal;
pub use token::{SessionClaims, TokenError, TokenSigner};
pub use session::{Session, SessionManager};
pub use provider::{
    AuthEvent, IdentityProvider, Listeners, LocalIdentityProvider, OAuthProvider, ProviderError, SessionCallback, Subscription,
};
