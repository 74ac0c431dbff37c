// Authentication module
// Owns the session token pair: login, refresh and header injection

mod clock;
mod grant;
mod manager;
mod types;

pub use clock::{Clock, SystemClock};
pub use grant::{compute_expires_at, EXPIRY_MARGIN_SECS};
pub use manager::CredentialManager;
pub use types::{Identity, Session};

#[cfg(any(test, feature = "test-utils"))]
pub use clock::ManualClock;
