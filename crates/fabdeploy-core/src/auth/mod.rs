//! Bearer-token supply: credential sources, token cache, and secondary auth sync.

pub mod clock;
pub mod credential;
pub mod token;

pub use clock::{Clock, SystemClock};
pub use credential::{CommandCredential, CredentialSource, EnvCredential, StaticCredential};
pub use token::{DEFAULT_REFRESH_BUFFER, SecondaryAuth, TokenInfo, TokenSource};
