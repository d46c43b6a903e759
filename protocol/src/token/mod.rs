//! # Coin Tokens
//!
//! The compact signed token a payer shows at the door. HS256 over a JSON
//! header and a JSON claim set, keyed with the order's secret.
//!
//! - [`mint`]: server side, on demand, never stored.
//! - [`verify`]: agent side, offline, against the local order cache.
//! - [`envelope`]: unwraps whatever the scanner actually read.

pub mod claims;
pub mod envelope;
pub mod error;
pub mod mint;
pub mod verify;

pub use claims::{CoinClaims, TokenHeader};
pub use envelope::extract_token;
pub use error::{MintError, VerifyError};
pub use mint::{mint_token, CoinToken};
pub use verify::{verify, verify_against};
