//! Google Cloud support.

mod auth;
mod client;
pub mod storage;

pub use self::auth::Authenticator;
pub use self::client::{Client, ClientError, DEFAULT_STORAGE_ENDPOINT};
pub(crate) use self::client::percent_encode;
