pub mod auth;
pub mod error;
pub mod message_cache;

pub use auth::{MultiFileAuthState, SignalKeyStore};
pub use error::{Result, StoreError};
pub use message_cache::MessageCache;
