//! Session lifecycle and the blocking facade used by synchronous callers.
//!
//! [`SessionManager`] owns the tool server connection and the cached
//! conversation engine; [`BlockingClient`] drives it from a thread that cannot
//! suspend, through a [`TransportBridge`](toolchat_runtime::TransportBridge).

pub mod blocking;
pub mod error;
pub mod lifecycle;

pub use blocking::BlockingClient;
pub use error::ClientError;
pub use lifecycle::{ClientOptions, ProviderFactory, SessionManager};
