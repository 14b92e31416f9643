//! Authentication and durable credentials
//!
//! Tokens are obtained once through the interactive native-app login, kept
//! in a credential file, and refreshed transparently by the lifecycle
//! manager whenever an authorized call needs them.

pub mod lifecycle;
pub mod oauth;
pub mod session;
pub mod store;
pub mod tokens;

pub use lifecycle::{LifecycleConfig, TokenLifecycleManager, DEFAULT_SKEW_SECS};
pub use oauth::NativeAppAuthClient;
pub use session::{login, logout, print_token, status};
