pub mod auth;

pub use auth::{ApiTokens, require_bearer};
