pub mod auth;
pub mod security;

pub use auth::require_api_key;
pub use security::{screen_request, RateLimiter};
