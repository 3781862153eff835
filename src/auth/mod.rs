// Authentication module
// Manages the LevelPlay bearer token lifecycle

mod credentials;
mod jwt;
mod manager;
mod types;

pub use credentials::Credentials;
pub use jwt::decode_expiry;
pub use manager::AuthManager;
pub use types::{now_secs, Session, EXPIRY_MARGIN_SECS};
