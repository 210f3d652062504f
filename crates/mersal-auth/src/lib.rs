//! Credentials shared by the REST API and the WebSocket gateway: the signed
//! session token carried in the `jwt` cookie, and password hashing.

pub mod password;
pub mod token;

pub use token::{Claims, SESSION_COOKIE, TokenCodec, TokenError};
