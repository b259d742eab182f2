//! Accounts and authentication: password hashing, JWT issuance, and the
//! request middleware that resolves the bearer token to a user.

pub mod middleware;
pub mod passwords;
pub mod tokens;
pub mod users;

pub use middleware::AuthUser;
