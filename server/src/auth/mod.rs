//! Credential validation. This core never issues credentials to end users;
//! it only verifies tokens minted by the identity service with the shared key.

pub mod jwt;
pub mod middleware;
