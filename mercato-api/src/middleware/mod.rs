pub mod auth;

pub use auth::{admin_middleware, identity_middleware, Claims, JwtVerifier};
