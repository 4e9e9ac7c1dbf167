//! Account lifecycle and profile management.

mod service;

pub use service::{AuthResult, ClientInfo, LoginRequest, RegisterRequest, UserService};
