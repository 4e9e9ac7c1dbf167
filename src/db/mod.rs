//! Persistence for user records.

pub mod models;
pub mod operations;

pub use models::{NewUser, ProfileField, User};
pub use operations::{DbOperations, UserRepository};

#[cfg(test)]
pub use operations::MockUserRepository;
