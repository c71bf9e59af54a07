//! Users and their store

pub mod entity;
pub mod repository;

pub use entity::{User, PASSWORD_ATTRIBUTE};
pub use repository::Users;
