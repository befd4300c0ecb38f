pub mod auth;
pub mod boxes;
pub mod orders;
pub mod payments;
pub mod products;
pub mod verify;

pub use auth::*;
