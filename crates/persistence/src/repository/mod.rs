//! Repository implementations for database operations

pub mod draws;
pub mod patterns;

pub use draws::*;
pub use patterns::*;
