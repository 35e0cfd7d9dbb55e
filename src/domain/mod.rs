//! Domain layer types and invariants.

pub mod error;
pub mod ranks;
pub mod types;
pub mod users;
