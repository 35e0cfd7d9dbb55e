//! Application services: the statistics block and its collaborator seams.

pub mod display;
pub mod error;
pub mod listener;
pub mod repos;
pub mod session;
pub mod stats;
