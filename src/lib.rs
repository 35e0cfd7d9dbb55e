//! Per-user statistics for a phpBB-style board index, with a query result
//! cache that is evicted when posts or topics change.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod events;
pub mod infra;
