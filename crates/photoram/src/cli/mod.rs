//! Command implementations.

pub mod config;
pub mod info;
pub mod models;
pub mod tag;
