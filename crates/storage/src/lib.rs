//! Storage layer for Opswatch
//!
//! This crate provides local data persistence for client state that must
//! survive restarts, most importantly stored accounts and their tokens.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod persistence;

pub use persistence::{PersistedState, PersistenceConfig, PersistenceError};
