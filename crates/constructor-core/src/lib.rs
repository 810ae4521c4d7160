#![deny(missing_docs)]
//! Bot constructor core library.
//!
//! Domain logic for user registration, hosted bot management, admin
//! broadcasts, conversation flows, and reporting. Transport-agnostic.

/// Hosted bot registry and lifecycle.
pub mod bots;
/// Broadcast fan-out to registered users.
pub mod broadcast;
/// Required channel membership.
pub mod channels;
/// Configuration management.
pub mod config;
/// Multi-step conversation flows.
pub mod conversation;
/// Error taxonomy shared by all components.
pub mod error;
/// Domain records persisted by the storage layer.
pub mod models;
/// Admin allow-list and audit of denied access.
pub mod permissions;
/// Statistics and CSV exports.
pub mod reporting;
/// Storage layer (SQLite).
pub mod storage;
/// User registry operations.
pub mod users;
/// Utility functions.
pub mod utils;
/// Bot token parsing and validation contract.
pub mod validator;

#[cfg(test)]
pub mod testing;
