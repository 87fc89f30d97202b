//! # Token Relay Library
//!
//! Resolves the workload identity of the process, acquires and caches
//! scoped access tokens, and forwards them (or caller-supplied tokens) to a
//! downstream API.
//!
//! Modules:
//! - `config`: service configuration, env overlay and validation
//! - `credentials`: identity mechanisms and the resolver that picks one
//! - `cache`: access tokens and the per-scope broker
//! - `remote`: authenticated outbound calls
//! - `parser`: diagnostic JWT decoding
//! - `server`: relay and callee HTTP surfaces

pub mod cache;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod helpers;
pub mod observability;
pub mod parser;
pub mod remote;
pub mod server;
pub mod utils;

#[cfg(test)]
pub mod tests;
