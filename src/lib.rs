//! Schema snapshot engine and guarded migration validator
//!
//! - [`snapshot`] captures a canonical [`model::SchemaDefinition`] of a database
//! - [`diff`] and [`version`] compare and fingerprint snapshots
//! - [`validator`] simulates changes in a shadow database and applies them
//!   against expected before/after schemas
//! - [`routes`] exposes all of it over HTTP

pub mod canonical;
pub mod collector;
pub mod config;
pub mod diff;
pub mod error;
pub mod escape;
pub mod executor;
pub mod filter;
pub mod model;
pub mod pool;
pub mod routes;
pub mod snapshot;
pub mod state;
pub mod validator;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;
