//! Model shape resolution.
//!
//! - [`shape`]: ModelShape and its invariants
//! - [`source`]: ModelRef, the remote/local model identifier
//! - [`provider`]: cached resolver over the two shape sources
//! - [`hub`]: remote model-hosting store (config + tensor index)
//! - [`ollama`]: local model server metadata
//! - [`disk_cache`]: on-disk mirror of downloaded documents

pub mod disk_cache;
pub mod hub;
pub mod ollama;
pub mod provider;
pub mod shape;
pub mod source;
