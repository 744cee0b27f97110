//! Quantisation tables and precision settings.
//!
//! - [`catalog`]: named/continuous BPW catalogues and token resolution
//! - [`precision`]: KV-cache levels and the derived precision triple

pub mod catalog;
pub mod precision;
