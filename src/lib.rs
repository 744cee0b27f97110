//! vram-estimator: VRAM estimates for LLM inference.
//!
//! Maps a transformer's architectural shape, weight/KV-cache quantisation and
//! context length to a GPU memory estimate, and inverts it:
//!   budget → largest context, budget → most precise quantisation.
//!
//! Model shapes are resolved from a remote model-hosting store (mirrored to
//! disk) or from a running local model server.

pub mod config;
pub mod memory;
pub mod model;
pub mod quant;
pub mod search;
