//! VRAM memory model.
//!
//! - [`estimator`]: MemoryModel and the per-term breakdown

pub mod estimator;
