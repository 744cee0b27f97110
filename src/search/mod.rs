//! Budget searches built on the memory model.
//!
//! - [`engine`]: SearchEngine (estimate, max context, best quantisation)
//! - [`table`]: quantisation × context result grid

pub mod engine;
pub mod table;
