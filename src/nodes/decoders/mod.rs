//! Built-in decoder stages
//!
//! Native stages that plug into a [`Session`](crate::runtime::Session) the same
//! way externally authored stages do.

pub mod register_decoder;
pub mod spi_decoder;
pub mod types;

// Re-export common types
pub use types::{CsPolarity, SpiMode, spi_capture};

// Re-export decoders
pub use register_decoder::SpiRegisterDecoder;
pub use spi_decoder::SpiDecoder;
