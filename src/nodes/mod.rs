//! Decoder stages shipped with the crate
//!
//! - **SPI**: turns packed logic samples into MOSI words
//! - **SPI registers**: stacked on SPI, turns transactions into register writes

pub mod decoders;
