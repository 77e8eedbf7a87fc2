//! Common decoder types and enums

/// Bit positions of the logic channels in a sample byte
pub mod channel {
    pub const CLK: u8 = 0;
    pub const MOSI: u8 = 1;
    pub const CS: u8 = 2;
}

/// SPI clock polarity and phase modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0: Clock idle low, sample on rising edge
    #[default]
    Mode0,
    /// CPOL=0, CPHA=1: Clock idle low, sample on falling edge
    Mode1,
    /// CPOL=1, CPHA=0: Clock idle high, sample on falling edge
    Mode2,
    /// CPOL=1, CPHA=1: Clock idle high, sample on rising edge
    Mode3,
}

impl SpiMode {
    /// Whether data is sampled on the rising CLK edge
    pub fn samples_on_rising(&self) -> bool {
        matches!(self, SpiMode::Mode0 | SpiMode::Mode3)
    }
}

/// Chip select polarity for decoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsPolarity {
    /// CS is active-low (standard SPI): LOW = active, HIGH = inactive
    #[default]
    ActiveLow,
    /// CS is active-high: HIGH = active, LOW = inactive
    ActiveHigh,
    /// CS state is ignored (decoder always considers CS as active)
    Disabled,
}

impl CsPolarity {
    pub fn is_active(&self, level: bool) -> bool {
        match self {
            CsPolarity::ActiveLow => !level,
            CsPolarity::ActiveHigh => level,
            CsPolarity::Disabled => true,
        }
    }
}

/// Level of one channel in a packed sample byte
#[inline]
pub fn level(sample: u8, channel: u8) -> bool {
    (sample >> channel) & 1 == 1
}

/// Synthesize a mode 0, active-low CS capture
///
/// Each inner slice is one CS transaction of MSB-first words. The result has
/// one byte per sample, laid out as described in [`channel`]. Word width is
/// clamped to 1..=32 bits.
pub fn spi_capture(transactions: &[&[u32]], bits_per_word: usize) -> Vec<u8> {
    let bits_per_word = bits_per_word.clamp(1, 32);
    let cs_high = 1 << channel::CS;
    let mut samples = vec![cs_high, cs_high];

    for words in transactions {
        samples.push(0);
        for &word in words.iter() {
            for bit in (0..bits_per_word).rev() {
                let mosi = (((word >> bit) & 1) as u8) << channel::MOSI;
                samples.push(mosi);
                samples.push(mosi | 1 << channel::CLK);
            }
            samples.push(0);
        }
        samples.push(cs_high);
        samples.push(cs_high);
    }

    samples
}
