//! SPI decoder stage
//!
//! Consumes packed logic samples (one byte per sample, see
//! [`channel`](super::types::channel)) and walks them one sample at a time:
//!
//!   1. Track CS; every change is reported on the protocol output as
//!      `["CS-CHANGE", old_level, new_level]` and discards any partial word
//!   2. While CS is active, sample MOSI on each CLK sampling edge
//!   3. After `bits_per_word` bits, emit one annotation per bit, one for the
//!      word, and `["DATA", word]` on the protocol output
//!
//! Clock and CS state persist across `decode()` calls, so a capture may be
//! fed in arbitrary chunks.

use super::types::{CsPolarity, SpiMode, channel, level};
use crate::runtime::{
    Context, Decoder, DecoderInfo, OutputHandle, OutputType, StageError, StageResult, Value,
};
use tracing::{debug, trace};

pub const ANN_MOSI_BIT: usize = 0;
pub const ANN_MOSI_DATA: usize = 1;

/// SPI decoder stage
pub struct SpiDecoder {
    mode: SpiMode,
    bits_per_word: usize,
    cs_polarity: CsPolarity,

    out_ann: Option<OutputHandle>,
    out_proto: Option<OutputHandle>,

    prev_clk: Option<bool>,
    prev_cs: Option<bool>,
    /// Sample index and value of each bit of the current word
    bits: Vec<(u64, bool)>,

    /// Word counter for logging
    word_count: u64,
}

impl SpiDecoder {
    pub fn new(mode: SpiMode, bits_per_word: usize) -> Self {
        Self {
            mode,
            bits_per_word: bits_per_word.clamp(1, 32),
            cs_polarity: CsPolarity::ActiveLow,
            out_ann: None,
            out_proto: None,
            prev_clk: None,
            prev_cs: None,
            bits: Vec::new(),
            word_count: 0,
        }
    }

    pub fn with_cs_polarity(mut self, cs_polarity: CsPolarity) -> Self {
        self.cs_polarity = cs_polarity;
        self
    }

    pub fn info() -> DecoderInfo {
        DecoderInfo::new("spi", "SPI")
            .with_longname("Serial Peripheral Interface")
            .with_description("Full-duplex, synchronous, serial bus (MOSI only).")
            .with_input("logic")
            .with_output("spi")
            .with_annotation("mosi-bit", "MOSI bit")
            .with_annotation("mosi-data", "MOSI data")
    }

    fn is_sampling_edge(&self, prev: bool, clk: bool) -> bool {
        if self.mode.samples_on_rising() {
            !prev && clk
        } else {
            prev && !clk
        }
    }

    fn handle_sample(&mut self, ctx: &Context<'_>, position: u64, sample: u8) {
        let cs = level(sample, channel::CS);
        if let Some(prev) = self.prev_cs.filter(|&prev| prev != cs) {
            trace!("CS {} -> {} at sample {}", prev, cs, position);
            self.bits.clear();
            if let Some(out) = self.out_proto {
                let data = Value::list([Value::from("CS-CHANGE"), prev.into(), cs.into()]);
                ctx.put(position, position, out, &data);
            }
        }
        self.prev_cs = Some(cs);

        let clk = level(sample, channel::CLK);
        let prev_clk = self.prev_clk.replace(clk);
        let Some(prev_clk) = prev_clk else {
            return;
        };
        if !self.cs_polarity.is_active(cs) || !self.is_sampling_edge(prev_clk, clk) {
            return;
        }

        self.bits.push((position, level(sample, channel::MOSI)));
        if self.bits.len() == self.bits_per_word {
            self.emit_word(ctx);
        }
    }

    fn emit_word(&mut self, ctx: &Context<'_>) {
        let bits = std::mem::take(&mut self.bits);
        let word = bits
            .iter()
            .fold(0u32, |acc, &(_, bit)| (acc << 1) | u32::from(bit));
        let (first, last) = match (bits.first(), bits.last()) {
            (Some(first), Some(last)) => (first.0, last.0),
            _ => return,
        };

        self.word_count += 1;
        debug!(
            "SPI word #{}: MOSI=0x{:02X} at samples {}..{}",
            self.word_count, word, first, last
        );

        if let Some(out) = self.out_ann {
            for (i, &(position, bit)) in bits.iter().enumerate() {
                let end = bits.get(i + 1).map(|b| b.0).unwrap_or(position);
                let text = if bit { "1" } else { "0" };
                ctx.put(position, end, out, &Value::annotation(ANN_MOSI_BIT, [text]));
            }
            let texts = [format!("MOSI: 0x{:02X}", word), format!("0x{:02X}", word)];
            ctx.put(first, last, out, &Value::annotation(ANN_MOSI_DATA, texts));
        }

        if let Some(out) = self.out_proto {
            let data = Value::list([Value::from("DATA"), Value::from(word)]);
            ctx.put(first, last, out, &data);
        }
    }
}

impl Default for SpiDecoder {
    fn default() -> Self {
        Self::new(SpiMode::Mode0, 8)
    }
}

impl Decoder for SpiDecoder {
    fn start(&mut self, ctx: &Context<'_>) -> StageResult {
        self.out_ann = ctx.add(OutputType::Annotation, "spi")?;
        self.out_proto = ctx.add(OutputType::Protocol, "spi")?;
        Ok(())
    }

    fn decode(&mut self, ctx: &Context<'_>, start: u64, _end: u64, data: &Value) -> StageResult {
        let samples = data.as_bytes().ok_or(StageError::UnexpectedInput {
            expected: "bytes",
            found: data.type_name(),
        })?;

        for (offset, &sample) in samples.iter().enumerate() {
            self.handle_sample(ctx, start + offset as u64, sample);
        }
        Ok(())
    }
}
