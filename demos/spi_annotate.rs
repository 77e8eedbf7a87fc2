//! Example: SPI register decoding with stacked decoders
//!
//! Synthesizes an SPI capture, decodes it with `spi` and stacks
//! `spi_registers` on top, printing every annotation.
//!
//! Usage:
//!   cargo run --example spi_annotate -- \
//!       --words 10,AA,BB \
//!       --bits 8 \
//!       --chunk 16

use clap::Parser;
use pdstack::nodes::decoders::{SpiMode, spi_capture};
use pdstack::{CallbackRegistry, OutputType, Session, SpiDecoder, Value, builtin_decoders};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Comma-separated hex words sent in one CS transaction
    #[arg(short, long, value_delimiter = ',')]
    words: Vec<String>,

    /// Bits per SPI word (1-32)
    #[arg(short, long, default_value = "8", value_parser = clap::value_parser!(u8).range(1..=32))]
    bits: u8,

    /// Samples fed to the session per send() call (0 = all at once)
    #[arg(long, default_value = "0")]
    chunk: usize,

    /// Only print annotations from the register decoder
    #[arg(long)]
    registers_only: bool,
}

fn parse_words(raw: &[String]) -> Result<Vec<u32>, std::num::ParseIntError> {
    raw.iter()
        .map(|w| u32::from_str_radix(w.trim_start_matches("0x"), 16))
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let words = if args.words.is_empty() {
        vec![0x10, 0xAA, 0xBB]
    } else {
        parse_words(&args.words)?
    };
    let bits = usize::from(args.bits);
    let samples = spi_capture(&[words.as_slice()], bits);
    info!("Synthesized {} samples for {} words", samples.len(), words.len());

    let registers_only = args.registers_only;
    let mut callbacks = CallbackRegistry::new();
    callbacks.register(OutputType::Annotation, move |data| {
        if registers_only && data.instance != "regs" {
            return;
        }
        if let Some(ann) = data.annotation() {
            println!(
                "{:>6}-{:<6} {:<5} {:<10} {}",
                data.start_sample,
                data.end_sample,
                data.instance,
                data.annotation_format_id().unwrap_or("?"),
                ann.texts.first().map(String::as_str).unwrap_or("")
            );
        }
    })?;

    let library = builtin_decoders();
    let mut session = Session::new().with_callbacks(callbacks);
    let spi = session.add_instance(
        "spi",
        Arc::new(SpiDecoder::info()),
        Box::new(SpiDecoder::new(SpiMode::Mode0, bits)),
    )?;
    let regs = session.new_instance(library, "spi_registers", "regs")?;
    session.stack(spi, regs)?;
    session.start()?;

    let chunk = if args.chunk == 0 { samples.len().max(1) } else { args.chunk };
    for (i, block) in samples.chunks(chunk).enumerate() {
        let start = (i * chunk) as u64;
        let end = start + block.len() as u64 - 1;
        session.send(start, end, &Value::Bytes(block.to_vec()))?;
    }

    let stats = session.stats();
    info!(
        "Done: {} annotations, {} protocol units forwarded, {} dropped",
        stats.annotations_delivered, stats.protocol_forwarded, stats.dropped
    );
    Ok(())
}
