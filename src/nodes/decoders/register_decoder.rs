//! SPI register access decoder, stacked on [`SpiDecoder`](super::SpiDecoder)
//!
//! The first word of every CS transaction selects a register address. Each
//! following word is a write to that address, which then auto-increments.

use crate::runtime::{
    Context, Decoder, DecoderInfo, OutputHandle, OutputType, StageError, StageResult, Value,
};
use tracing::{debug, trace};

pub const ANN_ADDRESS: usize = 0;
pub const ANN_WRITE: usize = 1;

#[derive(Default)]
pub struct SpiRegisterDecoder {
    out_ann: Option<OutputHandle>,
    out_proto: Option<OutputHandle>,
    address: Option<i64>,
}

impl SpiRegisterDecoder {
    pub fn info() -> DecoderInfo {
        DecoderInfo::new("spi_registers", "SPI registers")
            .with_longname("SPI register access")
            .with_description("Address byte followed by auto-incrementing register writes.")
            .with_input("spi")
            .with_output("registers")
            .with_annotation("address", "Register address")
            .with_annotation("write", "Register write")
    }
}

fn unexpected(data: &Value) -> StageError {
    StageError::UnexpectedInput {
        expected: "[command, ...] list",
        found: data.type_name(),
    }
}

impl Decoder for SpiRegisterDecoder {
    fn start(&mut self, ctx: &Context<'_>) -> StageResult {
        self.out_ann = ctx.add(OutputType::Annotation, "spi_registers")?;
        self.out_proto = ctx.add(OutputType::Protocol, "registers")?;
        Ok(())
    }

    fn decode(&mut self, ctx: &Context<'_>, start: u64, end: u64, data: &Value) -> StageResult {
        let items = data.as_sequence().ok_or_else(|| unexpected(data))?;
        let command = items.first().and_then(Value::as_str).ok_or_else(|| unexpected(data))?;

        match command {
            "CS-CHANGE" => {
                trace!("Transaction boundary at sample {}", start);
                self.address = None;
            }
            "DATA" => {
                let word = items
                    .get(1)
                    .and_then(Value::as_int)
                    .ok_or_else(|| StageError::Decode(format!("malformed DATA: {}", data)))?;

                match self.address {
                    None => {
                        self.address = Some(word);
                        if let Some(out) = self.out_ann {
                            let texts = [format!("Address: 0x{:02X}", word), format!("A {:02X}", word)];
                            ctx.put(start, end, out, &Value::annotation(ANN_ADDRESS, texts));
                        }
                    }
                    Some(address) => {
                        debug!("Register 0x{:02X} <- 0x{:02X}", address, word);
                        if let Some(out) = self.out_ann {
                            let texts = [
                                format!("Write 0x{:02X} = 0x{:02X}", address, word),
                                format!("W {:02X}={:02X}", address, word),
                            ];
                            ctx.put(start, end, out, &Value::annotation(ANN_WRITE, texts));
                        }
                        if let Some(out) = self.out_proto {
                            let reg = Value::list([Value::from("REG"), address.into(), word.into()]);
                            ctx.put(start, end, out, &reg);
                        }
                        self.address = address.checked_add(1);
                        if self.address.is_none() {
                            return Err(StageError::Decode(format!(
                                "register address 0x{:X} cannot auto-increment",
                                address
                            )));
                        }
                    }
                }
            }
            other => trace!("Ignoring {} from lower decoder", other),
        }
        Ok(())
    }
}
