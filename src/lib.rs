//! Output dispatch for stacked protocol decoders
//!
//! This library routes the data units produced by one decoding stage either
//! to the host (annotations) or onward to the stages stacked on top of it
//! (protocol data), and manages the output streams each stage declares.
//!
//! # Architecture
//!
//! - **Session**: owns the decoder instances and the stacking graph between them
//! - **Output registry**: per-instance ordered list of declared output streams
//! - **Annotation converter**: validates annotation payloads against the
//!   formats a decoder declared at load time
//! - **Dispatch**: synchronous, re-entrant routing of every emitted data unit
//! - **Decoders**: built-in SPI and SPI register stages
//!
//! # Example
//!
//! ```no_run
//! use pdstack::{CallbackRegistry, OutputType, Session, Value, builtin_decoders};
//!
//! let mut callbacks = CallbackRegistry::new();
//! callbacks.register(OutputType::Annotation, |data| println!("{:?}", data.annotation()))?;
//!
//! let mut session = Session::new().with_callbacks(callbacks);
//! let spi = session.new_instance(builtin_decoders(), "spi", "spi")?;
//! let regs = session.new_instance(builtin_decoders(), "spi_registers", "regs")?;
//! session.stack(spi, regs)?;
//! session.start()?;
//! session.send(0, 3, &Value::Bytes(vec![4, 0, 1, 4]))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod nodes;
pub mod runtime;

// Re-export built-in decoders
pub use nodes::decoders::{SpiDecoder, SpiRegisterDecoder};

// Re-export runtime components
pub use runtime::{
    Annotation, AnnotationError, AnnotationFormat, BoundaryError, CallbackRegistry, Context,
    Decoder, DecoderInfo, DecoderLibrary, DispatchError, DispatchStats, Dispatched, InstanceId,
    LibraryError, OutputHandle, OutputType, ProtoData, ProtoPayload, Session, SessionError,
    StageError, StageResult, Value, builtin_decoders,
};
