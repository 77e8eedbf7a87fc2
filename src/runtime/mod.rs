//! Runtime support for stacked decoder sessions

pub mod annotation;
pub mod callback;
pub mod context;
pub mod decoder;
pub mod errors;
pub mod instance;
pub mod library;
pub mod output;
pub mod session;
pub mod value;

pub use annotation::{Annotation, AnnotationFormat};
pub use callback::{Callback, CallbackRegistry, ProtoData, ProtoPayload};
pub use context::Context;
pub use decoder::{Decoder, DecoderInfo};
pub use errors::{
    AnnotationError, BoundaryError, DispatchError, LibraryError, SessionError, StageError,
    StageResult,
};
pub use instance::{Instance, InstanceId};
pub use library::{DecoderLibrary, builtin_decoders};
pub use output::{OutputHandle, OutputRegistry, OutputStream, OutputType};
pub use session::{DEFAULT_MAX_OUTPUTS, DispatchStats, Dispatched, Session};
pub use value::Value;
