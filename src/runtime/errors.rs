//! Error types for the runtime system

use super::output::OutputType;

/// Reasons an annotation payload is rejected by the converter
///
/// Each variant corresponds to one validation step, checked in order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnnotationError {
    #[error("Protocol decoder {decoder} submitted {found} instead of list.")]
    NotAList { decoder: String, found: &'static str },

    #[error("Protocol decoder {decoder} submitted annotation list with {len} elements instead of 2")]
    WrongLength { decoder: String, len: usize },

    #[error("Protocol decoder {decoder} submitted annotation list, but first element was not an integer.")]
    FormatNotInteger { decoder: String },

    #[error("Protocol decoder {decoder} submitted data to unregistered annotation format {format}.")]
    UnregisteredFormat { decoder: String, format: i64 },

    #[error("Protocol decoder {decoder} submitted annotation list, but second element was not a list.")]
    StringsNotAList { decoder: String },

    #[error("Protocol decoder {decoder} submitted annotation list, but second element was malformed.")]
    MalformedStrings { decoder: String },
}

/// Errors contained by the dispatch engine
///
/// None of these unwind past the emitting stage. They are logged where they
/// are detected and only the affected emission (or successor) is skipped.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("decoder instance #{0} not found")]
    UnknownInstance(usize),

    #[error("Protocol decoder {decoder} ({instance}) submitted invalid output ID {handle}.")]
    InvalidHandle {
        decoder: String,
        instance: String,
        handle: i64,
    },

    #[error(transparent)]
    MalformedAnnotation(#[from] AnnotationError),

    #[error("Protocol decoder {decoder} ({instance}) submitted to {output_type} output, which is not yet supported.")]
    UnsupportedOutputType {
        decoder: String,
        instance: String,
        output_type: OutputType,
    },

    #[error("Protocol decoder {decoder} ({instance}) submitted invalid output type {code}.")]
    UnknownOutputType {
        decoder: String,
        instance: String,
        code: i32,
    },

    #[error("Protocol decoder {decoder} ({instance}) submitted sample range {start}..{end} with start after end.")]
    InvalidSampleRange {
        decoder: String,
        instance: String,
        start: u64,
        end: u64,
    },

    #[error("calling {instance} decode(): {source}")]
    SuccessorFailure {
        instance: String,
        #[source]
        source: StageError,
    },
}

/// Malformed arguments crossing the stage boundary
///
/// These are the only failures surfaced to the caller of `add`/`put`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoundaryError {
    #[error("{method}() takes exactly {expected} arguments ({found} given)")]
    Arity {
        method: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{method}() argument {index} must be {expected}, not {found}")]
    ArgumentType {
        method: &'static str,
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{method}() argument {index} out of range: {value}")]
    ArgumentRange {
        method: &'static str,
        index: usize,
        value: i64,
    },

    #[error("invalid output type {0}")]
    UnknownOutputType(i32),

    #[error("output stream identifier must not be empty")]
    EmptyIdentifier,

    #[error("decoder instance not found")]
    InstanceNotFound,
}

/// Error returned by a stage's `start` or `decode` entry point
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Boundary(#[from] BoundaryError),

    #[error("expected {expected} input, got {found}")]
    UnexpectedInput {
        expected: &'static str,
        found: &'static str,
    },

    #[error("instance is already decoding")]
    Busy,

    #[error("{0}")]
    Decode(String),
}

/// Error type for decoder library operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LibraryError {
    #[error("Decoder id must not be empty")]
    EmptyDecoderId,

    #[error("Decoder '{0}' is already loaded")]
    DuplicateDecoder(String),

    #[error("Decoder '{decoder}' annotation format {index} has an empty id")]
    EmptyAnnotationId { decoder: String, index: usize },

    #[error("Decoder '{decoder}' declares annotation format '{format}' twice")]
    DuplicateAnnotation { decoder: String, format: String },

    #[error("Decoder '{0}' not found")]
    DecoderNotFound(String),
}

/// Error type for session setup and host-facing operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Instance '{0}' not found")]
    InstanceNotFound(String),

    #[error("Instance with id '{0}' already exists")]
    DuplicateInstance(String),

    #[error("Cannot stack instance '{0}' on top of itself")]
    SelfStack(String),

    #[error("Instance '{upper}' is already stacked on '{lower}'")]
    DuplicateStack { lower: String, upper: String },

    #[error("Stacking '{upper}' on '{lower}' would create a cycle")]
    StackCycle { lower: String, upper: String },

    #[error("A {0} callback is already registered")]
    DuplicateCallback(OutputType),

    #[error("Callbacks cannot be registered for {0} output")]
    CallbackNotSupported(OutputType),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("Session already started")]
    AlreadyStarted,

    #[error("{instance} start(): {source}")]
    Start {
        instance: String,
        #[source]
        source: StageError,
    },

    #[error("calling {instance} decode(): {source}")]
    Decode {
        instance: String,
        #[source]
        source: StageError,
    },
}

/// Result type for stage entry points
pub type StageResult<T = ()> = Result<T, StageError>;
