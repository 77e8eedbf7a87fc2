//! Output streams declared by decoder instances
//!
//! Every instance owns an ordered [`OutputRegistry`]. The position of a stream
//! in that registry is its [`OutputHandle`]: handles are handed out in
//! registration order and stay valid for the lifetime of the instance.

use std::fmt;

/// Kind of data carried by an output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputType {
    /// Terminal, display-oriented annotations
    Annotation,
    /// Data units fed to stacked decoders
    Protocol,
    /// Raw binary data (not implemented)
    Binary,
    /// Any other raw type code
    Unknown(i32),
}

impl OutputType {
    pub const ANNOTATION_CODE: i32 = 0;
    pub const PROTOCOL_CODE: i32 = 1;
    pub const BINARY_CODE: i32 = 2;

    /// Map a raw type code onto an output type
    pub fn from_code(code: i32) -> Self {
        match code {
            Self::ANNOTATION_CODE => OutputType::Annotation,
            Self::PROTOCOL_CODE => OutputType::Protocol,
            Self::BINARY_CODE => OutputType::Binary,
            other => OutputType::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            OutputType::Annotation => Self::ANNOTATION_CODE,
            OutputType::Protocol => Self::PROTOCOL_CODE,
            OutputType::Binary => Self::BINARY_CODE,
            OutputType::Unknown(code) => *code,
        }
    }

    /// Whether this is one of the recognized output types
    pub fn is_known(&self) -> bool {
        !matches!(self, OutputType::Unknown(_))
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutputType::Annotation => write!(f, "annotation"),
            OutputType::Protocol => write!(f, "protocol"),
            OutputType::Binary => write!(f, "binary"),
            OutputType::Unknown(code) => write!(f, "unknown({})", code),
        }
    }
}

/// Handle of an output stream within its instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputHandle(usize);

impl OutputHandle {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Display for OutputHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptor of one declared output stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputStream {
    pub output_type: OutputType,
    pub proto_id: String,
}

/// Ordered list of output streams owned by one instance
#[derive(Debug, Clone)]
pub struct OutputRegistry {
    streams: Vec<OutputStream>,
    capacity: usize,
}

impl OutputRegistry {
    /// Create a registry that accepts at most `capacity` streams
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            streams: Vec::new(),
            capacity,
        }
    }

    /// Append a stream and return its handle
    ///
    /// Returns `None` once the registry is full. Nothing else is validated
    /// here and duplicates are kept.
    pub fn register(
        &mut self,
        output_type: OutputType,
        proto_id: impl Into<String>,
    ) -> Option<OutputHandle> {
        if self.streams.len() >= self.capacity {
            return None;
        }
        self.streams.push(OutputStream {
            output_type,
            proto_id: proto_id.into(),
        });
        Some(OutputHandle(self.streams.len() - 1))
    }

    /// Look up the stream behind a raw handle
    pub fn resolve(&self, handle: i64) -> Option<&OutputStream> {
        usize::try_from(handle).ok().and_then(|i| self.streams.get(i))
    }

    pub fn get(&self, handle: OutputHandle) -> Option<&OutputStream> {
        self.streams.get(handle.0)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (OutputHandle, &OutputStream)> {
        self.streams
            .iter()
            .enumerate()
            .map(|(i, s)| (OutputHandle(i), s))
    }
}

impl Default for OutputRegistry {
    fn default() -> Self {
        Self::with_capacity(usize::MAX)
    }
}
