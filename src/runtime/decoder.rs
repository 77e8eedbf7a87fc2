//! Decoder trait and static decoder metadata
//!
//! A decoder type is described once by a [`DecoderInfo`] and instantiated any
//! number of times. Instances implement [`Decoder`]: they declare output
//! streams in `start()` and receive data units through `decode()`.

use super::annotation::AnnotationFormat;
use super::context::Context;
use super::errors::StageResult;
use super::value::Value;

/// Static metadata of a decoder type, fixed at load time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderInfo {
    pub id: String,
    pub name: String,
    pub longname: String,
    pub description: String,
    /// Protocol ids this decoder accepts from lower decoders
    pub inputs: Vec<String>,
    /// Protocol ids this decoder produces for stacked decoders
    pub outputs: Vec<String>,
    pub annotations: Vec<AnnotationFormat>,
}

impl DecoderInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            longname: String::new(),
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn with_longname(mut self, longname: impl Into<String>) -> Self {
        self.longname = longname.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_input(mut self, proto_id: impl Into<String>) -> Self {
        self.inputs.push(proto_id.into());
        self
    }

    pub fn with_output(mut self, proto_id: impl Into<String>) -> Self {
        self.outputs.push(proto_id.into());
        self
    }

    /// Append an annotation format; its index is the format id
    pub fn with_annotation(mut self, id: impl Into<String>, description: impl Into<String>) -> Self {
        self.annotations.push(AnnotationFormat::new(id, description));
        self
    }

    /// Index of the annotation format with the given id
    pub fn annotation_index(&self, id: &str) -> Option<usize> {
        self.annotations.iter().position(|a| a.id == id)
    }
}

/// A decoding stage
///
/// Stages are driven synchronously. `decode()` may emit data through the
/// context, which in turn calls `decode()` on stacked stages before returning.
pub trait Decoder {
    /// Called once when the session starts. Output streams are declared here.
    fn start(&mut self, ctx: &Context<'_>) -> StageResult {
        let _ = ctx;
        Ok(())
    }

    /// Consume one data unit covering samples `start..=end`
    fn decode(&mut self, ctx: &Context<'_>, start: u64, end: u64, data: &Value) -> StageResult;
}
