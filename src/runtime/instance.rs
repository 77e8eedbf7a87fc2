//! Decoder instances and their identifiers

use super::decoder::{Decoder, DecoderInfo};
use super::output::{OutputHandle, OutputRegistry, OutputStream};
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

/// Unique identifier for an instance in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(usize);

impl InstanceId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

/// One running decoder
///
/// The instance owns its output streams. Its successors are ids into the
/// owning session and are not owned.
pub struct Instance {
    pub(crate) id: String,
    pub(crate) info: Arc<DecoderInfo>,
    pub(crate) decoder: RefCell<Box<dyn Decoder>>,
    pub(crate) outputs: RefCell<OutputRegistry>,
    pub(crate) next: Vec<InstanceId>,
}

impl Instance {
    pub(crate) fn new(
        id: String,
        info: Arc<DecoderInfo>,
        decoder: Box<dyn Decoder>,
        max_outputs: usize,
    ) -> Self {
        Self {
            id,
            info,
            decoder: RefCell::new(decoder),
            outputs: RefCell::new(OutputRegistry::with_capacity(max_outputs)),
            next: Vec::new(),
        }
    }

    /// Instance id, unique within the session
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn info(&self) -> &DecoderInfo {
        &self.info
    }

    /// Instances stacked directly on top of this one, in stacking order
    pub fn successors(&self) -> &[InstanceId] {
        &self.next
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.borrow().len()
    }

    /// Copy of the output stream behind `handle`
    pub fn output(&self, handle: OutputHandle) -> Option<OutputStream> {
        self.outputs.borrow().get(handle).cloned()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("decoder", &self.info.id)
            .field("outputs", &self.num_outputs())
            .field("next", &self.next)
            .finish()
    }
}
