//! Host callbacks receiving completed data units
//!
//! The host registers at most one callback per output kind before any
//! decoding starts, then hands the registry to the session.

use super::annotation::Annotation;
use super::decoder::DecoderInfo;
use super::errors::SessionError;
use super::output::{OutputHandle, OutputStream, OutputType};
use super::value::Value;
use std::cell::RefCell;
use std::fmt;
use tracing::warn;

/// Payload of a completed data unit
#[derive(Debug, Clone, Copy)]
pub enum ProtoPayload<'a> {
    Annotation(&'a Annotation),
    Protocol(&'a Value),
}

/// A data unit as seen by host callbacks
///
/// Only valid for the duration of the callback.
#[derive(Debug, Clone, Copy)]
pub struct ProtoData<'a> {
    pub start_sample: u64,
    pub end_sample: u64,
    /// Id of the emitting instance
    pub instance: &'a str,
    pub decoder: &'a DecoderInfo,
    pub handle: OutputHandle,
    pub stream: &'a OutputStream,
    pub payload: ProtoPayload<'a>,
}

impl<'a> ProtoData<'a> {
    pub fn annotation(&self) -> Option<&'a Annotation> {
        match self.payload {
            ProtoPayload::Annotation(ann) => Some(ann),
            ProtoPayload::Protocol(_) => None,
        }
    }

    /// Id of the annotation format, if this is an annotation
    pub fn annotation_format_id(&self) -> Option<&'a str> {
        let ann = self.annotation()?;
        self.decoder
            .annotations
            .get(ann.format)
            .map(|f| f.id.as_str())
    }
}

pub type Callback = Box<dyn FnMut(&ProtoData<'_>)>;

/// One callback slot per output kind
#[derive(Default)]
pub struct CallbackRegistry {
    annotation: Option<RefCell<Callback>>,
    protocol: Option<RefCell<Callback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the callback for `kind`
    ///
    /// Annotation and protocol outputs accept callbacks. A kind can only be
    /// registered once.
    pub fn register<F>(&mut self, kind: OutputType, callback: F) -> Result<(), SessionError>
    where
        F: FnMut(&ProtoData<'_>) + 'static,
    {
        let slot = match kind {
            OutputType::Annotation => &mut self.annotation,
            OutputType::Protocol => &mut self.protocol,
            other => return Err(SessionError::CallbackNotSupported(other)),
        };
        if slot.is_some() {
            return Err(SessionError::DuplicateCallback(kind));
        }
        let callback: Callback = Box::new(callback);
        *slot = Some(RefCell::new(callback));
        Ok(())
    }

    pub fn is_registered(&self, kind: OutputType) -> bool {
        self.slot(kind).is_some()
    }

    fn slot(&self, kind: OutputType) -> Option<&RefCell<Callback>> {
        match kind {
            OutputType::Annotation => self.annotation.as_ref(),
            OutputType::Protocol => self.protocol.as_ref(),
            _ => None,
        }
    }

    /// Invoke the callback for `kind`, returning whether one ran
    pub(crate) fn invoke(&self, kind: OutputType, data: &ProtoData<'_>) -> bool {
        let Some(slot) = self.slot(kind) else {
            return false;
        };
        match slot.try_borrow_mut() {
            Ok(mut callback) => {
                (*callback)(data);
                true
            }
            Err(_) => {
                warn!("{} callback re-entered from {}, skipping", kind, data.instance);
                false
            }
        }
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("annotation", &self.annotation.is_some())
            .field("protocol", &self.protocol.is_some())
            .finish()
    }
}
