//! Catalogue of loadable decoder types

use super::decoder::{Decoder, DecoderInfo};
use super::errors::LibraryError;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

type DecoderFactory = Arc<dyn Fn() -> Box<dyn Decoder> + Send + Sync>;

struct LibraryEntry {
    info: Arc<DecoderInfo>,
    factory: DecoderFactory,
}

/// Decoder types available for instantiation, in load order
#[derive(Clone, Default)]
pub struct DecoderLibrary {
    entries: Vec<LibraryEntry>,
}

impl Clone for LibraryEntry {
    fn clone(&self) -> Self {
        Self {
            info: Arc::clone(&self.info),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl DecoderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a decoder type
    ///
    /// The metadata is checked once here: the decoder id must be non-empty and
    /// unused, and every annotation format needs a unique, non-empty id.
    pub fn load<F>(&mut self, info: DecoderInfo, factory: F) -> Result<Arc<DecoderInfo>, LibraryError>
    where
        F: Fn() -> Box<dyn Decoder> + Send + Sync + 'static,
    {
        if info.id.is_empty() {
            return Err(LibraryError::EmptyDecoderId);
        }
        if self.get(&info.id).is_some() {
            return Err(LibraryError::DuplicateDecoder(info.id));
        }

        {
            let mut seen = HashSet::new();
            for (index, format) in info.annotations.iter().enumerate() {
                if format.id.is_empty() {
                    return Err(LibraryError::EmptyAnnotationId {
                        decoder: info.id.clone(),
                        index,
                    });
                }
                if !seen.insert(format.id.as_str()) {
                    return Err(LibraryError::DuplicateAnnotation {
                        decoder: info.id.clone(),
                        format: format.id.clone(),
                    });
                }
            }
        }

        debug!(
            "Loaded decoder {} with {} annotation formats",
            info.id,
            info.annotations.len()
        );
        let info = Arc::new(info);
        self.entries.push(LibraryEntry {
            info: Arc::clone(&info),
            factory: Arc::new(factory),
        });
        Ok(info)
    }

    pub fn get(&self, id: &str) -> Option<Arc<DecoderInfo>> {
        self.entries
            .iter()
            .find(|e| e.info.id == id)
            .map(|e| Arc::clone(&e.info))
    }

    /// Decoder ids in load order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.info.id.as_str())
    }

    /// Create a fresh decoder of type `id`
    pub fn instantiate(&self, id: &str) -> Result<(Arc<DecoderInfo>, Box<dyn Decoder>), LibraryError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.info.id == id)
            .ok_or_else(|| LibraryError::DecoderNotFound(id.to_string()))?;
        Ok((Arc::clone(&entry.info), (entry.factory)()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for DecoderLibrary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

// Built-in decoder library
lazy_static::lazy_static! {
    static ref BUILTIN_DECODERS: DecoderLibrary = {
        let mut library = DecoderLibrary::new();

        use crate::nodes::decoders::{SpiDecoder, SpiRegisterDecoder};
        if let Err(e) = library.load(SpiDecoder::info(), || Box::new(SpiDecoder::default()) as Box<dyn Decoder>) {
            error!("Failed to load built-in decoder: {}", e);
        }
        if let Err(e) = library.load(SpiRegisterDecoder::info(), || Box::new(SpiRegisterDecoder::default()) as Box<dyn Decoder>) {
            error!("Failed to load built-in decoder: {}", e);
        }

        library
    };
}

/// Decoders shipped with the crate
pub fn builtin_decoders() -> &'static DecoderLibrary {
    &BUILTIN_DECODERS
}
