//! Decoder session: instance chain and output dispatch
//!
//! The session owns every decoder instance in an arena and records, per
//! instance, the ordered list of instances stacked on top of it. Structural
//! changes (`add_instance`, `stack`) need `&mut Session`; decoding runs through
//! `&Session`, so the chain cannot change while data is being dispatched.
//!
//! ## Dispatch
//!
//! When a stage emits a data unit the session resolves the output stream and
//! routes on its type:
//!
//! - **Annotation**: validated and handed to the host callback, if any
//! - **Protocol**: passed by reference to `decode()` of every successor, in
//!   stacking order, then to the protocol callback, if any
//! - **Binary**: dropped, not supported
//!
//! Every failure inside dispatch is logged and only drops the emission (or
//! the one failing successor). Nothing unwinds into the emitting stage.

use super::annotation;
use super::callback::{CallbackRegistry, ProtoData, ProtoPayload};
use super::context::Context;
use super::decoder::{Decoder, DecoderInfo};
use super::errors::{BoundaryError, DispatchError, SessionError, StageError};
use super::instance::{Instance, InstanceId};
use super::library::DecoderLibrary;
use super::output::{OutputHandle, OutputType};
use super::value::Value;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Default limit on output streams per instance
pub const DEFAULT_MAX_OUTPUTS: usize = 256;

/// What happened to a successfully dispatched data unit
#[derive(Debug)]
pub enum Dispatched {
    /// Annotation output; `delivered` is false when no callback is registered
    Annotation { delivered: bool },
    /// Protocol output handed to `invoked` successors
    Protocol {
        invoked: usize,
        failures: Vec<DispatchError>,
    },
}

/// Running dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub annotations_delivered: u64,
    pub protocol_forwarded: u64,
    pub dropped: u64,
    pub successor_failures: u64,
}

/// Owner of the instance chain and the dispatch engine
pub struct Session {
    instances: Vec<Instance>,
    instance_names: HashMap<String, InstanceId>,
    callbacks: CallbackRegistry,
    max_outputs: usize,
    check_sample_range: bool,
    started: Cell<bool>,
    stats: Cell<DispatchStats>,
}

impl Session {
    /// Create an empty session without callbacks
    pub fn new() -> Self {
        Self {
            instances: Vec::new(),
            instance_names: HashMap::new(),
            callbacks: CallbackRegistry::new(),
            max_outputs: DEFAULT_MAX_OUTPUTS,
            check_sample_range: true,
            started: Cell::new(false),
            stats: Cell::new(DispatchStats::default()),
        }
    }

    /// Install the host callbacks
    pub fn with_callbacks(mut self, callbacks: CallbackRegistry) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Limit the number of output streams each instance may declare
    pub fn with_max_outputs(mut self, max_outputs: usize) -> Self {
        self.max_outputs = max_outputs;
        self
    }

    /// Reject emissions whose start sample lies after their end sample
    pub fn with_sample_range_check(mut self, enabled: bool) -> Self {
        self.check_sample_range = enabled;
        self
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats.get()
    }

    fn bump(&self, f: impl FnOnce(&mut DispatchStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    // ────────────────────────────────────────────────────────────────────────
    // Instance chain
    // ────────────────────────────────────────────────────────────────────────

    /// Add an instance of a decoder
    pub fn add_instance(
        &mut self,
        instance_id: impl Into<String>,
        info: Arc<DecoderInfo>,
        decoder: Box<dyn Decoder>,
    ) -> Result<InstanceId, SessionError> {
        let instance_id = instance_id.into();
        if self.instance_names.contains_key(&instance_id) {
            return Err(SessionError::DuplicateInstance(instance_id));
        }

        let id = InstanceId::new(self.instances.len());
        debug!("Creating instance {} of decoder {}", instance_id, info.id);
        self.instance_names.insert(instance_id.clone(), id);
        self.instances
            .push(Instance::new(instance_id, info, decoder, self.max_outputs));
        Ok(id)
    }

    /// Instantiate a decoder from a library
    pub fn new_instance(
        &mut self,
        library: &DecoderLibrary,
        decoder_id: &str,
        instance_id: impl Into<String>,
    ) -> Result<InstanceId, SessionError> {
        let (info, decoder) = library.instantiate(decoder_id)?;
        self.add_instance(instance_id, info, decoder)
    }

    /// Stack `upper` on top of `lower`
    ///
    /// `upper` is appended to the successors of `lower` and will receive its
    /// protocol output after any successors stacked earlier.
    pub fn stack(&mut self, lower: InstanceId, upper: InstanceId) -> Result<(), SessionError> {
        let lower_inst = self.instance_or_err(lower)?;
        let upper_inst = self.instance_or_err(upper)?;

        if lower == upper {
            return Err(SessionError::SelfStack(lower_inst.id.clone()));
        }
        if lower_inst.next.contains(&upper) {
            return Err(SessionError::DuplicateStack {
                lower: lower_inst.id.clone(),
                upper: upper_inst.id.clone(),
            });
        }
        if self.reaches(upper, lower) {
            return Err(SessionError::StackCycle {
                lower: lower_inst.id.clone(),
                upper: upper_inst.id.clone(),
            });
        }

        let compatible = lower_inst
            .info
            .outputs
            .iter()
            .any(|proto| upper_inst.info.inputs.contains(proto));
        if !compatible {
            warn!(
                "Stacking {} on {}: none of {:?} is an input of {}",
                upper_inst.id, lower_inst.id, lower_inst.info.outputs, upper_inst.info.id
            );
        }

        info!("Stacking {} on top of {}", upper_inst.id, lower_inst.id);
        self.instances[lower.as_usize()].next.push(upper);
        Ok(())
    }

    /// Whether `to` can be reached from `from` by following successors
    fn reaches(&self, from: InstanceId, to: InstanceId) -> bool {
        let mut seen = vec![false; self.instances.len()];
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if std::mem::replace(&mut seen[id.as_usize()], true) {
                continue;
            }
            stack.extend(self.instances[id.as_usize()].next.iter().copied());
        }
        false
    }

    fn instance_or_err(&self, id: InstanceId) -> Result<&Instance, SessionError> {
        self.instance(id)
            .ok_or_else(|| SessionError::InstanceNotFound(format!("#{}", id.as_usize())))
    }

    pub fn instance(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(id.as_usize())
    }

    /// Look up an instance by its instance id
    pub fn find_instance(&self, instance_id: &str) -> Option<InstanceId> {
        self.instance_names.get(instance_id).copied()
    }

    pub fn successors(&self, id: InstanceId) -> &[InstanceId] {
        self.instance(id).map(|i| i.successors()).unwrap_or_default()
    }

    /// Instances not stacked on any other instance, in creation order
    pub fn roots(&self) -> Vec<InstanceId> {
        let mut stacked = vec![false; self.instances.len()];
        for inst in &self.instances {
            for next in &inst.next {
                stacked[next.as_usize()] = true;
            }
        }
        (0..self.instances.len())
            .filter(|&i| !stacked[i])
            .map(InstanceId::new)
            .collect()
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    // ────────────────────────────────────────────────────────────────────────
    // Decoding
    // ────────────────────────────────────────────────────────────────────────

    /// Call `start()` on every instance in creation order
    ///
    /// A session can only be started once.
    pub fn start(&self) -> Result<(), SessionError> {
        if self.started.replace(true) {
            return Err(SessionError::AlreadyStarted);
        }
        info!("Starting session with {} instances", self.instances.len());
        for (index, inst) in self.instances.iter().enumerate() {
            let ctx = Context::new(self, InstanceId::new(index));
            let result = match inst.decoder.try_borrow_mut() {
                Ok(mut decoder) => decoder.start(&ctx),
                Err(_) => Err(StageError::Busy),
            };
            result.map_err(|source| SessionError::Start {
                instance: inst.id.clone(),
                source,
            })?;
            debug!("Started {} with {} outputs", inst.id, inst.num_outputs());
        }
        Ok(())
    }

    /// Feed a data unit to every root instance
    pub fn send(&self, start: u64, end: u64, data: &Value) -> Result<(), SessionError> {
        trace!("Sending samples {}..{} to root instances", start, end);
        for id in self.roots() {
            let inst = &self.instances[id.as_usize()];
            self.call_decode(id, start, end, data)
                .map_err(|source| SessionError::Decode {
                    instance: inst.id.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    fn call_decode(
        &self,
        id: InstanceId,
        start: u64,
        end: u64,
        data: &Value,
    ) -> Result<(), StageError> {
        let inst = &self.instances[id.as_usize()];
        let mut decoder = inst.decoder.try_borrow_mut().map_err(|_| StageError::Busy)?;
        decoder.decode(&Context::new(self, id), start, end, data)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Output registration
    // ────────────────────────────────────────────────────────────────────────

    /// Declare an output stream on behalf of an instance
    ///
    /// Rejects unknown output types and empty identifiers. `Ok(None)` means
    /// the instance's registry declined the stream.
    pub fn add(
        &self,
        id: InstanceId,
        output_type: OutputType,
        proto_id: &str,
    ) -> Result<Option<OutputHandle>, BoundaryError> {
        if !output_type.is_known() {
            return Err(BoundaryError::UnknownOutputType(output_type.code()));
        }
        if proto_id.is_empty() {
            return Err(BoundaryError::EmptyIdentifier);
        }
        self.register_output(id, output_type, proto_id)
    }

    /// Append a stream to an instance's registry without validating it
    pub fn register_output(
        &self,
        id: InstanceId,
        output_type: OutputType,
        proto_id: &str,
    ) -> Result<Option<OutputHandle>, BoundaryError> {
        let inst = self.instance(id).ok_or(BoundaryError::InstanceNotFound)?;
        let handle = match inst.outputs.try_borrow_mut() {
            Ok(mut outputs) => outputs.register(output_type, proto_id),
            Err(_) => None,
        };
        match handle {
            Some(handle) => debug!(
                "Instance {} added {} output {} for '{}'",
                inst.id, output_type, handle, proto_id
            ),
            None => debug!(
                "Instance {} output registry declined {} output '{}'",
                inst.id, output_type, proto_id
            ),
        }
        Ok(handle)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Dispatch
    // ────────────────────────────────────────────────────────────────────────

    /// Dispatch a data unit emitted by `from` on output `handle`
    ///
    /// Errors are already logged when returned; they only concern this
    /// emission.
    pub fn put(
        &self,
        from: InstanceId,
        start: u64,
        end: u64,
        handle: OutputHandle,
        payload: &Value,
    ) -> Result<Dispatched, DispatchError> {
        let raw = i64::try_from(handle.as_usize()).unwrap_or(i64::MAX);
        self.put_raw(from, start, end, raw, payload)
    }

    pub(crate) fn put_raw(
        &self,
        from: InstanceId,
        start: u64,
        end: u64,
        handle: i64,
        payload: &Value,
    ) -> Result<Dispatched, DispatchError> {
        let result = self.route(from, start, end, handle, payload);
        if let Err(e) = &result {
            match e {
                DispatchError::MalformedAnnotation(_) => {
                    let instance = self.instance(from).map(|i| i.id()).unwrap_or_default();
                    error!("Instance {}: {}", instance, e);
                }
                _ => error!("{}", e),
            }
            self.bump(|s| s.dropped += 1);
        }
        result
    }

    fn route(
        &self,
        from: InstanceId,
        start: u64,
        end: u64,
        handle: i64,
        payload: &Value,
    ) -> Result<Dispatched, DispatchError> {
        let inst = self
            .instance(from)
            .ok_or(DispatchError::UnknownInstance(from.as_usize()))?;
        let decoder = inst.info.id.as_str();

        let stream = inst
            .outputs
            .borrow()
            .resolve(handle)
            .cloned()
            .ok_or_else(|| DispatchError::InvalidHandle {
                decoder: decoder.to_string(),
                instance: inst.id.clone(),
                handle,
            })?;

        if self.check_sample_range && start > end {
            return Err(DispatchError::InvalidSampleRange {
                decoder: decoder.to_string(),
                instance: inst.id.clone(),
                start,
                end,
            });
        }

        let output_handle = OutputHandle::new(handle as usize);
        trace!(
            "{} put {}..{} on {} output {}",
            inst.id, start, end, stream.output_type, output_handle
        );

        match stream.output_type {
            OutputType::Annotation => {
                if !self.callbacks.is_registered(OutputType::Annotation) {
                    return Ok(Dispatched::Annotation { delivered: false });
                }
                let ann = annotation::convert(decoder, &inst.info.annotations, payload)?;
                let data = ProtoData {
                    start_sample: start,
                    end_sample: end,
                    instance: &inst.id,
                    decoder: &inst.info,
                    handle: output_handle,
                    stream: &stream,
                    payload: ProtoPayload::Annotation(&ann),
                };
                let delivered = self.callbacks.invoke(OutputType::Annotation, &data);
                if delivered {
                    self.bump(|s| s.annotations_delivered += 1);
                }
                Ok(Dispatched::Annotation { delivered })
            }
            OutputType::Protocol => {
                let mut failures = Vec::new();
                for &next in &inst.next {
                    self.bump(|s| s.protocol_forwarded += 1);
                    if let Err(source) = self.call_decode(next, start, end, payload) {
                        let err = DispatchError::SuccessorFailure {
                            instance: self.instances[next.as_usize()].id.clone(),
                            source,
                        };
                        error!("{}", err);
                        self.bump(|s| s.successor_failures += 1);
                        failures.push(err);
                    }
                }

                let data = ProtoData {
                    start_sample: start,
                    end_sample: end,
                    instance: &inst.id,
                    decoder: &inst.info,
                    handle: output_handle,
                    stream: &stream,
                    payload: ProtoPayload::Protocol(payload),
                };
                self.callbacks.invoke(OutputType::Protocol, &data);

                Ok(Dispatched::Protocol {
                    invoked: inst.next.len(),
                    failures,
                })
            }
            OutputType::Binary => Err(DispatchError::UnsupportedOutputType {
                decoder: decoder.to_string(),
                instance: inst.id.clone(),
                output_type: OutputType::Binary,
            }),
            OutputType::Unknown(code) => Err(DispatchError::UnknownOutputType {
                decoder: decoder.to_string(),
                instance: inst.id.clone(),
                code,
            }),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::errors::{AnnotationError, StageResult};
    use std::cell::RefCell;
    use std::rc::Rc;

    type CallLog = Rc<RefCell<Vec<(String, u64, u64, Value)>>>;
    type AnnLog = Rc<RefCell<Vec<(u64, u64, usize, Vec<String>)>>>;

    /// Records every decode call into a shared log, optionally failing
    struct Recorder {
        name: &'static str,
        log: CallLog,
        fail: bool,
    }

    impl Decoder for Recorder {
        fn decode(&mut self, _ctx: &Context<'_>, start: u64, end: u64, data: &Value) -> StageResult {
            self.log
                .borrow_mut()
                .push((self.name.to_string(), start, end, data.clone()));
            if self.fail {
                return Err(StageError::Decode("boom".into()));
            }
            Ok(())
        }
    }

    /// Re-emits everything it receives on its own protocol output
    #[derive(Default)]
    struct Relay {
        out: Option<OutputHandle>,
    }

    impl Decoder for Relay {
        fn start(&mut self, ctx: &Context<'_>) -> StageResult {
            self.out = ctx.add(OutputType::Protocol, "relay")?;
            Ok(())
        }

        fn decode(&mut self, ctx: &Context<'_>, start: u64, end: u64, data: &Value) -> StageResult {
            if let Some(out) = self.out {
                let wrapped = Value::list([Value::from("RELAYED"), data.clone()]);
                ctx.put(start, end, out, &wrapped);
            }
            Ok(())
        }
    }

    fn info() -> Arc<DecoderInfo> {
        Arc::new(
            DecoderInfo::new("test", "Test")
                .with_input("logic")
                .with_output("test")
                .with_annotation("bit", "Bit")
                .with_annotation("byte", "Byte"),
        )
    }

    fn recorder(name: &'static str, log: &CallLog, fail: bool) -> Box<dyn Decoder> {
        Box::new(Recorder {
            name,
            log: Rc::clone(log),
            fail,
        })
    }

    fn annotation_callbacks() -> (CallbackRegistry, AnnLog) {
        let log: AnnLog = Rc::default();
        let sink = Rc::clone(&log);
        let mut callbacks = CallbackRegistry::new();
        callbacks
            .register(OutputType::Annotation, move |data| {
                let ann = data.annotation().unwrap();
                sink.borrow_mut()
                    .push((data.start_sample, data.end_sample, ann.format, ann.texts.clone()));
            })
            .unwrap();
        (callbacks, log)
    }

    #[test]
    fn test_annotation_reaches_callback() {
        let (callbacks, anns) = annotation_callbacks();
        let mut session = Session::new().with_callbacks(callbacks);
        let calls = CallLog::default();
        let a = session.add_instance("a", info(), recorder("a", &calls, false)).unwrap();

        let out = session.add(a, OutputType::Annotation, "test").unwrap().unwrap();
        let result = session.put(a, 100, 110, out, &Value::annotation(0, ["1"]));

        assert!(matches!(result, Ok(Dispatched::Annotation { delivered: true })));
        assert_eq!(*anns.borrow(), vec![(100, 110, 0, vec!["1".to_string()])]);
        assert_eq!(session.stats().annotations_delivered, 1);
    }

    #[test]
    fn test_unregistered_format_rejected() {
        let (callbacks, anns) = annotation_callbacks();
        let mut session = Session::new().with_callbacks(callbacks);
        let calls = CallLog::default();
        let a = session.add_instance("a", info(), recorder("a", &calls, false)).unwrap();
        let out = session.add(a, OutputType::Annotation, "test").unwrap().unwrap();

        let result = session.put(a, 100, 110, out, &Value::annotation(5, ["x"]));

        assert!(matches!(
            result,
            Err(DispatchError::MalformedAnnotation(AnnotationError::UnregisteredFormat {
                format: 5,
                ..
            }))
        ));
        assert!(anns.borrow().is_empty());
        assert_eq!(session.stats().dropped, 1);
    }

    #[test]
    fn test_annotation_without_callback_is_silent() {
        let mut session = Session::new();
        let calls = CallLog::default();
        let a = session.add_instance("a", info(), recorder("a", &calls, false)).unwrap();
        let out = session.add(a, OutputType::Annotation, "test").unwrap().unwrap();

        // Not even validated when nobody listens
        let result = session.put(a, 0, 1, out, &Value::from("garbage"));

        assert!(matches!(result, Ok(Dispatched::Annotation { delivered: false })));
        assert_eq!(session.stats(), DispatchStats::default());
    }

    #[test]
    fn test_invalid_handle_dispatches_nothing() {
        let (callbacks, anns) = annotation_callbacks();
        let mut session = Session::new().with_callbacks(callbacks);
        let calls = CallLog::default();
        let a = session.add_instance("a", info(), recorder("a", &calls, false)).unwrap();
        let b = session.add_instance("b", info(), recorder("b", &calls, false)).unwrap();
        session.stack(a, b).unwrap();
        session.add(a, OutputType::Protocol, "test").unwrap().unwrap();

        let result = session.put(a, 0, 1, OutputHandle::new(1), &Value::Int(1));

        assert!(matches!(
            result,
            Err(DispatchError::InvalidHandle { ref instance, handle: 1, .. }) if instance == "a"
        ));
        assert!(calls.borrow().is_empty());
        assert!(anns.borrow().is_empty());
    }

    #[test]
    fn test_protocol_fan_out_survives_failing_successor() {
        let mut session = Session::new();
        let calls = CallLog::default();
        let a = session.add_instance("a", info(), recorder("a", &calls, false)).unwrap();
        let b = session.add_instance("b", info(), recorder("b", &calls, true)).unwrap();
        let c = session.add_instance("c", info(), recorder("c", &calls, false)).unwrap();
        session.stack(a, b).unwrap();
        session.stack(a, c).unwrap();
        let out = session.add(a, OutputType::Protocol, "test").unwrap().unwrap();

        let payload = Value::list([Value::from("DATA"), Value::Int(0x42)]);
        let result = session.put(a, 5, 9, out, &payload).unwrap();

        match result {
            Dispatched::Protocol { invoked, failures } => {
                assert_eq!(invoked, 2);
                assert_eq!(failures.len(), 1);
                assert!(matches!(
                    &failures[0],
                    DispatchError::SuccessorFailure { instance, .. } if instance == "b"
                ));
            }
            other => panic!("unexpected dispatch result: {:?}", other),
        }

        let calls = calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], ("b".to_string(), 5, 9, payload.clone()));
        assert_eq!(calls[1], ("c".to_string(), 5, 9, payload));

        let stats = session.stats();
        assert_eq!(stats.protocol_forwarded, 2);
        assert_eq!(stats.successor_failures, 1);
        assert_eq!(stats.dropped, 0);
    }

    #[test]
    fn test_reentrant_dispatch() {
        let mut session = Session::new();
        let calls = CallLog::default();
        let a = session.add_instance("a", info(), recorder("a", &calls, false)).unwrap();
        let relay = session
            .add_instance("relay", info(), Box::new(Relay::default()))
            .unwrap();
        let sink = session.add_instance("sink", info(), recorder("sink", &calls, false)).unwrap();
        session.stack(a, relay).unwrap();
        session.stack(relay, sink).unwrap();
        session.start().unwrap();
        let out = session.add(a, OutputType::Protocol, "test").unwrap().unwrap();

        session.put(a, 1, 2, out, &Value::Int(7)).unwrap();

        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].3,
            Value::list([Value::from("RELAYED"), Value::Int(7)])
        );
        assert_eq!(session.stats().protocol_forwarded, 2);
    }

    #[test]
    fn test_binary_and_unknown_outputs_dropped() {
        let mut session = Session::new();
        let calls = CallLog::default();
        let a = session.add_instance("a", info(), recorder("a", &calls, false)).unwrap();

        let bin = session.add(a, OutputType::Binary, "raw").unwrap().unwrap();
        assert!(matches!(
            session.put(a, 0, 0, bin, &Value::Bytes(vec![1, 2])),
            Err(DispatchError::UnsupportedOutputType { .. })
        ));

        let odd = session
            .register_output(a, OutputType::Unknown(9), "odd")
            .unwrap()
            .unwrap();
        assert!(matches!(
            session.put(a, 0, 0, odd, &Value::None),
            Err(DispatchError::UnknownOutputType { ref instance, code: 9, .. }) if instance == "a"
        ));
        assert_eq!(session.stats().dropped, 2);
    }

    #[test]
    fn test_add_validation() {
        let mut session = Session::new().with_max_outputs(2);
        let calls = CallLog::default();
        let a = session.add_instance("a", info(), recorder("a", &calls, false)).unwrap();

        assert_eq!(
            session.add(a, OutputType::Unknown(5), "x").unwrap_err(),
            BoundaryError::UnknownOutputType(5)
        );
        assert_eq!(
            session.add(a, OutputType::Annotation, "").unwrap_err(),
            BoundaryError::EmptyIdentifier
        );

        let first = session.add(a, OutputType::Annotation, "x").unwrap();
        let second = session.add(a, OutputType::Protocol, "x").unwrap();
        assert_eq!(first, Some(OutputHandle::new(0)));
        assert_eq!(second, Some(OutputHandle::new(1)));

        // Registry full: no stream, but not an error
        assert_eq!(session.add(a, OutputType::Protocol, "y").unwrap(), None);

        let inst = session.instance(a).unwrap();
        assert_eq!(inst.num_outputs(), 2);
        assert_eq!(
            inst.output(OutputHandle::new(1)).unwrap().output_type,
            OutputType::Protocol
        );
    }

    #[test]
    fn test_sample_range_check() {
        let (callbacks, anns) = annotation_callbacks();
        let mut session = Session::new().with_callbacks(callbacks);
        let calls = CallLog::default();
        let a = session.add_instance("a", info(), recorder("a", &calls, false)).unwrap();
        let out = session.add(a, OutputType::Annotation, "test").unwrap().unwrap();

        assert!(matches!(
            session.put(a, 10, 5, out, &Value::annotation(0, ["1"])),
            Err(DispatchError::InvalidSampleRange { start: 10, end: 5, .. })
        ));

        let (callbacks, lenient_anns) = annotation_callbacks();
        let mut lenient = Session::new()
            .with_callbacks(callbacks)
            .with_sample_range_check(false);
        let b = lenient.add_instance("b", info(), recorder("b", &calls, false)).unwrap();
        let out = lenient.add(b, OutputType::Annotation, "test").unwrap().unwrap();
        assert!(matches!(
            lenient.put(b, 10, 5, out, &Value::annotation(0, ["1"])),
            Ok(Dispatched::Annotation { delivered: true })
        ));
        assert!(anns.borrow().is_empty());
        assert_eq!(*lenient_anns.borrow(), vec![(10, 5, 0, vec!["1".to_string()])]);
    }

    #[test]
    fn test_stack_validation() {
        let mut session = Session::new();
        let calls = CallLog::default();
        let a = session.add_instance("a", info(), recorder("a", &calls, false)).unwrap();
        let b = session.add_instance("b", info(), recorder("b", &calls, false)).unwrap();
        let c = session.add_instance("c", info(), recorder("c", &calls, false)).unwrap();

        assert!(matches!(
            session.add_instance("a", info(), recorder("a", &calls, false)),
            Err(SessionError::DuplicateInstance(_))
        ));
        assert!(matches!(session.stack(a, a), Err(SessionError::SelfStack(_))));

        session.stack(a, b).unwrap();
        session.stack(b, c).unwrap();
        assert!(matches!(
            session.stack(a, b),
            Err(SessionError::DuplicateStack { .. })
        ));
        assert!(matches!(
            session.stack(c, a),
            Err(SessionError::StackCycle { .. })
        ));
        assert!(matches!(
            session.stack(a, InstanceId::new(42)),
            Err(SessionError::InstanceNotFound(_))
        ));

        // Diamond is fine
        session.stack(a, c).unwrap();
        assert_eq!(session.successors(a), &[b, c]);
        assert_eq!(session.roots(), vec![a]);
        assert_eq!(session.find_instance("c"), Some(c));
    }

    #[test]
    fn test_send_feeds_roots_in_order() {
        let mut session = Session::new();
        let calls = CallLog::default();
        let x = session.add_instance("x", info(), recorder("x", &calls, false)).unwrap();
        session.add_instance("y", info(), recorder("y", &calls, false)).unwrap();
        let z = session.add_instance("z", info(), recorder("z", &calls, false)).unwrap();
        session.stack(x, z).unwrap();

        session.send(0, 99, &Value::Bytes(vec![0; 100])).unwrap();

        let names: Vec<_> = calls.borrow().iter().map(|c| c.0.clone()).collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn test_root_failure_reported_to_host() {
        let mut session = Session::new();
        let calls = CallLog::default();
        session.add_instance("bad", info(), recorder("bad", &calls, true)).unwrap();

        let err = session.send(0, 0, &Value::None).unwrap_err();
        assert!(matches!(err, SessionError::Decode { ref instance, .. } if instance == "bad"));
    }

    /// Logs its own name into a shared list on every decode
    struct Named {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Decoder for Named {
        fn decode(&mut self, _ctx: &Context<'_>, _start: u64, _end: u64, _data: &Value) -> StageResult {
            self.log.borrow_mut().push(self.name.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_protocol_callback_sees_payload_after_successors() {
        let order: Rc<RefCell<Vec<String>>> = Rc::default();
        let sink = Rc::clone(&order);
        let mut callbacks = CallbackRegistry::new();
        callbacks
            .register(OutputType::Protocol, move |data| {
                sink.borrow_mut().push(format!("tap:{}", data.stream.proto_id));
            })
            .unwrap();

        let mut session = Session::new().with_callbacks(callbacks);
        let calls = CallLog::default();
        let a = session.add_instance("a", info(), recorder("a", &calls, false)).unwrap();
        let b = session
            .add_instance("b", info(), Box::new(Named { name: "b", log: Rc::clone(&order) }))
            .unwrap();
        session.stack(a, b).unwrap();
        let out = session.add(a, OutputType::Protocol, "proto-a").unwrap().unwrap();

        session.put(a, 0, 0, out, &Value::Int(1)).unwrap();

        assert_eq!(*order.borrow(), vec!["b", "tap:proto-a"]);
    }

    #[test]
    fn test_start_only_once() {
        let mut session = Session::new();
        session
            .add_instance("relay", info(), Box::new(Relay::default()))
            .unwrap();
        session.start().unwrap();
        assert!(matches!(session.start(), Err(SessionError::AlreadyStarted)));

        let inst = session.instance(InstanceId::new(0)).unwrap();
        assert_eq!(inst.num_outputs(), 1);
    }
}
