//! Stage-side view of the session
//!
//! A [`Context`] is handed to every `start()`/`decode()` call. It is the only
//! way a stage declares outputs and emits data units, and it can be used
//! re-entrantly: emitting protocol data runs stacked stages before `put`
//! returns.

use super::decoder::DecoderInfo;
use super::errors::{BoundaryError, DispatchError};
use super::instance::InstanceId;
use super::output::{OutputHandle, OutputType};
use super::session::{Dispatched, Session};
use super::value::Value;

#[derive(Clone, Copy)]
pub struct Context<'a> {
    session: &'a Session,
    instance: InstanceId,
}

impl<'a> Context<'a> {
    pub(crate) fn new(session: &'a Session, instance: InstanceId) -> Self {
        Self { session, instance }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    /// Id of the instance this context belongs to
    pub fn instance_name(&self) -> &'a str {
        self.session
            .instance(self.instance)
            .map(|i| i.id())
            .unwrap_or_default()
    }

    pub fn decoder(&self) -> Option<&'a DecoderInfo> {
        self.session.instance(self.instance).map(|i| i.info())
    }

    /// Declare a new output stream
    ///
    /// `Ok(None)` means no stream was created; that is not an error.
    pub fn add(
        &self,
        output_type: OutputType,
        proto_id: &str,
    ) -> Result<Option<OutputHandle>, BoundaryError> {
        self.session.add(self.instance, output_type, proto_id)
    }

    /// Emit a data unit, ignoring the outcome
    ///
    /// Failures are contained and logged by the session.
    pub fn put(&self, start: u64, end: u64, handle: OutputHandle, data: &Value) {
        let _ = self.try_put(start, end, handle, data);
    }

    /// Emit a data unit and report what happened to it
    pub fn try_put(
        &self,
        start: u64,
        end: u64,
        handle: OutputHandle,
        data: &Value,
    ) -> Result<Dispatched, DispatchError> {
        self.session.put(self.instance, start, end, handle, data)
    }

    /// Untyped `add(output_type, proto_id)`
    pub fn add_args(&self, args: &[Value]) -> Result<Option<OutputHandle>, BoundaryError> {
        check_arity("add", args, 2)?;
        let code = int_arg("add", args, 0)?;
        let code = i32::try_from(code).map_err(|_| BoundaryError::ArgumentRange {
            method: "add",
            index: 0,
            value: code,
        })?;
        let proto_id = args[1].as_str().ok_or(BoundaryError::ArgumentType {
            method: "add",
            index: 1,
            expected: "str",
            found: args[1].type_name(),
        })?;
        self.add(OutputType::from_code(code), proto_id)
    }

    /// Untyped `put(start, end, output_id, data)`
    ///
    /// Only argument shape is checked here. Problems with the emission itself
    /// are contained like any other `put`.
    pub fn put_args(&self, args: &[Value]) -> Result<(), BoundaryError> {
        check_arity("put", args, 4)?;
        let start = sample_arg("put", args, 0)?;
        let end = sample_arg("put", args, 1)?;
        let handle = int_arg("put", args, 2)?;
        if i32::try_from(handle).is_err() {
            return Err(BoundaryError::ArgumentRange {
                method: "put",
                index: 2,
                value: handle,
            });
        }
        let _ = self
            .session
            .put_raw(self.instance, start, end, handle, &args[3]);
        Ok(())
    }
}

fn check_arity(method: &'static str, args: &[Value], expected: usize) -> Result<(), BoundaryError> {
    if args.len() != expected {
        return Err(BoundaryError::Arity {
            method,
            expected,
            found: args.len(),
        });
    }
    Ok(())
}

fn int_arg(method: &'static str, args: &[Value], index: usize) -> Result<i64, BoundaryError> {
    args[index].as_int().ok_or(BoundaryError::ArgumentType {
        method,
        index,
        expected: "int",
        found: args[index].type_name(),
    })
}

fn sample_arg(method: &'static str, args: &[Value], index: usize) -> Result<u64, BoundaryError> {
    let value = int_arg(method, args, index)?;
    u64::try_from(value).map_err(|_| BoundaryError::ArgumentRange {
        method,
        index,
        value,
    })
}
