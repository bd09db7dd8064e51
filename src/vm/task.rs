//! The cooperative task protocol.
//!
//! Script code never blocks inside the interpreter. When a channel
//! operation reaches a point that would block, the task suspends with a
//! [`PendingOp`] describing what it needs; the host driver performs the
//! blocking operation and resumes the task with a [`ChanOutcome`]. One
//! resume point exists per task and the driver owns it.

use crate::engine::Engine;
use crate::error::ScriptError;
use crate::host::channel::{ChanPayload, ChannelRef};
use crate::vm::value::ScriptValue;

/// A channel operation a suspended task is waiting on.
#[derive(Debug)]
pub enum PendingOp {
    Send {
        chan: ChannelRef,
        payload: ChanPayload,
    },
    Recv {
        chan: ChannelRef,
    },
    Close {
        chan: ChannelRef,
    },
}

/// What the host-side operation produced, handed back on resume.
#[derive(Debug)]
pub enum ChanOutcome {
    Sent,
    /// `ok` is false once the channel is closed and drained.
    Received {
        payload: Option<ChanPayload>,
        ok: bool,
    },
    Closed,
}

/// One step of a driven task.
#[derive(Debug)]
pub enum TaskStep {
    /// The task ran to completion with these return values.
    Done(Vec<ScriptValue>),
    /// The task suspended; the driver must perform this operation and
    /// resume.
    Pending(PendingOp),
}

/// What a resume call feeds into the task.
#[derive(Debug)]
pub enum ResumeInput {
    /// First resume: the task's arguments.
    Start(Vec<ScriptValue>),
    /// Subsequent resumes: the outcome of the pending operation.
    Resumed(ChanOutcome),
}

/// A resumable script task.
///
/// Implementations model the interpreter's coroutines: `resume` runs
/// until the task either finishes or suspends on a channel operation.
pub trait ScriptTask {
    fn resume(&mut self, engine: &mut Engine, input: ResumeInput)
        -> Result<TaskStep, ScriptError>;
}

/// Fold a suspension signal back into a step.
///
/// Task bodies call script functions that raise
/// [`ScriptError::Suspended`] when they would block; this turns that
/// signal into [`TaskStep::Pending`] and lets real errors through.
pub fn step_from_result(
    result: Result<Vec<ScriptValue>, ScriptError>,
) -> Result<TaskStep, ScriptError> {
    match result {
        Ok(values) => Ok(TaskStep::Done(values)),
        Err(ScriptError::Suspended(op)) => Ok(TaskStep::Pending(op)),
        Err(err) => Err(err),
    }
}
