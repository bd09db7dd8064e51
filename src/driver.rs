//! The host-side task driver.
//!
//! Script tasks never block; they suspend with a pending channel
//! operation. The driver owns the task's single resume point: it
//! performs each pending operation with real blocking on the host
//! thread, then resumes the task with the outcome, until the task
//! completes. Two engine instances on two threads sharing a channel
//! drive values between their scripts this way.

use tracing::debug;

use crate::engine::Engine;
use crate::error::ScriptError;
use crate::vm::task::{ChanOutcome, PendingOp, ResumeInput, ScriptTask, TaskStep};
use crate::vm::value::ScriptValue;

#[derive(Debug, Default)]
pub struct Driver;

impl Driver {
    pub fn new() -> Driver {
        Driver
    }

    /// Run a task to completion, performing its channel operations.
    pub fn drive(
        &self,
        engine: &mut Engine,
        task: &mut dyn ScriptTask,
        args: Vec<ScriptValue>,
    ) -> Result<Vec<ScriptValue>, ScriptError> {
        let mut input = ResumeInput::Start(args);
        loop {
            match task.resume(engine, input)? {
                TaskStep::Done(values) => return Ok(values),
                TaskStep::Pending(op) => {
                    let outcome = self.perform(op)?;
                    input = ResumeInput::Resumed(outcome);
                }
            }
        }
    }

    /// Perform one blocking channel operation on this thread.
    ///
    /// A send on a closed channel is a script runtime error, the same
    /// error a script would hit sending on a closed channel directly.
    fn perform(&self, op: PendingOp) -> Result<ChanOutcome, ScriptError> {
        match op {
            PendingOp::Send { chan, payload } => {
                debug!("performing pending send");
                chan.send(payload)
                    .map_err(|_| ScriptError::runtime("send on closed channel"))?;
                Ok(ChanOutcome::Sent)
            }
            PendingOp::Recv { chan } => {
                debug!("performing pending recv");
                let (payload, ok) = chan.recv();
                Ok(ChanOutcome::Received { payload, ok })
            }
            PendingOp::Close { chan } => {
                debug!("performing pending close");
                chan.close();
                Ok(ChanOutcome::Closed)
            }
        }
    }
}

/// Turn a receive outcome into the `(value, ok)` pair script code sees.
pub fn recv_values(engine: &mut Engine, outcome: ChanOutcome) -> Vec<ScriptValue> {
    match outcome {
        ChanOutcome::Received {
            payload: Some(payload),
            ok,
        } => {
            let mut cx = crate::convert::ConversionContext::new();
            let value = crate::convert::to_foreign(engine, &mut cx, &payload.into_host(), None, false);
            vec![value, ScriptValue::Bool(ok)]
        }
        ChanOutcome::Received { payload: None, ok } => {
            vec![ScriptValue::Nil, ScriptValue::Bool(ok)]
        }
        _ => vec![ScriptValue::Nil, ScriptValue::Bool(false)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Category, TypeDescriptor};
    use crate::host::channel::{ChanPayload, HostChannel};
    use crate::vm::task::step_from_result;

    /// A task that sends its argument, then closes the channel.
    struct SendThenClose {
        chan: crate::host::channel::ChannelRef,
        state: u8,
    }

    impl ScriptTask for SendThenClose {
        fn resume(
            &mut self,
            _engine: &mut Engine,
            input: ResumeInput,
        ) -> Result<TaskStep, ScriptError> {
            match (self.state, input) {
                (0, ResumeInput::Start(args)) => {
                    self.state = 1;
                    let payload = match args.first() {
                        Some(ScriptValue::Number(n)) => ChanPayload::Float(*n),
                        _ => ChanPayload::Nil,
                    };
                    step_from_result(Err(ScriptError::Suspended(PendingOp::Send {
                        chan: self.chan.clone(),
                        payload,
                    })))
                }
                (1, ResumeInput::Resumed(ChanOutcome::Sent)) => {
                    self.state = 2;
                    step_from_result(Err(ScriptError::Suspended(PendingOp::Close {
                        chan: self.chan.clone(),
                    })))
                }
                (2, ResumeInput::Resumed(ChanOutcome::Closed)) => Ok(TaskStep::Done(vec![])),
                _ => Err(ScriptError::runtime("unexpected resume")),
            }
        }
    }

    #[test]
    fn drive_runs_send_and_close_to_completion() {
        let chan = HostChannel::new(None, TypeDescriptor::primitive(Category::Float));
        let mut engine = Engine::new();
        let mut task = SendThenClose {
            chan: chan.clone(),
            state: 0,
        };
        Driver::new()
            .drive(&mut engine, &mut task, vec![ScriptValue::Number(7.0)])
            .unwrap();
        assert_eq!(chan.recv(), (Some(ChanPayload::Float(7.0)), true));
        assert_eq!(chan.recv(), (None, false));
        assert!(chan.is_closed());
    }

    #[test]
    fn send_on_a_closed_channel_fails_the_task() {
        let chan = HostChannel::new(None, TypeDescriptor::primitive(Category::Float));
        chan.close();
        let mut engine = Engine::new();
        let mut task = SendThenClose {
            chan: chan.clone(),
            state: 0,
        };
        let err = Driver::new()
            .drive(&mut engine, &mut task, vec![ScriptValue::Number(1.0)])
            .unwrap_err();
        assert_eq!(err.message(), "send on closed channel");
    }
}
