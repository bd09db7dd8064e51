//! Channels across two engine instances on two threads.
//!
//! Each thread owns its own engine; the channel handle is the only
//! thing they share. The script side never blocks: channel members
//! suspend the task and the driver performs the blocking operation.

use std::thread;

use moonbridge::driver::recv_values;
use moonbridge::{
    Category, ChanOutcome, Driver, Engine, HandleId, HostChannel, HostValue, PendingOp,
    ResumeInput, ScriptError, ScriptTask, ScriptValue, TaskStep, TypeDescriptor,
};

fn chan_handle(engine: &mut Engine, chan: moonbridge::ChannelRef) -> HandleId {
    let sv = engine.to_foreign(&HostValue::Chan(chan), true);
    match sv {
        ScriptValue::Foreign(id) => id,
        other => panic!("expected a channel handle, got {other:?}"),
    }
}

/// Calls a channel member through the proxy layer and folds the
/// suspension into a task step.
fn invoke_member(
    engine: &mut Engine,
    id: HandleId,
    member: &str,
    args: &[ScriptValue],
) -> Result<TaskStep, ScriptError> {
    let f = engine.index_get(id, &ScriptValue::str(member))?;
    let ScriptValue::Function(f) = f else {
        return Err(ScriptError::runtime("channel member is not callable"));
    };
    match f.call(engine, args) {
        Ok(values) => Ok(TaskStep::Done(values)),
        Err(ScriptError::Suspended(op)) => Ok(TaskStep::Pending(op)),
        Err(err) => Err(err),
    }
}

/// Sends a fixed series of numbers, then closes the channel.
struct Producer {
    id: HandleId,
    values: Vec<f64>,
    sent: usize,
}

impl ScriptTask for Producer {
    fn resume(
        &mut self,
        engine: &mut Engine,
        input: ResumeInput,
    ) -> Result<TaskStep, ScriptError> {
        match input {
            ResumeInput::Start(_) => {
                let v = self.values[0];
                invoke_member(engine, self.id, "send", &[ScriptValue::Number(v)])
            }
            ResumeInput::Resumed(ChanOutcome::Sent) => {
                self.sent += 1;
                if self.sent < self.values.len() {
                    let v = self.values[self.sent];
                    invoke_member(engine, self.id, "send", &[ScriptValue::Number(v)])
                } else {
                    invoke_member(engine, self.id, "close", &[])
                }
            }
            ResumeInput::Resumed(ChanOutcome::Closed) => Ok(TaskStep::Done(vec![])),
            other => Err(ScriptError::runtime(format!(
                "producer resumed with unexpected input: {other:?}"
            ))),
        }
    }
}

/// Receives until the channel closes, collecting what it saw.
struct Consumer {
    id: HandleId,
    collected: Vec<f64>,
}

impl ScriptTask for Consumer {
    fn resume(
        &mut self,
        engine: &mut Engine,
        input: ResumeInput,
    ) -> Result<TaskStep, ScriptError> {
        match input {
            ResumeInput::Start(_) => invoke_member(engine, self.id, "recv", &[]),
            ResumeInput::Resumed(outcome @ ChanOutcome::Received { .. }) => {
                let pair = recv_values(engine, outcome);
                match (&pair[0], &pair[1]) {
                    (ScriptValue::Number(n), ScriptValue::Bool(true)) => {
                        self.collected.push(*n);
                        invoke_member(engine, self.id, "recv", &[])
                    }
                    (_, ScriptValue::Bool(false)) => Ok(TaskStep::Done(
                        self.collected
                            .iter()
                            .map(|n| ScriptValue::Number(*n))
                            .collect(),
                    )),
                    other => Err(ScriptError::runtime(format!(
                        "consumer got an unexpected pair: {other:?}"
                    ))),
                }
            }
            other => Err(ScriptError::runtime(format!(
                "consumer resumed with unexpected input: {other:?}"
            ))),
        }
    }
}

#[test]
fn values_flow_between_two_engines_on_two_threads() {
    // A rendezvous channel forces a real cross-thread handoff per value.
    let chan = HostChannel::new(Some(0), TypeDescriptor::primitive(Category::Float));

    let producer_chan = chan.clone();
    let producer = thread::spawn(move || {
        let mut engine = Engine::new();
        let id = chan_handle(&mut engine, producer_chan);
        let mut task = Producer {
            id,
            values: vec![1.0, 2.0, 3.0],
            sent: 0,
        };
        Driver::new().drive(&mut engine, &mut task, vec![]).unwrap();
    });

    let consumer_chan = chan.clone();
    let consumer = thread::spawn(move || {
        let mut engine = Engine::new();
        let id = chan_handle(&mut engine, consumer_chan);
        let mut task = Consumer {
            id,
            collected: vec![],
        };
        Driver::new().drive(&mut engine, &mut task, vec![]).unwrap();
        task.collected
    });

    producer.join().unwrap();
    let collected = consumer.join().unwrap();
    assert_eq!(collected, vec![1.0, 2.0, 3.0]);
    assert!(chan.is_closed());
}

#[test]
fn send_converts_against_the_element_type() {
    let chan = HostChannel::new(None, TypeDescriptor::primitive(Category::Signed));
    let mut engine = Engine::new();
    let id = chan_handle(&mut engine, chan.clone());

    // A fractional number cannot narrow to the integer element type.
    let step = invoke_member(
        &mut engine,
        id,
        "send",
        &[ScriptValue::Number(1.5)],
    );
    assert!(step.is_err());

    // An integral one suspends with the converted payload.
    let step = invoke_member(&mut engine, id, "send", &[ScriptValue::Number(4.0)]).unwrap();
    let TaskStep::Pending(PendingOp::Send { payload, .. }) = step else {
        panic!("expected a pending send");
    };
    assert_eq!(payload, moonbridge::ChanPayload::Int(4));
}

#[test]
fn suspension_without_a_driver_is_an_error() {
    let chan = HostChannel::new(None, TypeDescriptor::primitive(Category::Float));
    let mut engine = Engine::new();
    let id = chan_handle(&mut engine, chan);
    let f = engine.index_get(id, &ScriptValue::str("recv")).unwrap();
    let ScriptValue::Function(f) = f else {
        panic!("expected a function");
    };
    let err = f.call(&mut engine, &[]).unwrap_err();
    assert!(matches!(err, ScriptError::Suspended(_)));
}

#[test]
fn unknown_channel_member_is_rejected() {
    let chan = HostChannel::new(None, TypeDescriptor::primitive(Category::Float));
    let mut engine = Engine::new();
    let id = chan_handle(&mut engine, chan);
    assert!(engine.index_get(id, &ScriptValue::str("flush")).is_err());
}
