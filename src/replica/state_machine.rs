use bytes::Bytes;

/// StateMachine is the application specific view of applying the replicated logs in sequential
/// consistent order.
pub trait StateMachine: Send {
    /// apply is called only when it's guaranteed that the provided command has been committed
    /// (i.e. replicated to a majority), in log order, exactly once per process lifetime. The
    /// returned output is handed back to the client whose write produced the command.
    fn apply(&mut self, command: Bytes) -> StateMachineOutput;

    /// Point-in-time copy of the state machine, stored in the snapshot store on request.
    fn snapshot(&self) -> Bytes {
        Bytes::new()
    }

    /// Replace all state with a previously taken snapshot. Called once at startup, before any
    /// entry is applied.
    fn restore(&mut self, _snapshot: Bytes) {}
}

#[derive(Clone, Debug, PartialEq)]
pub enum StateMachineOutput {
    Data(Bytes),
    NoData,
}

pub struct NoOpStateMachine {
    // nothing
}

impl NoOpStateMachine {
    pub fn new() -> Self {
        NoOpStateMachine {}
    }
}

impl StateMachine for NoOpStateMachine {
    fn apply(&mut self, _: Bytes) -> StateMachineOutput {
        StateMachineOutput::NoData
    }
}
