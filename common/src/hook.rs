use crate::types::StateChange;

/// Observer for state changes nobody asked for, i.e. the timer firing.
pub trait StateChangeHook: Send + Sync {
    fn on_state_change(&self, change: StateChange);
}

impl<F> StateChangeHook for F
where
    F: Fn(StateChange) + Send + Sync,
{
    fn on_state_change(&self, change: StateChange) {
        self(change)
    }
}
