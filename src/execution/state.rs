//! Process lifecycle state machine.

/// Lifecycle state of a running invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessState {
    /// The process has not been spawned yet.
    #[default]
    NotStarted,
    /// The OS process exists and may still be running.
    Started,
    /// The process has exited, been destroyed, or failed to launch.
    Terminated,
}

impl ProcessState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - NotStarted -> Started
    /// - NotStarted -> Terminated (launch failure)
    /// - Started -> Terminated
    pub fn can_transition_to(&self, target: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (*self, target),
            (NotStarted, Started) | (NotStarted, Terminated) | (Started, Terminated)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: ProcessState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::ExecError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Terminated)
    }

    /// Check if the process has been spawned at some point.
    pub fn is_started(&self) -> bool {
        !matches!(self, ProcessState::NotStarted)
    }
}
