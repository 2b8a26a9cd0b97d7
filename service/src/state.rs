//! Watcher state definitions.

/// Watcher operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Watcher is constructed but its loop has not started.
    Starting,
    /// Watcher is running refresh cycles.
    Running,
    /// Watcher is finishing its current cycle.
    ShuttingDown,
    /// Watcher is stopped.
    Stopped,
}

impl WatcherState {
    /// Check if new cycles may start.
    pub fn accepts_cycles(&self) -> bool {
        matches!(self, WatcherState::Starting | WatcherState::Running)
    }

    /// Check if the watcher is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WatcherState::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(WatcherState::Running.accepts_cycles());
        assert!(!WatcherState::Stopped.accepts_cycles());
        assert!(WatcherState::Starting.accepts_cycles());
        assert!(!WatcherState::ShuttingDown.accepts_cycles());
        assert!(WatcherState::Stopped.is_terminal());
        assert!(!WatcherState::ShuttingDown.is_terminal());
    }
}
