//! Table-driven state machine.
//!
//! Each state tag maps to a [`StateHandlers`] record of plain function
//! pointers. The record is looked up once when the state is entered and kept
//! until the next transition, so an update is a single indirect call.

use std::fmt::Debug;

/// Enter / update / exit callbacks for one state, operating on context `C`.
///
/// `update` returns the state to switch to, if any.
pub struct StateHandlers<S, C> {
    pub enter: fn(&mut C),
    pub update: fn(&mut C) -> Option<S>,
    pub exit: fn(&mut C),
}

// Manual impls: a derive would require `S: Clone, C: Clone`.
impl<S, C> Clone for StateHandlers<S, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, C> Copy for StateHandlers<S, C> {}

impl<S, C> Debug for StateHandlers<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateHandlers").finish_non_exhaustive()
    }
}

impl<S, C> StateHandlers<S, C> {
    /// Handlers that do nothing and never transition.
    pub fn idle() -> Self {
        Self {
            enter: |_| {},
            update: |_| None,
            exit: |_| {},
        }
    }
}

/// Dispatch table from a state tag to its handlers.
pub trait StateTable<C>: Copy + Eq + Debug + Sized {
    fn handlers(self) -> StateHandlers<Self, C>;
}

#[derive(Debug, Clone)]
pub struct StateMachine<S: StateTable<C>, C> {
    current: S,
    last: S,
    ticks_in_state: u32,
    handlers: StateHandlers<S, C>,
}

impl<S: StateTable<C>, C> StateMachine<S, C> {
    /// Start in `initial`. Its enter handler is not run.
    pub fn new(initial: S) -> Self {
        Self {
            current: initial,
            last: initial,
            ticks_in_state: 0,
            handlers: initial.handlers(),
        }
    }

    pub fn current(&self) -> S {
        self.current
    }

    pub fn last(&self) -> S {
        self.last
    }

    /// Updates run since the current state was entered.
    pub fn ticks_in_state(&self) -> u32 {
        self.ticks_in_state
    }

    /// Switch to `next`: exit the old state, then enter the new one.
    /// Switching to the current state is a no-op.
    pub fn transition(&mut self, next: S, ctx: &mut C) {
        if next == self.current {
            return;
        }
        self.last = self.current;
        self.ticks_in_state = 0;
        (self.handlers.exit)(ctx);
        self.current = next;
        self.handlers = next.handlers();
        (self.handlers.enter)(ctx);
    }

    /// Run the current state's update, applying any transition it requests.
    pub fn update(&mut self, ctx: &mut C) {
        self.ticks_in_state = self.ticks_in_state.saturating_add(1);
        if let Some(next) = (self.handlers.update)(ctx) {
            self.transition(next, ctx);
        }
    }

    /// Overwrite the current state without running any handler. Used when
    /// rewinding to a captured state.
    pub fn restore(&mut self, state: S) {
        self.current = state;
        self.last = state;
        self.ticks_in_state = 0;
        self.handlers = state.handlers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Light {
        Red,
        Green,
        Off,
    }

    #[derive(Default)]
    struct Log {
        calls: Vec<&'static str>,
        go: bool,
    }

    impl StateTable<Log> for Light {
        fn handlers(self) -> StateHandlers<Self, Log> {
            match self {
                Light::Red => StateHandlers {
                    enter: |l| l.calls.push("red.enter"),
                    update: |l| l.go.then_some(Light::Green),
                    exit: |l| l.calls.push("red.exit"),
                },
                Light::Green => StateHandlers {
                    enter: |l| l.calls.push("green.enter"),
                    update: |l| (!l.go).then_some(Light::Red),
                    exit: |l| l.calls.push("green.exit"),
                },
                Light::Off => StateHandlers::idle(),
            }
        }
    }

    #[test]
    fn test_new_does_not_enter() {
        let machine: StateMachine<Light, Log> = StateMachine::new(Light::Red);
        assert_eq!(machine.current(), Light::Red);
        assert_eq!(machine.last(), Light::Red);
    }

    #[test]
    fn test_transition_runs_exit_then_enter() {
        let mut log = Log::default();
        let mut machine = StateMachine::new(Light::Red);
        machine.update(&mut log);
        assert_eq!(machine.current(), Light::Red);
        assert_eq!(machine.ticks_in_state(), 1);

        log.go = true;
        machine.update(&mut log);
        assert_eq!(machine.current(), Light::Green);
        assert_eq!(machine.last(), Light::Red);
        assert_eq!(machine.ticks_in_state(), 0);
        assert_eq!(log.calls, vec!["red.exit", "green.enter"]);
    }

    #[test]
    fn test_same_state_is_noop() {
        let mut log = Log::default();
        let mut machine = StateMachine::new(Light::Green);
        machine.transition(Light::Green, &mut log);
        assert!(log.calls.is_empty());
    }

    #[test]
    fn test_restore_skips_handlers() {
        let mut log = Log::default();
        let mut machine = StateMachine::new(Light::Red);
        machine.restore(Light::Off);
        assert_eq!(machine.current(), Light::Off);
        machine.update(&mut log);
        assert!(log.calls.is_empty());
        assert_eq!(machine.current(), Light::Off);
    }
}
