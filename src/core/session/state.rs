//! Call session lifecycle states.

use std::fmt;

/// Lifecycle of one call.
///
/// ```text
/// Initiated -> Answered -> Streaming -> Draining -> Closed
///     |            |                       ^
///     +------------+---- stop / fault -----+
/// ```
///
/// Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum CallState {
    /// Registered, answer not yet issued
    #[default]
    Initiated,
    /// Answered and media stream requested; waiting for the media socket and
    /// for both resources to report ready
    Answered,
    /// Audio flows in both directions
    Streaming,
    /// Tearing down; resources are closing
    Draining,
    /// Both resources acknowledged closure
    Closed,
}

impl CallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Initiated => "initiated",
            CallState::Answered => "answered",
            CallState::Streaming => "streaming",
            CallState::Draining => "draining",
            CallState::Closed => "closed",
        }
    }

    /// Inbound audio is buffered rather than forwarded.
    #[inline]
    pub fn buffers_audio(&self) -> bool {
        matches!(self, CallState::Initiated | CallState::Answered)
    }

    /// Draining or closed.
    #[inline]
    pub fn is_terminating(&self) -> bool {
        matches!(self, CallState::Draining | CallState::Closed)
    }

    /// Whether moving to `next` is allowed.
    pub fn can_transition_to(&self, next: CallState) -> bool {
        match (self, next) {
            (CallState::Initiated, CallState::Answered)
            | (CallState::Answered, CallState::Streaming) => true,
            (current, CallState::Draining) => !current.is_terminating(),
            (CallState::Draining, CallState::Closed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(CallState::Initiated.can_transition_to(CallState::Answered));
        assert!(CallState::Answered.can_transition_to(CallState::Streaming));
        assert!(CallState::Streaming.can_transition_to(CallState::Draining));
        assert!(CallState::Draining.can_transition_to(CallState::Closed));
    }

    #[test]
    fn test_any_live_state_can_drain() {
        assert!(CallState::Initiated.can_transition_to(CallState::Draining));
        assert!(CallState::Answered.can_transition_to(CallState::Draining));
        assert!(!CallState::Draining.can_transition_to(CallState::Draining));
        assert!(!CallState::Closed.can_transition_to(CallState::Draining));
    }

    #[test]
    fn test_no_backward_or_skipping_transitions() {
        assert!(!CallState::Streaming.can_transition_to(CallState::Answered));
        assert!(!CallState::Initiated.can_transition_to(CallState::Streaming));
        assert!(!CallState::Streaming.can_transition_to(CallState::Closed));
        assert!(!CallState::Closed.can_transition_to(CallState::Initiated));
    }

    #[test]
    fn test_buffering_states() {
        assert!(CallState::Initiated.buffers_audio());
        assert!(CallState::Answered.buffers_audio());
        assert!(!CallState::Streaming.buffers_audio());
        assert_eq!(CallState::Draining.to_string(), "draining");
    }
}
