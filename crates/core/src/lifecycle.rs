//! Connection lifecycle state machine (Functional Core).
//!
//! A binding moves `Idle -> Opening -> Ready | Error`, driven by explicit
//! events instead of a UI framework's mount/unmount hooks.

use serde::Serialize;

/// Phase of a storage binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    #[default]
    Idle,
    Opening,
    Ready,
    Error,
}

/// Something that happened to a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A (new) configuration was supplied.
    Configure,
    /// The pending open succeeded.
    Opened,
    /// The pending open failed.
    Failed,
    /// The binding was torn down.
    Teardown,
}

impl LifecyclePhase {
    /// Pure transition function.
    ///
    /// Open outcomes only count while `Opening`; late outcomes in any other
    /// phase leave it unchanged.
    pub fn apply(self, event: LifecycleEvent) -> LifecyclePhase {
        match (self, event) {
            (_, LifecycleEvent::Configure) => LifecyclePhase::Opening,
            (_, LifecycleEvent::Teardown) => LifecyclePhase::Idle,
            (LifecyclePhase::Opening, LifecycleEvent::Opened) => LifecyclePhase::Ready,
            (LifecyclePhase::Opening, LifecycleEvent::Failed) => LifecyclePhase::Error,
            (phase, _) => phase,
        }
    }

    pub fn is_ready(self) -> bool {
        self == LifecyclePhase::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let phase = LifecyclePhase::default()
            .apply(LifecycleEvent::Configure)
            .apply(LifecycleEvent::Opened);
        assert_eq!(phase, LifecyclePhase::Ready);
        assert!(phase.is_ready());
    }

    #[test]
    fn test_failed_open() {
        let phase = LifecyclePhase::Opening.apply(LifecycleEvent::Failed);
        assert_eq!(phase, LifecyclePhase::Error);
        assert!(!phase.is_ready());
    }

    #[test]
    fn test_reconfigure_from_any_phase() {
        for phase in [
            LifecyclePhase::Idle,
            LifecyclePhase::Opening,
            LifecyclePhase::Ready,
            LifecyclePhase::Error,
        ] {
            assert_eq!(
                phase.apply(LifecycleEvent::Configure),
                LifecyclePhase::Opening
            );
        }
    }

    #[test]
    fn test_late_outcome_after_teardown_is_ignored() {
        let phase = LifecyclePhase::Opening
            .apply(LifecycleEvent::Teardown)
            .apply(LifecycleEvent::Opened);
        assert_eq!(phase, LifecyclePhase::Idle);
    }

    #[test]
    fn test_ready_ignores_failure() {
        assert_eq!(
            LifecyclePhase::Ready.apply(LifecycleEvent::Failed),
            LifecyclePhase::Ready
        );
    }
}
