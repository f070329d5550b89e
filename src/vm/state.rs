//! VM lifecycle state types.

use crate::hypervisor::PowerState;
use serde::{Deserialize, Serialize};

/// VM lifecycle states.
///
/// Always derived live from the hypervisor, never stored locally. Power
/// states with no mapping (crashed, blocked, pm-suspended, no-state) come
/// back as [`VmState::Unknown`] rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmState {
    /// Guest is running.
    Running,
    /// Guest is paused.
    Paused,
    /// Guest shutdown is in progress.
    ShutdownInProgress,
    /// Guest is shut off.
    Shutdown,
    /// Hypervisor reported a state this enum does not model.
    Unknown,
}

impl VmState {
    /// Map a raw hypervisor power state onto the lifecycle enum.
    pub fn from_power_state(state: PowerState) -> Self {
        match state {
            PowerState::Running => VmState::Running,
            PowerState::Paused => VmState::Paused,
            PowerState::Shutdown => VmState::ShutdownInProgress,
            PowerState::Shutoff => VmState::Shutdown,
            _ => VmState::Unknown,
        }
    }

    /// Get the state name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            VmState::Running => "running",
            VmState::Paused => "paused",
            VmState::ShutdownInProgress => "shutdown_in_progress",
            VmState::Shutdown => "shutdown",
            VmState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for VmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_state_mapping() {
        let cases = [
            (PowerState::Running, VmState::Running),
            (PowerState::Paused, VmState::Paused),
            (PowerState::Shutdown, VmState::ShutdownInProgress),
            (PowerState::Shutoff, VmState::Shutdown),
        ];
        for (power, expected) in cases {
            assert_eq!(VmState::from_power_state(power), expected);
        }
    }

    #[test]
    fn test_unmapped_power_states_are_unknown() {
        for power in [
            PowerState::NoState,
            PowerState::Blocked,
            PowerState::Crashed,
            PowerState::PmSuspended,
        ] {
            assert_eq!(VmState::from_power_state(power), VmState::Unknown);
        }
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&VmState::ShutdownInProgress).unwrap();
        assert_eq!(json, "\"shutdown_in_progress\"");
    }
}
