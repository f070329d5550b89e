//! Guest-agent relay.
//!
//! All in-guest operations (shutdown, reboot, file read/write) funnel
//! through one primitive: a JSON command submitted to the agent channel of
//! a resolved domain, with a fixed timeout.

mod client;

pub use client::{GuestAgent, AGENT_TIMEOUT};
