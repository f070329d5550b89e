//! Hypervisor management protocol.
//!
//! This module defines the narrow interface the backend drives against a
//! libvirt-style control connection: define/lookup domains, issue power
//! transitions, read live state and XML description, and relay guest-agent
//! commands. Production deployments bind these traits to the real libvirt
//! socket; tests bind them to in-memory fakes.

use crate::error::Result;
use std::time::Duration;

/// Default connection URI for the system hypervisor.
pub const DEFAULT_URI: &str = "qemu:///system";

/// Raw power state as reported by the hypervisor.
///
/// This mirrors the full set of states the protocol can report. The backend
/// maps these onto [`crate::vm::VmState`]; values without a mapping become
/// `Unknown` rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// No state reported.
    NoState,
    /// Domain is running.
    Running,
    /// Domain is blocked on a resource.
    Blocked,
    /// Domain is paused by the user.
    Paused,
    /// Domain is being shut down.
    Shutdown,
    /// Domain is shut off.
    Shutoff,
    /// Domain has crashed.
    Crashed,
    /// Domain is suspended by guest power management.
    PmSuspended,
}

/// Handle to a hypervisor-side domain object.
///
/// Handles are short-lived: the backend re-resolves one for every lifecycle
/// call (lookup by identity token) instead of caching, because the protocol
/// does not guarantee handle stability across calls.
pub trait DomainHandle {
    /// Power the domain on.
    fn power_on(&self) -> Result<()>;

    /// Hard power-off (no guest cooperation).
    fn power_off(&self) -> Result<()>;

    /// Deregister the domain, discarding any attached NVRAM file so the
    /// firmware copy does not block deregistration.
    fn undefine_with_nvram(&self) -> Result<()>;

    /// Pause the domain.
    fn pause(&self) -> Result<()>;

    /// Unpause a paused domain.
    fn unpause(&self) -> Result<()>;

    /// Request a guest-cooperative reboot.
    fn reboot(&self) -> Result<()>;

    /// Request a guest-cooperative shutdown.
    fn shutdown(&self) -> Result<()>;

    /// Live power state.
    fn power_state(&self) -> Result<PowerState>;

    /// Live XML description of the domain, including device/MAC info.
    fn xml_desc(&self) -> Result<String>;

    /// Submit a JSON command to the guest agent and return the JSON response.
    fn agent_command(&self, json: &str, timeout: Duration) -> Result<String>;
}

/// Opens management connections.
///
/// Split from [`Hypervisor`] so backend construction owns the
/// connect-or-abort decision while the transport stays swappable.
pub trait Connector {
    /// Establish a connection to the endpoint at `uri`.
    fn open(&self, uri: &str) -> Result<Box<dyn Hypervisor>>;
}

/// An established connection to the hypervisor management endpoint.
pub trait Hypervisor {
    /// Register a domain from its rendered configuration document.
    fn define(&self, xml: &str) -> Result<Box<dyn DomainHandle>>;

    /// Resolve a domain handle by identity token (UUID string).
    fn lookup(&self, uuid: &str) -> Result<Box<dyn DomainHandle>>;

    /// Release the connection. Idempotent; a second close is a no-op.
    fn close(&mut self);
}
