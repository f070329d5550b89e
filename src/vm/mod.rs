//! VM lifecycle management.
//!
//! This module provides the core abstractions for managing hardware-feature
//! test guests:
//! - [`GuestSpec`]: the immutable guest specification
//! - [`VmManager`]: the contract any virtualization backend must satisfy
//! - [`backend::LibvirtManager`]: the libvirt-protocol backend

pub mod backend;
pub mod cleanup;
pub mod params;
pub mod spec;
pub mod state;

use crate::error::{Error, Result};
use std::net::Ipv4Addr;
use std::path::Path;

pub use cleanup::{CleanupReport, CleanupStatus};
pub use spec::{BootMode, CpuTopology, GuestSpec, GuestSpecBuilder, VmFlavor, VmId};
pub use state::VmState;

/// Contract for a virtualization backend managing one guest.
///
/// The hypervisor is the source of truth for state; implementations derive
/// every answer live rather than caching. The four `update_*` operations
/// are placeholders for a future live-reconfiguration feature: their
/// default bodies fail with a typed [`Error::Unsupported`] so a caller
/// reaching for them gets a loud, immediate signal instead of a silent
/// no-op.
pub trait VmManager {
    /// Register the guest with the hypervisor and power it on.
    ///
    /// `stop_at_beginning` requests that the guest stay paused until an
    /// explicit `start`; the current registration path does not wire it to
    /// a no-autorun flag (see DESIGN.md), so it is accepted and logged.
    fn create(&self, stop_at_beginning: bool) -> Result<()>;

    /// Power off and deregister the guest, best-effort.
    ///
    /// Cleanup never fails; individual step failures are collected into
    /// the report as warnings. Safe to call repeatedly.
    fn destroy(&mut self) -> CleanupReport;

    /// Power the guest on if shut off; otherwise resume it.
    fn start(&self) -> Result<()>;

    /// Pause the guest if it is running; no-op otherwise.
    fn suspend(&self) -> Result<()>;

    /// Unpause the guest if it is not running; no-op otherwise.
    fn resume(&self) -> Result<()>;

    /// Request a guest-cooperative reboot. No local guard.
    fn reboot(&self) -> Result<()>;

    /// Request a guest-cooperative shutdown. No local guard.
    fn shutdown(&self) -> Result<()>;

    /// Live lifecycle state.
    fn state(&self) -> Result<VmState>;

    /// Whether the guest is currently running.
    fn is_running(&self) -> Result<bool>;

    /// Whether the guest is currently shut off.
    fn is_shutoff(&self) -> Result<bool>;

    /// Resolve the guest's bridged-network IP by MAC correlation.
    ///
    /// The result is cached per instance; `force_refresh` repeats the full
    /// discovery and overwrites the cache. `Ok(None)` means the address
    /// could not be resolved within the retry budget.
    fn get_ip(&mut self, force_refresh: bool) -> Result<Option<Ipv4Addr>>;

    /// Update the kernel command line of a defined guest.
    fn update_kernel_cmdline(&mut self, _cmdline: &str) -> Result<()> {
        Err(Error::Unsupported("update_kernel_cmdline"))
    }

    /// Update the kernel image of a defined guest.
    fn update_kernel(&mut self, _kernel: &Path) -> Result<()> {
        Err(Error::Unsupported("update_kernel"))
    }

    /// Update the CPU topology of a defined guest.
    fn update_cpu_topology(&mut self, _topology: CpuTopology) -> Result<()> {
        Err(Error::Unsupported("update_cpu_topology"))
    }

    /// Update the memory size of a defined guest.
    fn update_memsize(&mut self, _memory_mib: u64) -> Result<()> {
        Err(Error::Unsupported("update_memsize"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubManager;

    impl VmManager for StubManager {
        fn create(&self, _stop_at_beginning: bool) -> Result<()> {
            Ok(())
        }
        fn destroy(&mut self) -> CleanupReport {
            CleanupReport::new()
        }
        fn start(&self) -> Result<()> {
            Ok(())
        }
        fn suspend(&self) -> Result<()> {
            Ok(())
        }
        fn resume(&self) -> Result<()> {
            Ok(())
        }
        fn reboot(&self) -> Result<()> {
            Ok(())
        }
        fn shutdown(&self) -> Result<()> {
            Ok(())
        }
        fn state(&self) -> Result<VmState> {
            Ok(VmState::Unknown)
        }
        fn is_running(&self) -> Result<bool> {
            Ok(false)
        }
        fn is_shutoff(&self) -> Result<bool> {
            Ok(true)
        }
        fn get_ip(&mut self, _force_refresh: bool) -> Result<Option<Ipv4Addr>> {
            Ok(None)
        }
    }

    #[test]
    fn test_update_operations_fail_loudly_by_default() {
        let mut mgr = StubManager;
        assert!(matches!(
            mgr.update_kernel(Path::new("/boot/vmlinuz")),
            Err(Error::Unsupported("update_kernel"))
        ));
        assert!(matches!(
            mgr.update_kernel_cmdline("quiet"),
            Err(Error::Unsupported("update_kernel_cmdline"))
        ));
        assert!(matches!(
            mgr.update_cpu_topology(CpuTopology::default()),
            Err(Error::Unsupported("update_cpu_topology"))
        ));
        assert!(matches!(
            mgr.update_memsize(4096),
            Err(Error::Unsupported("update_memsize"))
        ));
    }
}
