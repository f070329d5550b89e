//! vmlab: VM lifecycle management for hardware-feature guest testing.
//!
//! This crate manages the lifecycle of test guests across four hardware
//! profiles (legacy BIOS, UEFI, TDX-like trusted execution, SGX-like
//! enclaves): it renders a guest specification into a hypervisor domain
//! document, drives create/destroy/start/stop/suspend/resume transitions,
//! resolves a bridged guest's IP from its MAC via the host neighbor table,
//! and relays in-guest shutdown/reboot/file operations through the guest
//! agent.
//!
//! Everything is synchronous and blocking; one [`vm::backend::LibvirtManager`]
//! owns one guest and is independent of any other instance.
//!
//! # Example
//!
//! ```no_run
//! use vmlab::vm::{GuestSpec, VmFlavor, VmManager};
//! use vmlab::vm::backend::{BackendPaths, LibvirtManager};
//! # fn connector() -> Box<dyn vmlab::hypervisor::Connector> { unimplemented!() }
//! # fn probe() -> Box<dyn vmlab::host::HostProbe> { unimplemented!() }
//!
//! # fn main() -> vmlab::error::Result<()> {
//! let spec = GuestSpec::builder(VmFlavor::Uefi, "efi-guest")
//!     .memory(4096)
//!     .kernel("/boot/vmlinuz-guest")
//!     .cmdline("console=hvc0 root=/dev/vda1")
//!     .image("/var/lib/vmlab/efi-guest.qcow2")
//!     .build();
//!
//! let mut vm = LibvirtManager::new(
//!     spec,
//!     connector().as_ref(),
//!     probe().as_ref(),
//!     &BackendPaths::default(),
//! )?;
//! vm.create(false)?;
//! let ip = vm.get_ip(false)?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod error;
pub mod host;
pub mod hypervisor;
pub mod net;
pub mod runner;
pub mod template;
pub mod vm;

pub use error::{Error, Result};
pub use vm::{GuestSpec, VmFlavor, VmManager, VmState};
