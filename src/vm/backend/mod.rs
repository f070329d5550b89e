//! VM backend implementations.
//!
//! One backend exists today: [`LibvirtManager`], which drives a
//! libvirt-protocol management connection.

mod libvirt;

pub use libvirt::{BackendPaths, LibvirtManager};
