//! Guest specification types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Guest configuration profile.
///
/// Selects the configuration template, firmware and CPU feature set used
/// when rendering the domain document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmFlavor {
    /// Legacy BIOS boot.
    Legacy,
    /// UEFI boot via OVMF.
    Uefi,
    /// Trusted-execution (TDX-like) guest.
    Td,
    /// Enclave-enabled (SGX-like) guest.
    Sgx,
}

impl VmFlavor {
    /// Flavor name as used in logs and template selection.
    pub fn name(&self) -> &'static str {
        match self {
            VmFlavor::Legacy => "legacy",
            VmFlavor::Uefi => "efi",
            VmFlavor::Td => "td",
            VmFlavor::Sgx => "sgx",
        }
    }
}

impl std::fmt::Display for VmFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How the guest boots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BootMode {
    /// Direct kernel boot: kernel and cmdline come from the spec.
    #[default]
    DirectKernel,
    /// Bootloader (GRUB) boot: kernel and cmdline are cleared from the
    /// document and the guest's own bootloader takes over.
    Bootloader,
}

/// Unique identifier for a VM instance (identity token).
///
/// Also names per-VM artifacts on disk (the NVRAM copy and the rendered
/// document), so it is sanitized to path-safe characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VmId(String);

impl VmId {
    /// Create a new VmId from a string.
    ///
    /// Only alphanumeric characters and dashes are kept, capped at 64
    /// characters. An empty result falls back to a generated ID.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let sanitized: String = id
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '-')
            .take(64)
            .collect();
        if sanitized.is_empty() {
            Self::generate()
        } else {
            Self(sanitized)
        }
    }

    /// Generate a unique VmId based on timestamp.
    pub fn generate() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        Self(format!("vm-{:x}", ts))
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for VmId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// CPU topology of the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTopology {
    /// Socket count.
    pub sockets: u32,
    /// Cores per socket.
    pub cores: u32,
    /// Threads per core.
    pub threads: u32,
    /// Total vCPU count.
    pub vcpus: u32,
}

impl Default for CpuTopology {
    fn default() -> Self {
        Self {
            sockets: 1,
            cores: 1,
            threads: 1,
            vcpus: 1,
        }
    }
}

impl CpuTopology {
    /// Topology where vcpus = sockets * cores * threads.
    pub fn new(sockets: u32, cores: u32, threads: u32) -> Self {
        Self {
            sockets,
            cores,
            threads,
            vcpus: sockets * cores * threads,
        }
    }
}

/// Complete guest specification.
///
/// Externally supplied, immutable for the lifetime of one backend instance.
/// The backend renders it into a domain document exactly once, at
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestSpec {
    /// Configuration profile.
    pub flavor: VmFlavor,

    /// Guest name.
    pub name: String,

    /// Identity token; also names per-VM artifacts.
    pub vmid: VmId,

    /// Memory in MiB.
    pub memory_mib: u64,

    /// CPU topology.
    pub cpu: CpuTopology,

    /// Boot mode.
    pub boot: BootMode,

    /// Kernel image path (used in direct-kernel mode).
    pub kernel: Option<PathBuf>,

    /// Kernel command line (used in direct-kernel mode).
    pub cmdline: Option<String>,

    /// Guest disk image path.
    pub image: PathBuf,

    /// Hugepage size in KiB, when hugepage backing is requested.
    pub hugepage_size_kib: Option<u64>,

    /// vsock guest CID, when a para-virtual socket device is requested.
    pub vsock_cid: Option<u32>,

    /// Host port forwarded to guest SSH.
    pub ssh_forward_port: u16,
}

impl GuestSpec {
    /// Create a builder for a guest of the given flavor.
    pub fn builder(flavor: VmFlavor, name: impl Into<String>) -> GuestSpecBuilder {
        GuestSpecBuilder::new(flavor, name)
    }
}

/// Builder for [`GuestSpec`].
#[derive(Debug)]
pub struct GuestSpecBuilder {
    spec: GuestSpec,
}

impl GuestSpecBuilder {
    /// Create a new builder with defaults for the given flavor and name.
    pub fn new(flavor: VmFlavor, name: impl Into<String>) -> Self {
        Self {
            spec: GuestSpec {
                flavor,
                name: name.into(),
                vmid: VmId::generate(),
                memory_mib: 2048,
                cpu: CpuTopology::default(),
                boot: BootMode::default(),
                kernel: None,
                cmdline: None,
                image: PathBuf::new(),
                hugepage_size_kib: None,
                vsock_cid: None,
                ssh_forward_port: 10022,
            },
        }
    }

    /// Set the identity token.
    pub fn vmid(mut self, id: VmId) -> Self {
        self.spec.vmid = id;
        self
    }

    /// Set memory in MiB.
    pub fn memory(mut self, mib: u64) -> Self {
        self.spec.memory_mib = mib;
        self
    }

    /// Set the CPU topology.
    pub fn cpu(mut self, topology: CpuTopology) -> Self {
        self.spec.cpu = topology;
        self
    }

    /// Set the boot mode.
    pub fn boot(mut self, mode: BootMode) -> Self {
        self.spec.boot = mode;
        self
    }

    /// Set the kernel image path.
    pub fn kernel(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec.kernel = Some(path.into());
        self
    }

    /// Set the kernel command line.
    pub fn cmdline(mut self, cmdline: impl Into<String>) -> Self {
        self.spec.cmdline = Some(cmdline.into());
        self
    }

    /// Set the guest disk image path.
    pub fn image(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec.image = path.into();
        self
    }

    /// Request hugepage backing with the given page size in KiB.
    pub fn hugepages(mut self, size_kib: u64) -> Self {
        self.spec.hugepage_size_kib = Some(size_kib);
        self
    }

    /// Request a vsock device with the given guest CID.
    pub fn vsock(mut self, cid: u32) -> Self {
        self.spec.vsock_cid = Some(cid);
        self
    }

    /// Set the forwarded SSH port.
    pub fn ssh_forward_port(mut self, port: u16) -> Self {
        self.spec.ssh_forward_port = port;
        self
    }

    /// Build the GuestSpec.
    pub fn build(self) -> GuestSpec {
        self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_id_sanitization() {
        let id = VmId::new("7a1f4e02-9c1d-4b7e-8f3a-1234567890ab");
        assert_eq!(id.as_str(), "7a1f4e02-9c1d-4b7e-8f3a-1234567890ab");

        // Path separators and dots are stripped
        let id = VmId::new("../../../etc/passwd");
        assert_eq!(id.as_str(), "etcpasswd");

        // Empty after sanitization uses generated ID
        let id = VmId::new("///");
        assert!(id.as_str().starts_with("vm-"));
    }

    #[test]
    fn test_cpu_topology_vcpus_product() {
        let topo = CpuTopology::new(2, 4, 2);
        assert_eq!(topo.vcpus, 16);
    }

    #[test]
    fn test_guest_spec_builder() {
        let spec = GuestSpec::builder(VmFlavor::Td, "td-guest")
            .vmid(VmId::new("td-guest-1"))
            .memory(4096)
            .cpu(CpuTopology::new(1, 4, 1))
            .boot(BootMode::DirectKernel)
            .kernel("/boot/vmlinuz-guest")
            .cmdline("console=hvc0 root=/dev/vda1")
            .image("/var/lib/vmlab/td-guest.qcow2")
            .vsock(33)
            .ssh_forward_port(10122)
            .build();

        assert_eq!(spec.flavor, VmFlavor::Td);
        assert_eq!(spec.vmid.as_str(), "td-guest-1");
        assert_eq!(spec.memory_mib, 4096);
        assert_eq!(spec.cpu.vcpus, 4);
        assert_eq!(spec.kernel, Some(PathBuf::from("/boot/vmlinuz-guest")));
        assert_eq!(spec.vsock_cid, Some(33));
        assert_eq!(spec.ssh_forward_port, 10122);
    }
}
