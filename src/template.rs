//! Guest configuration document.
//!
//! A [`DomainDocument`] is the templated artifact submitted to the
//! hypervisor at `create`. The backend fills it from a [`crate::vm::GuestSpec`]
//! exactly once, at construction; `create` serializes it and `destroy`
//! deletes the backing file.
//!
//! [`DomainXml`] is the concrete libvirt-domain renderer. Tests substitute
//! a recording implementation to inspect applied fields.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Settable fields and render operations of a guest configuration document.
pub trait DomainDocument {
    /// Document instance name.
    fn name(&self) -> &str;

    /// Path the rendered document is written to.
    fn filepath(&self) -> &Path;

    /// Set memory in KiB (the document's base unit).
    fn set_memory_kib(&mut self, kib: u64);

    /// Set the identity token (UUID).
    fn set_uuid(&mut self, uuid: &str);

    /// Set the guest disk image path.
    fn set_image(&mut self, path: &Path);

    /// Set CPU topology counts.
    fn set_topology(&mut self, sockets: u32, cores: u32, threads: u32, vcpus: u32);

    /// Set the firmware loader binary.
    fn set_loader(&mut self, path: &Path);

    /// Set the NVRAM variable-store path.
    fn set_nvram(&mut self, path: &Path);

    /// Set kernel and command line for direct-kernel boot.
    fn set_kernel(&mut self, kernel: &Path, cmdline: &str);

    /// Clear kernel and command line (bootloader boot).
    fn clear_kernel(&mut self);

    /// Set the CPU feature string.
    fn set_cpu_features(&mut self, features: &str);

    /// Enable hugepage backing with the given page size in KiB.
    fn set_hugepages(&mut self, size_kib: u64);

    /// Add a vsock device with the given guest CID.
    fn set_vsock(&mut self, cid: u32);

    /// Forward a host port to guest SSH.
    fn set_ssh_forward_port(&mut self, port: u16);

    /// Render the document to its backing file.
    fn render_to_file(&self) -> Result<()>;

    /// Render the document to a string.
    fn render_to_string(&self) -> Result<String>;
}

/// Libvirt domain XML document.
#[derive(Debug, Clone)]
pub struct DomainXml {
    template: &'static str,
    name: String,
    filepath: PathBuf,
    memory_kib: u64,
    uuid: String,
    image: PathBuf,
    sockets: u32,
    cores: u32,
    threads: u32,
    vcpus: u32,
    loader: Option<PathBuf>,
    nvram: Option<PathBuf>,
    kernel: Option<PathBuf>,
    cmdline: Option<String>,
    cpu_features: String,
    hugepage_size_kib: Option<u64>,
    vsock_cid: Option<u32>,
    ssh_forward_port: Option<u16>,
}

impl DomainXml {
    /// Start a document from a named template, placing its backing file
    /// under `work_dir`.
    pub fn from_template(
        template: &'static str,
        name: impl Into<String>,
        work_dir: impl AsRef<Path>,
    ) -> Self {
        let name = name.into();
        let filepath = work_dir.as_ref().join(format!("{}.xml", name));
        Self {
            template,
            name,
            filepath,
            memory_kib: 0,
            uuid: String::new(),
            image: PathBuf::new(),
            sockets: 1,
            cores: 1,
            threads: 1,
            vcpus: 1,
            loader: None,
            nvram: None,
            kernel: None,
            cmdline: None,
            cpu_features: String::new(),
            hugepage_size_kib: None,
            vsock_cid: None,
            ssh_forward_port: None,
        }
    }

    /// Template this document was seeded from.
    pub fn template(&self) -> &'static str {
        self.template
    }
}

impl DomainDocument for DomainXml {
    fn name(&self) -> &str {
        &self.name
    }

    fn filepath(&self) -> &Path {
        &self.filepath
    }

    fn set_memory_kib(&mut self, kib: u64) {
        self.memory_kib = kib;
    }

    fn set_uuid(&mut self, uuid: &str) {
        self.uuid = uuid.to_string();
    }

    fn set_image(&mut self, path: &Path) {
        self.image = path.to_path_buf();
    }

    fn set_topology(&mut self, sockets: u32, cores: u32, threads: u32, vcpus: u32) {
        self.sockets = sockets;
        self.cores = cores;
        self.threads = threads;
        self.vcpus = vcpus;
    }

    fn set_loader(&mut self, path: &Path) {
        self.loader = Some(path.to_path_buf());
    }

    fn set_nvram(&mut self, path: &Path) {
        self.nvram = Some(path.to_path_buf());
    }

    fn set_kernel(&mut self, kernel: &Path, cmdline: &str) {
        self.kernel = Some(kernel.to_path_buf());
        self.cmdline = Some(cmdline.to_string());
    }

    fn clear_kernel(&mut self) {
        self.kernel = None;
        self.cmdline = None;
    }

    fn set_cpu_features(&mut self, features: &str) {
        self.cpu_features = features.to_string();
    }

    fn set_hugepages(&mut self, size_kib: u64) {
        self.hugepage_size_kib = Some(size_kib);
    }

    fn set_vsock(&mut self, cid: u32) {
        self.vsock_cid = Some(cid);
    }

    fn set_ssh_forward_port(&mut self, port: u16) {
        self.ssh_forward_port = Some(port);
    }

    fn render_to_file(&self) -> Result<()> {
        if let Some(parent) = self.filepath.parent() {
            fs::create_dir_all(parent)?;
        }
        let xml = self.render_to_string()?;
        fs::write(&self.filepath, xml)?;
        Ok(())
    }

    fn render_to_string(&self) -> Result<String> {
        if self.uuid.is_empty() {
            return Err(Error::document("uuid not set"));
        }
        if self.memory_kib == 0 {
            return Err(Error::document("memory not set"));
        }

        let mut xml = String::new();
        // The qemu namespace must be declared whenever a commandline
        // passthrough element is emitted.
        if self.ssh_forward_port.is_some() {
            xml.push_str(
                "<domain type='kvm' xmlns:qemu='http://libvirt.org/schemas/domain/qemu/1.0'>\n",
            );
        } else {
            xml.push_str("<domain type='kvm'>\n");
        }
        xml.push_str(&format!("  <name>{}</name>\n", self.name));
        xml.push_str(&format!("  <uuid>{}</uuid>\n", self.uuid));
        xml.push_str(&format!(
            "  <memory unit='KiB'>{}</memory>\n",
            self.memory_kib
        ));
        xml.push_str(&format!("  <vcpu>{}</vcpu>\n", self.vcpus));

        if let Some(size) = self.hugepage_size_kib {
            xml.push_str("  <memoryBacking>\n");
            xml.push_str(&format!(
                "    <hugepages><page size='{}' unit='KiB'/></hugepages>\n",
                size
            ));
            xml.push_str("  </memoryBacking>\n");
        }

        xml.push_str(&format!(
            "  <cpu mode='host-passthrough'>\n    <topology sockets='{}' cores='{}' threads='{}'/>\n",
            self.sockets, self.cores, self.threads
        ));
        if !self.cpu_features.is_empty() {
            xml.push_str(&format!(
                "    <features qemu='{}'/>\n",
                self.cpu_features
            ));
        }
        xml.push_str("  </cpu>\n");

        xml.push_str("  <os>\n    <type arch='x86_64'>hvm</type>\n");
        if let Some(loader) = &self.loader {
            xml.push_str(&format!("    <loader>{}</loader>\n", loader.display()));
        }
        if let Some(nvram) = &self.nvram {
            xml.push_str(&format!("    <nvram>{}</nvram>\n", nvram.display()));
        }
        if let Some(kernel) = &self.kernel {
            xml.push_str(&format!("    <kernel>{}</kernel>\n", kernel.display()));
        }
        if let Some(cmdline) = &self.cmdline {
            xml.push_str(&format!("    <cmdline>{}</cmdline>\n", cmdline));
        }
        xml.push_str("  </os>\n");

        xml.push_str("  <devices>\n");
        xml.push_str(&format!(
            "    <disk type='file' device='disk'><source file='{}'/><target dev='vda' bus='virtio'/></disk>\n",
            self.image.display()
        ));
        if let Some(cid) = self.vsock_cid {
            xml.push_str(&format!(
                "    <vsock model='virtio'><cid auto='no' address='{}'/></vsock>\n",
                cid
            ));
        }
        xml.push_str("    <interface type='bridge'><source bridge='virbr0'/><model type='virtio'/></interface>\n");
        xml.push_str("  </devices>\n");

        if let Some(port) = self.ssh_forward_port {
            xml.push_str(&format!(
                "  <qemu:commandline><qemu:arg value='hostfwd=tcp::{}-:22'/></qemu:commandline>\n",
                port
            ));
        }

        xml.push_str("</domain>\n");
        Ok(xml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(dir: &Path) -> DomainXml {
        let mut doc = DomainXml::from_template("legacy-base", "doc-test", dir);
        doc.set_uuid("11111111-2222-3333-4444-555555555555");
        doc.set_memory_kib(2 * 1024 * 1024);
        doc.set_image(Path::new("/var/lib/vmlab/doc-test.qcow2"));
        doc
    }

    #[test]
    fn test_render_includes_identity_and_memory() {
        let doc = sample(Path::new("/tmp"));
        let xml = doc.render_to_string().unwrap();
        assert!(xml.contains("<uuid>11111111-2222-3333-4444-555555555555</uuid>"));
        assert!(xml.contains("<memory unit='KiB'>2097152</memory>"));
        assert!(xml.contains("doc-test.qcow2"));
    }

    #[test]
    fn test_render_without_uuid_fails() {
        let doc = DomainXml::from_template("legacy-base", "bad", Path::new("/tmp"));
        assert!(doc.render_to_string().is_err());
    }

    #[test]
    fn test_clear_kernel_removes_boot_fields() {
        let mut doc = sample(Path::new("/tmp"));
        doc.set_kernel(Path::new("/boot/vmlinuz"), "console=hvc0");
        doc.clear_kernel();
        let xml = doc.render_to_string().unwrap();
        assert!(!xml.contains("<kernel>"));
        assert!(!xml.contains("<cmdline>"));
    }

    #[test]
    fn test_forward_port_declares_qemu_namespace() {
        let mut doc = sample(Path::new("/tmp"));
        doc.set_ssh_forward_port(10022);
        let xml = doc.render_to_string().unwrap();
        assert!(xml.starts_with(
            "<domain type='kvm' xmlns:qemu='http://libvirt.org/schemas/domain/qemu/1.0'>"
        ));
        assert!(xml.contains("<qemu:commandline>"));
    }

    #[test]
    fn test_no_forward_port_omits_qemu_namespace() {
        let doc = sample(Path::new("/tmp"));
        let xml = doc.render_to_string().unwrap();
        assert!(xml.starts_with("<domain type='kvm'>\n"));
        assert!(!xml.contains("xmlns:qemu"));
    }

    #[test]
    fn test_render_to_file_writes_under_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let doc = sample(dir.path());
        doc.render_to_file().unwrap();
        assert!(doc.filepath().exists());
        assert_eq!(doc.filepath(), dir.path().join("doc-test.xml"));
    }
}
