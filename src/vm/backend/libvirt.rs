//! Libvirt-protocol backend.
//!
//! One [`LibvirtManager`] owns one guest: it connects at construction,
//! renders the domain document from the guest spec, and drives lifecycle
//! transitions through short-lived domain handles re-resolved per call.

use crate::agent::GuestAgent;
use crate::error::{Error, Result};
use crate::host::{HostProbe, TSC_PIN_FREQ_HZ, TSC_PIN_THRESHOLD_KHZ};
use crate::hypervisor::{Connector, DomainHandle, Hypervisor, PowerState, DEFAULT_URI};
use crate::net::{mac_from_xml_desc, resolve_ip_by_mac, Sleeper, ThreadSleeper};
use crate::runner::{CommandRunner, NativeRunner};
use crate::template::{DomainDocument, DomainXml};
use crate::vm::cleanup::CleanupReport;
use crate::vm::params;
use crate::vm::spec::{BootMode, GuestSpec, VmFlavor};
use crate::vm::state::VmState;
use crate::vm::VmManager;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

/// Filesystem locations used by the backend.
#[derive(Debug, Clone)]
pub struct BackendPaths {
    /// Directory for rendered documents and per-VM NVRAM copies.
    pub work_dir: PathBuf,
    /// Canonical OVMF variable-store template, copied per VM.
    pub nvram_template: PathBuf,
}

impl Default for BackendPaths {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/var/lib/vmlab"),
            nvram_template: PathBuf::from(params::BIOS_OVMF_VARS),
        }
    }
}

/// Libvirt-protocol implementation of [`VmManager`].
pub struct LibvirtManager {
    spec: GuestSpec,
    conn: Option<Box<dyn Hypervisor>>,
    document: DomainXml,
    nvram_path: Option<PathBuf>,
    ip: Option<Ipv4Addr>,
    runner: Box<dyn CommandRunner>,
    sleeper: Box<dyn Sleeper>,
}

impl std::fmt::Debug for LibvirtManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibvirtManager")
            .field("spec", &self.spec)
            .field("nvram_path", &self.nvram_path)
            .field("ip", &self.ip)
            .finish_non_exhaustive()
    }
}

impl LibvirtManager {
    /// Connect to the system hypervisor and prepare the guest's domain
    /// document.
    ///
    /// Connection failure aborts construction; the error carries the
    /// likely remediation (socket permission).
    pub fn new(
        spec: GuestSpec,
        connector: &dyn Connector,
        host: &dyn HostProbe,
        paths: &BackendPaths,
    ) -> Result<Self> {
        Self::with_collaborators(
            spec,
            connector,
            host,
            paths,
            Box::new(NativeRunner::new()),
            Box::new(ThreadSleeper),
        )
    }

    /// Like [`Self::new`], with injected command runner and sleeper.
    pub fn with_collaborators(
        spec: GuestSpec,
        connector: &dyn Connector,
        host: &dyn HostProbe,
        paths: &BackendPaths,
        runner: Box<dyn CommandRunner>,
        sleeper: Box<dyn Sleeper>,
    ) -> Result<Self> {
        tracing::debug!(name = %spec.name, flavor = %spec.flavor, "connecting to hypervisor");
        let conn = connector.open(DEFAULT_URI).map_err(|e| {
            tracing::error!(error = %e, "hypervisor connection failed");
            e
        })?;

        let (document, nvram_path) = Self::prepare_document(&spec, host, paths)?;

        Ok(Self {
            spec,
            conn: Some(conn),
            document,
            nvram_path,
            ip: None,
            runner,
            sleeper,
        })
    }

    /// Render the guest spec into a domain document.
    ///
    /// Field order follows the template contract: memory, identity, image,
    /// topology, optional hugepages, optional vsock, flavor firmware/CPU
    /// settings, boot fields, SSH forward port.
    fn prepare_document(
        spec: &GuestSpec,
        host: &dyn HostProbe,
        paths: &BackendPaths,
    ) -> Result<(DomainXml, Option<PathBuf>)> {
        let mut doc = DomainXml::from_template(
            params::template(spec.flavor),
            spec.name.clone(),
            &paths.work_dir,
        );

        doc.set_memory_kib(spec.memory_mib * 1024);
        doc.set_uuid(spec.vmid.as_str());
        doc.set_image(&spec.image);
        doc.set_topology(
            spec.cpu.sockets,
            spec.cpu.cores,
            spec.cpu.threads,
            spec.cpu.vcpus,
        );

        if let Some(size) = spec.hugepage_size_kib {
            doc.set_hugepages(size);
        }
        if let Some(cid) = spec.vsock_cid {
            doc.set_vsock(cid);
        }

        let nvram_path = if params::needs_nvram(spec.flavor) {
            Some(Self::copy_nvram(spec, paths)?)
        } else {
            None
        };

        doc.set_loader(params::loader(spec.flavor));
        if let Some(nvram) = &nvram_path {
            doc.set_nvram(nvram);
        }

        match spec.flavor {
            VmFlavor::Legacy | VmFlavor::Uefi => {
                doc.set_cpu_features(params::CPU_BASELINE);
            }
            VmFlavor::Sgx => {
                doc.set_cpu_features(params::CPU_SGX);
            }
            VmFlavor::Td => {
                // Slow hosts need the guest TSC pinned or TD timekeeping drifts.
                if host.cpu_base_freq_khz()? < TSC_PIN_THRESHOLD_KHZ {
                    doc.set_cpu_features(&format!(
                        "{},tsc-freq={}",
                        params::CPU_BASELINE,
                        TSC_PIN_FREQ_HZ
                    ));
                } else {
                    doc.set_cpu_features(params::CPU_BASELINE);
                }
            }
        }

        match spec.boot {
            BootMode::Bootloader => doc.clear_kernel(),
            BootMode::DirectKernel => {
                let kernel = spec.kernel.as_deref().ok_or_else(|| {
                    Error::document("direct-kernel boot requires a kernel path")
                })?;
                doc.set_kernel(kernel, spec.cmdline.as_deref().unwrap_or_default());
            }
        }

        doc.set_ssh_forward_port(spec.ssh_forward_port);
        Ok((doc, nvram_path))
    }

    /// Copy the canonical variable-store template to a per-VM file named by
    /// identity, so concurrent guests never share mutable firmware state.
    fn copy_nvram(spec: &GuestSpec, paths: &BackendPaths) -> Result<PathBuf> {
        if !paths.nvram_template.exists() {
            return Err(Error::NvramTemplateNotFound {
                path: paths.nvram_template.clone(),
            });
        }
        fs::create_dir_all(&paths.work_dir)?;
        let copy = paths
            .work_dir
            .join(format!("OVMF_VARS.{}.fd", spec.vmid));
        fs::copy(&paths.nvram_template, &copy)?;
        Ok(copy)
    }

    fn conn(&self) -> Result<&dyn Hypervisor> {
        self.conn
            .as_deref()
            .ok_or_else(|| Error::hypervisor("connection", "connection already closed"))
    }

    /// Resolve a fresh domain handle by identity token.
    ///
    /// Handles are never cached; the protocol does not guarantee their
    /// stability across calls.
    fn domain(&self) -> Result<Box<dyn DomainHandle>> {
        self.conn()?.lookup(self.spec.vmid.as_str())
    }

    /// The guest spec this backend was built from.
    pub fn spec(&self) -> &GuestSpec {
        &self.spec
    }

    /// The prepared domain document.
    pub fn document(&self) -> &dyn DomainDocument {
        &self.document
    }

    /// Path of the per-VM NVRAM copy, when the flavor requires one.
    pub fn nvram_path(&self) -> Option<&Path> {
        self.nvram_path.as_deref()
    }

    /// Shut the guest down through the guest agent.
    pub fn agent_shutdown(&self) -> Result<()> {
        let dom = self.domain()?;
        GuestAgent::new(dom.as_ref()).shutdown()
    }

    /// Reboot the guest through the guest agent.
    pub fn agent_reboot(&self) -> Result<()> {
        let dom = self.domain()?;
        GuestAgent::new(dom.as_ref()).reboot()
    }

    /// Write a base64-encoded buffer to a file inside the guest.
    pub fn agent_file_write(&self, path: &str, buf_b64: &str) -> Result<()> {
        let dom = self.domain()?;
        GuestAgent::new(dom.as_ref()).file_write_b64(path, buf_b64)
    }

    /// Read a file inside the guest, returning its base64-encoded content.
    pub fn agent_file_read(&self, path: &str) -> Result<String> {
        let dom = self.domain()?;
        GuestAgent::new(dom.as_ref()).file_read_b64(path)
    }

    fn power_state(&self) -> Result<PowerState> {
        self.domain()?.power_state()
    }
}

impl VmManager for LibvirtManager {
    fn create(&self, stop_at_beginning: bool) -> Result<()> {
        if stop_at_beginning {
            // Not wired to a no-autorun flag on the define path; see DESIGN.md.
            tracing::debug!(name = %self.spec.name, "stop_at_beginning requested");
        }
        self.document.render_to_file()?;
        let xml = self.document.render_to_string()?;
        let dom = self.conn()?.define(&xml)?;
        dom.power_on()
    }

    fn destroy(&mut self) -> CleanupReport {
        let mut report = CleanupReport::new();

        match self.domain().and_then(|dom| {
            dom.power_off()?;
            dom.undefine_with_nvram()
        }) {
            Ok(()) => report.succeeded(),
            Err(e) => {
                tracing::warn!(name = %self.spec.name, error = %e, "failed to delete domain");
                report.failed(format!("domain teardown: {}", e));
            }
        }

        let config = self.document.filepath();
        if config.exists() {
            match fs::remove_file(config) {
                Ok(()) => report.succeeded(),
                Err(e) => {
                    tracing::warn!(path = %config.display(), error = %e, "failed to delete domain document");
                    report.failed(format!("document removal: {}", e));
                }
            }
        } else {
            report.succeeded();
        }

        if let Some(nvram) = &self.nvram_path {
            if nvram.exists() {
                match fs::remove_file(nvram) {
                    Ok(()) => report.succeeded(),
                    Err(e) => {
                        tracing::warn!(path = %nvram.display(), error = %e, "failed to delete nvram copy");
                        report.failed(format!("nvram removal: {}", e));
                    }
                }
            } else {
                report.succeeded();
            }
        }

        self.ip = None;
        report
    }

    fn start(&self) -> Result<()> {
        if self.is_shutoff()? {
            self.domain()?.power_on()
        } else {
            self.resume()
        }
    }

    fn suspend(&self) -> Result<()> {
        let dom = self.domain()?;
        if self.is_running()? {
            dom.pause()
        } else {
            Ok(())
        }
    }

    fn resume(&self) -> Result<()> {
        let dom = self.domain()?;
        if !self.is_running()? {
            dom.unpause()
        } else {
            Ok(())
        }
    }

    fn reboot(&self) -> Result<()> {
        self.domain()?.reboot()
    }

    fn shutdown(&self) -> Result<()> {
        self.domain()?.shutdown()
    }

    fn state(&self) -> Result<VmState> {
        Ok(VmState::from_power_state(self.power_state()?))
    }

    fn is_running(&self) -> Result<bool> {
        Ok(self.power_state()? == PowerState::Running)
    }

    fn is_shutoff(&self) -> Result<bool> {
        Ok(self.power_state()? == PowerState::Shutoff)
    }

    fn get_ip(&mut self, force_refresh: bool) -> Result<Option<Ipv4Addr>> {
        if force_refresh {
            // The cache must reflect the latest full procedure, not an
            // address the refresh failed to confirm.
            self.ip = None;
        } else if let Some(ip) = self.ip {
            return Ok(Some(ip));
        }

        let desc = self.domain()?.xml_desc()?;
        let mac = match mac_from_xml_desc(&desc) {
            Some(mac) => mac,
            None => {
                tracing::warn!(name = %self.spec.name, "no MAC address in domain description");
                return Ok(None);
            }
        };

        let resolved = resolve_ip_by_mac(self.runner.as_ref(), self.sleeper.as_ref(), &mac)?;
        if let Some(ip) = resolved {
            self.ip = Some(ip);
        }
        Ok(resolved)
    }
}

impl Drop for LibvirtManager {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            tracing::debug!(name = %self.spec.name, "closing hypervisor connection");
            conn.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::spec::{CpuTopology, VmId};

    struct FixedFreqProbe(u64);

    impl HostProbe for FixedFreqProbe {
        fn cpu_base_freq_khz(&self) -> Result<u64> {
            Ok(self.0)
        }
    }

    fn test_paths(dir: &Path) -> BackendPaths {
        let nvram_template = dir.join("OVMF_VARS.fd");
        fs::write(&nvram_template, b"vars-template").unwrap();
        BackendPaths {
            work_dir: dir.join("work"),
            nvram_template,
        }
    }

    fn base_spec(flavor: VmFlavor) -> GuestSpec {
        GuestSpec::builder(flavor, "unit-guest")
            .vmid(VmId::new("unit-guest-1"))
            .memory(2048)
            .cpu(CpuTopology::new(1, 2, 1))
            .kernel("/boot/vmlinuz-guest")
            .cmdline("console=hvc0")
            .image("/var/lib/vmlab/unit-guest.qcow2")
            .build()
    }

    fn prepare(spec: &GuestSpec, freq_khz: u64, dir: &Path) -> (DomainXml, Option<PathBuf>) {
        LibvirtManager::prepare_document(spec, &FixedFreqProbe(freq_khz), &test_paths(dir))
            .unwrap()
    }

    #[test]
    fn test_direct_kernel_boot_sets_kernel_and_cmdline() {
        let dir = tempfile::tempdir().unwrap();
        for flavor in [VmFlavor::Legacy, VmFlavor::Uefi, VmFlavor::Td, VmFlavor::Sgx] {
            let (doc, _) = prepare(&base_spec(flavor), 2_000_000, dir.path());
            let xml = doc.render_to_string().unwrap();
            assert!(xml.contains("<kernel>/boot/vmlinuz-guest</kernel>"), "{}", flavor);
            assert!(xml.contains("<cmdline>console=hvc0</cmdline>"), "{}", flavor);
        }
    }

    #[test]
    fn test_bootloader_boot_clears_kernel_and_cmdline() {
        let dir = tempfile::tempdir().unwrap();
        for flavor in [VmFlavor::Legacy, VmFlavor::Uefi, VmFlavor::Td, VmFlavor::Sgx] {
            let mut spec = base_spec(flavor);
            spec.boot = BootMode::Bootloader;
            let (doc, _) = prepare(&spec, 2_000_000, dir.path());
            let xml = doc.render_to_string().unwrap();
            assert!(!xml.contains("<kernel>"), "{}", flavor);
            assert!(!xml.contains("<cmdline>"), "{}", flavor);
        }
    }

    #[test]
    fn test_direct_kernel_without_kernel_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = base_spec(VmFlavor::Legacy);
        spec.kernel = None;
        let err = LibvirtManager::prepare_document(
            &spec,
            &FixedFreqProbe(2_000_000),
            &test_paths(dir.path()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Document(_)));
    }

    #[test]
    fn test_td_pins_tsc_on_slow_host() {
        let dir = tempfile::tempdir().unwrap();
        let (doc, _) = prepare(&base_spec(VmFlavor::Td), 800_000, dir.path());
        let xml = doc.render_to_string().unwrap();
        assert!(xml.contains("tsc-freq=1000000000"));
    }

    #[test]
    fn test_td_no_tsc_pin_on_fast_host() {
        let dir = tempfile::tempdir().unwrap();
        let (doc, _) = prepare(&base_spec(VmFlavor::Td), 2_400_000, dir.path());
        let xml = doc.render_to_string().unwrap();
        assert!(!xml.contains("tsc-freq"));
    }

    #[test]
    fn test_sgx_gets_full_enclave_feature_set() {
        let dir = tempfile::tempdir().unwrap();
        let (doc, nvram) = prepare(&base_spec(VmFlavor::Sgx), 2_000_000, dir.path());
        let xml = doc.render_to_string().unwrap();
        assert!(xml.contains("+sgx1"));
        assert!(xml.contains("+sgxlc"));
        assert!(nvram.is_none(), "sgx uses legacy firmware, no nvram copy");
    }

    #[test]
    fn test_uefi_nvram_copy_is_named_by_identity() {
        let dir = tempfile::tempdir().unwrap();
        let (doc, nvram) = prepare(&base_spec(VmFlavor::Uefi), 2_000_000, dir.path());
        let nvram = nvram.unwrap();
        assert!(nvram.ends_with("OVMF_VARS.unit-guest-1.fd"));
        assert!(nvram.exists(), "copy must be materialized at construction");
        let xml = doc.render_to_string().unwrap();
        assert!(xml.contains("OVMF_VARS.unit-guest-1.fd"));
    }

    #[test]
    fn test_missing_nvram_template_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let paths = BackendPaths {
            work_dir: dir.path().join("work"),
            nvram_template: dir.path().join("missing.fd"),
        };
        let err =
            LibvirtManager::prepare_document(&base_spec(VmFlavor::Uefi), &FixedFreqProbe(2_000_000), &paths)
                .unwrap_err();
        assert!(matches!(err, Error::NvramTemplateNotFound { .. }));
    }

    #[test]
    fn test_hugepages_and_vsock_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let spec = GuestSpec::builder(VmFlavor::Legacy, "hp-guest")
            .vmid(VmId::new("hp-guest-1"))
            .kernel("/boot/vmlinuz")
            .image("/img.qcow2")
            .hugepages(2048)
            .vsock(33)
            .build();
        let (doc, _) = prepare(&spec, 2_000_000, dir.path());
        let xml = doc.render_to_string().unwrap();
        assert!(xml.contains("page size='2048'"));
        assert!(xml.contains("address='33'"));
    }

    #[test]
    fn test_ssh_forward_port_is_applied_last() {
        let dir = tempfile::tempdir().unwrap();
        let (doc, _) = prepare(&base_spec(VmFlavor::Legacy), 2_000_000, dir.path());
        let xml = doc.render_to_string().unwrap();
        assert!(xml.contains("hostfwd=tcp::10022-:22"));
    }
}
