//! Static flavor parameter tables.
//!
//! Maps each guest flavor to its configuration template, firmware binaries
//! and CPU feature string. These are lookup tables, not mutable state.

use crate::vm::spec::VmFlavor;
use std::path::Path;

/// Legacy BIOS firmware binary.
pub const BIOS_BINARY_LEGACY: &str = "/usr/share/qemu/bios.bin";

/// OVMF firmware code for UEFI boot.
pub const BIOS_OVMF_CODE: &str = "/usr/share/qemu/OVMF_CODE.fd";

/// OVMF variable-store template; copied per VM, never written in place.
pub const BIOS_OVMF_VARS: &str = "/usr/share/qemu/OVMF_VARS.fd";

/// Baseline CPU feature string for non-enclave guests.
pub const CPU_BASELINE: &str = "host,-kvm-steal-time,pmu=off";

/// Full enclave feature flag set for SGX guests.
pub const CPU_SGX: &str = "host,host-phys-bits,+sgx,+sgx-debug,+sgx-exinfo,\
+sgx-kss,+sgx-mode64,+sgx-provisionkey,+sgx-tokenkey,+sgx1,+sgx2,+sgxlc";

/// Configuration template name for a flavor.
pub fn template(flavor: VmFlavor) -> &'static str {
    match flavor {
        VmFlavor::Legacy => "legacy-base",
        VmFlavor::Uefi => "ovmf-base",
        VmFlavor::Td => "tdx-base",
        VmFlavor::Sgx => "sgx-base",
    }
}

/// Firmware loader binary for a flavor.
pub fn loader(flavor: VmFlavor) -> &'static Path {
    match flavor {
        VmFlavor::Legacy | VmFlavor::Sgx => Path::new(BIOS_BINARY_LEGACY),
        VmFlavor::Uefi | VmFlavor::Td => Path::new(BIOS_OVMF_CODE),
    }
}

/// Whether a flavor needs a private NVRAM variable-store copy.
pub fn needs_nvram(flavor: VmFlavor) -> bool {
    matches!(flavor, VmFlavor::Uefi | VmFlavor::Td)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_names() {
        assert_eq!(template(VmFlavor::Legacy), "legacy-base");
        assert_eq!(template(VmFlavor::Uefi), "ovmf-base");
        assert_eq!(template(VmFlavor::Td), "tdx-base");
        assert_eq!(template(VmFlavor::Sgx), "sgx-base");
    }

    #[test]
    fn test_nvram_only_for_ovmf_flavors() {
        assert!(!needs_nvram(VmFlavor::Legacy));
        assert!(needs_nvram(VmFlavor::Uefi));
        assert!(needs_nvram(VmFlavor::Td));
        assert!(!needs_nvram(VmFlavor::Sgx));
    }

    #[test]
    fn test_sgx_feature_set_is_complete() {
        for flag in ["+sgx1", "+sgx2", "+sgxlc", "+sgx-provisionkey"] {
            assert!(CPU_SGX.contains(flag), "missing {}", flag);
        }
    }
}
