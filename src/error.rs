//! Error types for vmlab.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using vmlab's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vmlab operations.
#[derive(Error, Debug)]
pub enum Error {
    // Connection errors
    /// Failed to connect to the hypervisor management endpoint.
    ///
    /// This is fatal at backend construction; there is no retry.
    #[error("failed to connect to hypervisor at {uri}: {message} (is the current user in the libvirt group?)")]
    Connect {
        /// Connection URI.
        uri: String,
        /// Underlying error message.
        message: String,
    },

    // VM lifecycle errors
    /// Domain not found on the hypervisor.
    #[error("domain not found: {0}")]
    DomainNotFound(String),

    /// A hypervisor-side operation failed.
    #[error("hypervisor operation '{op}' failed: {message}")]
    Hypervisor {
        /// The operation that failed.
        op: String,
        /// Error message from the hypervisor.
        message: String,
    },

    /// Operation is declared on the manager contract but not supported
    /// by this backend.
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    // Configuration document errors
    /// Failed to render or persist the domain configuration document.
    #[error("document error: {0}")]
    Document(String),

    /// Firmware variable-store template missing.
    #[error("nvram template not found: {}", path.display())]
    NvramTemplateNotFound {
        /// Path that was not found.
        path: PathBuf,
    },

    // Command execution errors
    /// External command failed.
    #[error("command failed: {command}: {message}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// Error message.
        message: String,
    },

    // Guest agent errors
    /// Guest-agent channel error (transport-level).
    #[error("agent error: {0}")]
    Agent(String),

    /// Guest-agent response violated the protocol contract.
    #[error("agent protocol violation in '{command}': {message}")]
    AgentProtocol {
        /// The agent command whose response was malformed.
        command: String,
        /// What was wrong with the response.
        message: String,
    },

    // Host probe errors
    /// Failed to probe a host capability.
    #[error("host probe failed: {0}")]
    HostProbe(String),

    // IO errors
    /// IO error wrapper.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a connection error with a URI and message.
    pub fn connect(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Create a hypervisor operation error.
    pub fn hypervisor(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hypervisor {
            op: op.into(),
            message: message.into(),
        }
    }

    /// Create a document error with a message.
    pub fn document(msg: impl Into<String>) -> Self {
        Self::Document(msg.into())
    }

    /// Create a command failed error.
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create an agent transport error.
    pub fn agent(msg: impl Into<String>) -> Self {
        Self::Agent(msg.into())
    }

    /// Create an agent protocol violation error.
    pub fn agent_protocol(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AgentProtocol {
            command: command.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Error messages should include context that helps users fix the problem.

    #[test]
    fn test_connect_includes_remediation_hint() {
        let err = Error::connect("qemu:///system", "permission denied");
        let msg = err.to_string();
        assert!(msg.contains("qemu:///system"), "Error should include URI");
        assert!(
            msg.contains("libvirt group"),
            "Error should hint at group membership"
        );
    }

    #[test]
    fn test_domain_not_found_includes_id() {
        let err = Error::DomainNotFound("f4f8b1c2".to_string());
        assert!(err.to_string().contains("f4f8b1c2"));
    }

    #[test]
    fn test_nvram_template_not_found_includes_path() {
        let err = Error::NvramTemplateNotFound {
            path: PathBuf::from("/usr/share/OVMF/OVMF_VARS.fd"),
        };
        assert!(err.to_string().contains("/usr/share/OVMF/OVMF_VARS.fd"));
    }

    #[test]
    fn test_command_failed_includes_command_and_message() {
        let err = Error::command_failed("arp", "not found in PATH");
        let msg = err.to_string();
        assert!(msg.contains("arp"), "Error should include command name");
        assert!(msg.contains("not found in PATH"));
    }

    #[test]
    fn test_agent_protocol_includes_command() {
        let err = Error::agent_protocol("guest-file-open", "missing 'return' field");
        let msg = err.to_string();
        assert!(msg.contains("guest-file-open"));
        assert!(msg.contains("return"));
    }

    #[test]
    fn test_unsupported_names_operation() {
        let err = Error::Unsupported("update_kernel");
        assert!(err.to_string().contains("update_kernel"));
    }
}
