//! JSON relay to the in-guest agent.
//!
//! File operations are three separate round-trips (open, read-or-write,
//! close); handles are never reused across calls. Every response to a
//! non-fire-and-forget command must carry a `return` field; a response
//! without one is a protocol violation surfaced as a typed error.

use crate::error::{Error, Result};
use crate::hypervisor::DomainHandle;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use std::time::Duration;

/// Fixed timeout for one agent round-trip.
pub const AGENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Relay for guest-agent commands against one resolved domain handle.
pub struct GuestAgent<'a> {
    domain: &'a dyn DomainHandle,
}

impl<'a> GuestAgent<'a> {
    /// Wrap a resolved domain handle.
    pub fn new(domain: &'a dyn DomainHandle) -> Self {
        Self { domain }
    }

    /// Submit one command and parse the JSON response.
    fn execute(&self, command: &str, arguments: Option<Value>) -> Result<Value> {
        let mut payload = json!({ "execute": command });
        if let Some(args) = arguments {
            payload["arguments"] = args;
        }
        let raw = self.domain.agent_command(&payload.to_string(), AGENT_TIMEOUT)?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::agent_protocol(command, format!("unparseable response: {}", e)))
    }

    /// Submit one command and require a `return` field in the response.
    fn execute_checked(&self, command: &str, arguments: Option<Value>) -> Result<Value> {
        let response = self.execute(command, arguments)?;
        response
            .get("return")
            .cloned()
            .ok_or_else(|| Error::agent_protocol(command, "missing 'return' field"))
    }

    /// Shut the guest down via `guest-shutdown`.
    ///
    /// Fire-and-forget: the agent may power off before replying, so the
    /// response is not validated.
    pub fn shutdown(&self) -> Result<()> {
        self.execute("guest-shutdown", None).map(|_| ())
    }

    /// Reboot the guest via `guest-shutdown` in reboot mode.
    pub fn reboot(&self) -> Result<()> {
        self.execute("guest-shutdown", Some(json!({ "mode": "reboot" })))
            .map(|_| ())
    }

    fn file_open(&self, path: &str, mode: &str) -> Result<i64> {
        let handle = self.execute_checked(
            "guest-file-open",
            Some(json!({ "path": path, "mode": mode })),
        )?;
        handle.as_i64().ok_or_else(|| {
            Error::agent_protocol("guest-file-open", "'return' is not a file handle")
        })
    }

    fn file_close(&self, handle: i64) -> Result<()> {
        self.execute_checked("guest-file-close", Some(json!({ "handle": handle })))?;
        Ok(())
    }

    /// Close `handle` after a failed transfer, keeping the original error.
    ///
    /// Protocol errors are recoverable, so an open handle must not outlive
    /// the failed call or retrying callers accumulate handles inside the
    /// agent.
    fn close_after_error(&self, handle: i64, err: Error) -> Error {
        if let Err(close_err) = self.file_close(handle) {
            tracing::warn!(handle, error = %close_err, "failed to close guest file handle after error");
        }
        err
    }

    /// Write a base64-encoded buffer to `path` inside the guest,
    /// truncating any existing content.
    pub fn file_write_b64(&self, path: &str, buf_b64: &str) -> Result<()> {
        let handle = self.file_open(path, "w+")?;
        self.execute_checked(
            "guest-file-write",
            Some(json!({ "handle": handle, "buf-b64": buf_b64 })),
        )
        .map_err(|e| self.close_after_error(handle, e))?;
        self.file_close(handle)
    }

    /// Write raw bytes to `path` inside the guest.
    pub fn file_write(&self, path: &str, content: &[u8]) -> Result<()> {
        self.file_write_b64(path, &BASE64.encode(content))
    }

    /// Read the full content of `path` inside the guest, base64-encoded.
    pub fn file_read_b64(&self, path: &str) -> Result<String> {
        let handle = self.file_open(path, "r")?;
        let buf = self
            .execute_checked("guest-file-read", Some(json!({ "handle": handle })))
            .and_then(|read| {
                read.get("buf-b64")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .ok_or_else(|| {
                        Error::agent_protocol("guest-file-read", "missing 'buf-b64' field")
                    })
            })
            .map_err(|e| self.close_after_error(handle, e))?;
        self.file_close(handle)?;
        Ok(buf)
    }

    /// Read the full content of `path` inside the guest as raw bytes.
    pub fn file_read(&self, path: &str) -> Result<Vec<u8>> {
        let buf = self.file_read_b64(path)?;
        BASE64
            .decode(buf.as_bytes())
            .map_err(|e| Error::agent_protocol("guest-file-read", format!("bad base64: {}", e)))
    }
}
