//! VM IP discovery via the host neighbor-discovery table.
//!
//! A bridged guest's IP is not reported by the hypervisor; it is recovered
//! by correlating the guest's MAC address against the host ARP table. The
//! resolver polls `arp -a` with a bounded retry budget, one external
//! invocation plus a fixed sleep per attempt.

use crate::error::Result;
use crate::runner::CommandRunner;
use regex::Regex;
use std::net::Ipv4Addr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Retry budget for ARP polling (attempts).
pub const ARP_RETRIES: u32 = 120;

/// Pause between ARP polls.
pub const ARP_INTERVAL: Duration = Duration::from_secs(1);

fn ipv4_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3})").unwrap())
}

fn mac_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([0-9a-fA-F]{1,2}:[0-9a-fA-F]{1,2}:[0-9a-fA-F]{1,2}:[0-9a-fA-F]{1,2}:[0-9a-fA-F]{1,2}:[0-9a-fA-F]{1,2})").unwrap()
    })
}

fn xml_mac_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<mac address='([a-zA-Z0-9:]+)'").unwrap())
}

/// Extract the first interface MAC address from a domain XML description.
pub fn mac_from_xml_desc(xml: &str) -> Option<String> {
    xml_mac_re()
        .captures(xml)
        .map(|c| c[1].to_ascii_lowercase())
}

/// Parse one neighbor-table line into (IPv4, lowercased MAC).
///
/// Lines without both an IPv4 address and a MAC address yield `None`.
pub fn parse_neighbor_line(line: &str) -> Option<(Ipv4Addr, String)> {
    let ip = ipv4_re().captures(line)?.get(1)?.as_str().parse().ok()?;
    let mac = mac_re().captures(line)?.get(1)?.as_str().to_ascii_lowercase();
    Some((ip, mac))
}

/// Injectable sleep point, so the retry budget is testable without
/// wall-clock time.
pub trait Sleeper {
    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] using `std::thread::sleep`.
#[derive(Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Poll the neighbor table until a line matches `mac`, up to [`ARP_RETRIES`]
/// attempts spaced by [`ARP_INTERVAL`].
///
/// Returns `Ok(None)` when the budget is exhausted without a match; command
/// failures propagate.
pub fn resolve_ip_by_mac(
    runner: &dyn CommandRunner,
    sleeper: &dyn Sleeper,
    mac: &str,
) -> Result<Option<Ipv4Addr>> {
    let mac = mac.to_ascii_lowercase();
    let start = Instant::now();

    for attempt in 0..ARP_RETRIES {
        let lines = runner.run(&["arp", "-a"], true)?;
        for line in &lines {
            if let Some((ip, line_mac)) = parse_neighbor_line(line) {
                if line_mac == mac {
                    tracing::debug!(
                        %ip,
                        %mac,
                        attempt,
                        elapsed_secs = start.elapsed().as_secs(),
                        "resolved guest IP from neighbor table"
                    );
                    return Ok(Some(ip));
                }
            }
        }
        sleeper.sleep(ARP_INTERVAL);
    }

    tracing::warn!(
        %mac,
        retries = ARP_RETRIES,
        elapsed_secs = start.elapsed().as_secs(),
        "no neighbor-table entry for guest MAC"
    );
    Ok(None)
}
