//! Nmap process wrapper.
//!
//! Executes nmap as a child process via `tokio::process::Command` and
//! parses the XML output into typed Rust structs.

use std::net::IpAddr;
use std::process::Output;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;

use crate::adapters::{PortSweep, ScanSource, Sweep, SweepHost};
use crate::error::{DiscoverError, Result};
use crate::nmap_xml::{self, NmapRun};

/// Wrapper around the nmap binary.
pub struct NmapScanner {
    nmap_path: String,
}

impl NmapScanner {
    pub fn new(nmap_path: &str) -> Self {
        Self {
            nmap_path: nmap_path.to_string(),
        }
    }

    /// Verify nmap is installed and accessible.
    pub async fn verify_installation(&self) -> Result<String> {
        let output = run_tool(&self.nmap_path, &["--version"]).await?;
        String::from_utf8(output.stdout).map_err(|e| DiscoverError::Parse(e.to_string()))
    }

    /// Run nmap with `args` against `target`, writing XML to stdout.
    ///
    /// The child is killed if the returned future is dropped, so callers
    /// may bound it with `tokio::time::timeout`.
    pub async fn run(&self, args: &[&str], target: &str) -> Result<NmapRun> {
        let mut full: Vec<&str> = args.to_vec();
        full.extend(["-oX", "-", "--noninteractive", target]);
        let output = run_tool(&self.nmap_path, &full).await?;
        nmap_xml::parse_nmap_xml(&output.stdout)
    }

    /// Ping sweep of a whole range: `-sn -T4 <cidr>`.
    pub async fn sweep(&self, cidr: &str) -> Result<Sweep> {
        let start = Instant::now();
        let run = self.run(&["-sn", "-T4"], cidr).await?;

        let hosts: Sweep = run
            .hosts
            .iter()
            .filter(|h| h.is_up())
            .filter_map(|h| {
                let ip = h.ip()?;
                Some((
                    ip,
                    SweepHost {
                        hostname: h.hostname().map(str::to_string),
                        mac: h.mac().map(str::to_string),
                        vendor: h.vendor().map(str::to_string),
                    },
                ))
            })
            .collect();

        tracing::info!(
            cidr = %cidr,
            hosts_up = hosts.len(),
            duration_ms = start.elapsed().as_millis(),
            "Liveness sweep complete"
        );
        Ok(hosts)
    }

    /// Top-N TCP port scan of one host: `--top-ports N -T4 <ip>`.
    ///
    /// `Ok(None)` when nmap reports the host down.
    pub async fn scan_ports(&self, ip: IpAddr, top_ports: u16) -> Result<Option<PortSweep>> {
        let top = top_ports.to_string();
        let run = self.run(&["--top-ports", top.as_str(), "-T4"], &ip.to_string()).await?;
        Ok(run
            .host(ip)
            .filter(|h| h.is_up())
            .map(|h| h.tcp_ports()))
    }
}

#[async_trait]
impl ScanSource for NmapScanner {
    async fn liveness_sweep(&self, cidr: &str) -> Option<Sweep> {
        match self.sweep(cidr).await {
            Ok(hosts) => Some(hosts),
            Err(e) => {
                tracing::warn!(cidr = %cidr, error = %e, "Liveness sweep failed");
                None
            }
        }
    }

    async fn port_sweep(&self, ip: IpAddr, top_ports: u16) -> Option<PortSweep> {
        match self.scan_ports(ip, top_ports).await {
            Ok(ports) => ports,
            Err(e) => {
                tracing::warn!(ip = %ip, error = %e, "Port sweep failed");
                None
            }
        }
    }
}

/// Run an external tool to completion, mapping spawn and exit failures.
pub(crate) async fn run_tool(program: &str, args: &[&str]) -> Result<Output> {
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| DiscoverError::ToolUnavailable {
            tool: program.to_string(),
            detail: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(DiscoverError::ToolFailed {
            tool: program.to_string(),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}
