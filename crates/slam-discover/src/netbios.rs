//! NetBIOS name lookup through nmap's `nbstat` script.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::adapters::HostnameSource;
use crate::error::{DiscoverError, Result};
use crate::scanner::NmapScanner;

pub struct NetbiosProbe {
    scanner: Arc<NmapScanner>,
    timeout: Duration,
}

impl NetbiosProbe {
    pub fn new(scanner: Arc<NmapScanner>, timeout: Duration) -> Self {
        Self { scanner, timeout }
    }

    /// Query the NetBIOS name of `ip`, bounded by the probe timeout.
    pub async fn query(&self, ip: IpAddr) -> Result<Option<String>> {
        let run = tokio::time::timeout(
            self.timeout,
            self.scanner.run(&["--script", "nbstat"], &ip.to_string()),
        )
        .await
        .map_err(|_| DiscoverError::ToolTimeout {
            tool: "nmap nbstat".to_string(),
            seconds: self.timeout.as_secs(),
        })??;

        Ok(run
            .host(ip)
            .and_then(|h| h.script_output("nbstat"))
            .and_then(parse_nbstat_name))
    }
}

#[async_trait]
impl HostnameSource for NetbiosProbe {
    fn name(&self) -> &'static str {
        "netbios"
    }

    async fn lookup(&self, ip: IpAddr) -> Option<String> {
        match self.query(ip).await {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!(ip = %ip, error = %e, "NetBIOS probe failed");
                None
            }
        }
    }
}

/// Extract the machine name from `nbstat` script output.
///
/// The name is the text after `NetBIOS name:` up to the first comma.
pub fn parse_nbstat_name(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix("NetBIOS name:")?;
        let name = rest.split(',').next()?.trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}
