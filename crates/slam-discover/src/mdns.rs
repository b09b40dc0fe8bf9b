//! Passive hostname cache fed by a background mDNS listener.
//!
//! The listener browses a fixed set of service types and records the
//! advertised host name of every resolved service against each of its
//! addresses. Lookups never touch the network.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::adapters::HostnameSource;
use crate::error::{DiscoverError, Result};

struct Listener {
    daemon: ServiceDaemon,
    cancel: CancellationToken,
}

/// Process-wide cache of mDNS-advertised host names, keyed by IP.
pub struct MdnsCache {
    entries: Arc<Mutex<HashMap<IpAddr, String>>>,
    service_types: Vec<String>,
    listener: Mutex<Option<Listener>>,
}

impl MdnsCache {
    /// `service_types` is expected to be de-duplicated already.
    pub fn new(service_types: Vec<String>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            service_types,
            listener: Mutex::new(None),
        }
    }

    /// Start browsing. Calling `start` on a running cache does nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut listener = self.listener.lock();
        if listener.is_some() {
            return Ok(());
        }

        let daemon = ServiceDaemon::new().map_err(|e| DiscoverError::Mdns(e.to_string()))?;
        let cancel = CancellationToken::new();

        for service_type in &self.service_types {
            let receiver = match daemon.browse(service_type) {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(service_type = %service_type, error = %e, "Skipping mDNS service type");
                    continue;
                }
            };
            let entries = self.entries.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        event = receiver.recv_async() => match event {
                            Ok(ServiceEvent::ServiceResolved(info)) => {
                                let host = info.get_hostname().trim_end_matches('.').to_string();
                                if host.is_empty() {
                                    continue;
                                }
                                let mut entries = entries.lock();
                                for addr in info.get_addresses() {
                                    entries.insert(*addr, host.clone());
                                }
                            }
                            Ok(_) => {}
                            Err(_) => break,
                        },
                    }
                }
            });
        }

        tracing::info!(service_types = self.service_types.len(), "mDNS listener started");
        *listener = Some(Listener { daemon, cancel });
        Ok(())
    }

    /// Stop browsing. Cached names are kept.
    pub fn stop(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.cancel.cancel();
            if let Err(e) = listener.daemon.shutdown() {
                tracing::warn!(error = %e, "mDNS daemon shutdown failed");
            }
            tracing::info!("mDNS listener stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Record a name for `ip`, replacing any earlier one.
    pub fn record(&self, ip: IpAddr, hostname: impl Into<String>) {
        self.entries.lock().insert(ip, hostname.into());
    }

    pub fn get(&self, ip: IpAddr) -> Option<String> {
        self.entries.lock().get(&ip).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for MdnsCache {
    fn drop(&mut self) {
        self.stop();
    }
}

#[async_trait]
impl HostnameSource for MdnsCache {
    fn name(&self) -> &'static str {
        "mdns"
    }

    async fn lookup(&self, ip: IpAddr) -> Option<String> {
        self.get(ip)
    }
}
