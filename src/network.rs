//! Network details of the target host
//!
//! Reverse DNS of the server address: the primary name, the address itself
//! and any further names the PTR answer carried.

use std::net::IpAddr;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::system_conf::read_system_conf;
use trust_dns_resolver::TokioAsyncResolver;

use crate::error::{ModbusError, ModbusResult};

/// What reverse DNS knows about the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostDetails {
    pub hostname: String,
    pub ip: IpAddr,
    pub aliases: Vec<String>,
}

impl HostDetails {
    /// First name is the hostname, the rest are aliases.
    ///
    /// Trailing root dots are stripped and repeated names dropped. `None`
    /// when no name is left.
    pub fn from_names<I>(ip: IpAddr, names: I) -> Option<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for name in names {
            let name = name.trim_end_matches('.');
            if !name.is_empty() && !unique.iter().any(|n| n == name) {
                unique.push(name.to_string());
            }
        }
        if unique.is_empty() {
            return None;
        }
        let hostname = unique.remove(0);
        Some(Self {
            hostname,
            ip,
            aliases: unique,
        })
    }
}

fn resolver(timeout: Duration) -> TokioAsyncResolver {
    let (config, mut opts) = match read_system_conf() {
        Ok(conf) => conf,
        Err(e) => {
            debug!("System resolver config unavailable ({}), using defaults", e);
            (ResolverConfig::default(), ResolverOpts::default())
        }
    };
    opts.timeout = timeout;
    opts.attempts = 1;
    TokioAsyncResolver::tokio(config, opts)
}

/// Reverse lookup of `ip`, each DNS attempt bounded by `timeout`
pub async fn network_details(ip: IpAddr, timeout: Duration) -> ModbusResult<HostDetails> {
    let response = resolver(timeout).reverse_lookup(ip).await.map_err(|e| {
        warn!("Reverse lookup of {} failed: {}", ip, e);
        ModbusError::connection(format!("Failed to get network details for {}: {}", ip, e))
    })?;

    let details = HostDetails::from_names(ip, response.iter().map(|name| name.to_string()))
        .ok_or_else(|| ModbusError::connection(format!("No host name recorded for {}", ip)))?;
    info!(
        "{} is {} ({} aliases)",
        ip,
        details.hostname,
        details.aliases.len()
    );
    Ok(details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn test_details_from_names() {
        let names = vec![
            "plc-7.plant.local.".to_string(),
            "hmi.plant.local.".to_string(),
            "plc-7.plant.local".to_string(),
            ".".to_string(),
        ];
        let details = HostDetails::from_names(LOOPBACK, names).unwrap();
        assert_eq!(details.hostname, "plc-7.plant.local");
        assert_eq!(details.ip, LOOPBACK);
        assert_eq!(details.aliases, vec!["hmi.plant.local".to_string()]);

        assert!(HostDetails::from_names(LOOPBACK, Vec::new()).is_none());
    }

    #[tokio::test]
    async fn test_loopback_lookup_answers_or_errors() {
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            network_details(LOOPBACK, Duration::from_millis(500)),
        )
        .await
        .expect("lookup must be bounded by its own timeout");

        match result {
            Ok(details) => {
                assert_eq!(details.ip, LOOPBACK);
                assert!(!details.hostname.is_empty());
                assert!(!details.hostname.ends_with('.'));
            }
            Err(e) => assert!(matches!(e, ModbusError::Connection { .. }), "{:?}", e),
        }
    }
}
