//! # Unit Reconnaissance
//!
//! Finds which unit ids answer behind one Modbus/TCP endpoint.
//!
//! Each candidate gets its own short-lived connection: connect, send the
//! fixed probe frame, read up to 12 bytes, close. Probes never touch a
//! [`Session`](crate::session::Session), so they can run in parallel with
//! ordinary traffic and with each other.
//!
//! ## Probe frame
//!
//! ```text
//! 21 00 00 00 00 06 | <unit> | 04 00 01 00 00
//! prefix              unit id  trailer
//! ```
//!
//! | Reply (first 4 bytes) | Status |
//! |-----------------------|--------|
//! | `21 00 00 00` | Active |
//! | nothing, or `00 00 00 00` | Inactive |
//! | anything else, or an I/O failure | Unreachable |
//!
//! The layout and the rule are an empirical liveness heuristic, not a
//! standard request; they are kept byte for byte.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ReconConfig;
use crate::constants::{
    PROBE_ACTIVE_PREFIX, PROBE_FRAME_LEN, PROBE_PREFIX, PROBE_REPLY_LEN, PROBE_TRAILER,
};
use crate::protocol::UnitId;
use crate::transport::{ModbusTransport, TcpTransport};

/// Classification of one probed unit id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProbeStatus {
    Active,
    Inactive,
    Unreachable,
}

/// Result of probing one unit id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub unit_id: UnitId,
    pub status: ProbeStatus,
    /// Why a probe was unreachable, or the odd reply that made it so
    pub detail: Option<String>,
}

impl ProbeResult {
    fn unreachable(unit_id: UnitId, detail: impl Into<String>) -> Self {
        Self {
            unit_id,
            status: ProbeStatus::Unreachable,
            detail: Some(detail.into()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ProbeStatus::Active
    }
}

/// Builder and parser for the liveness probe
pub struct ProbeFrame;

impl ProbeFrame {
    /// Probe bytes for one unit id
    pub fn build(unit_id: u8) -> [u8; PROBE_FRAME_LEN] {
        let mut frame = [0u8; PROBE_FRAME_LEN];
        frame[..PROBE_PREFIX.len()].copy_from_slice(&PROBE_PREFIX);
        frame[PROBE_PREFIX.len()] = unit_id;
        frame[PROBE_PREFIX.len() + 1..].copy_from_slice(&PROBE_TRAILER);
        frame
    }

    /// Classify whatever came back; an empty reply reads as four zero bytes
    pub fn classify(reply: &[u8]) -> ProbeStatus {
        let head = &reply[..reply.len().min(PROBE_ACTIVE_PREFIX.len())];
        if head == PROBE_ACTIVE_PREFIX {
            ProbeStatus::Active
        } else if head.is_empty() || head == [0u8; 4] {
            ProbeStatus::Inactive
        } else {
            ProbeStatus::Unreachable
        }
    }
}

/// Probe a single unit id on its own connection
pub async fn probe_unit(address: SocketAddr, unit_id: UnitId, timeout: Duration) -> ProbeResult {
    let mut transport = match TcpTransport::connect(address, timeout).await {
        Ok(t) => t,
        Err(e) => {
            debug!("probe unit {}: {}", unit_id, e);
            return ProbeResult::unreachable(unit_id, e.to_string());
        }
    };

    let frame = ProbeFrame::build(unit_id.get());
    let reply = match transport.send_raw(&frame).await {
        Ok(()) => transport.recv_raw(PROBE_REPLY_LEN).await,
        Err(e) => Err(e),
    };
    let _ = transport.close().await;

    match reply {
        Ok(bytes) => {
            let status = ProbeFrame::classify(&bytes);
            debug!("probe unit {}: {:?} ({} bytes)", unit_id, status, bytes.len());
            let detail = (status == ProbeStatus::Unreachable)
                .then(|| format!("unexpected reply {}", crate::logging::format_hex_packet(&bytes)));
            if let Some(d) = &detail {
                warn!("probe unit {}: {}", unit_id, d);
            }
            ProbeResult {
                unit_id,
                status,
                detail,
            }
        }
        Err(e) => {
            debug!("probe unit {}: {}", unit_id, e);
            ProbeResult::unreachable(unit_id, e.to_string())
        }
    }
}

/// Probe every given unit id through a bounded worker pool.
///
/// Returns one result per distinct unit id, sorted by unit id regardless of
/// completion order.
pub async fn scan_units<I>(address: SocketAddr, units: I, config: ReconConfig) -> Vec<ProbeResult>
where
    I: IntoIterator<Item = UnitId>,
{
    let candidates: BTreeSet<UnitId> = units.into_iter().collect();
    let semaphore = Arc::new(Semaphore::new(config.worker_count()));
    let probe_timeout = config.probe_timeout;
    let mut set = JoinSet::new();

    info!(
        "Scanning {} unit ids on {} with {} workers",
        candidates.len(),
        address,
        config.worker_count()
    );

    for &unit_id in &candidates {
        let semaphore = semaphore.clone();
        set.spawn(async move {
            // The semaphore is never closed
            let _permit = semaphore.acquire_owned().await.ok();
            probe_unit(address, unit_id, probe_timeout).await
        });
    }

    let mut results = Vec::with_capacity(candidates.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => warn!("probe task failed: {}", e),
        }
    }

    // A task that died still owes its unit a result
    let seen: BTreeSet<UnitId> = results.iter().map(|r| r.unit_id).collect();
    for &unit_id in candidates.difference(&seen) {
        results.push(ProbeResult::unreachable(unit_id, "probe task failed"));
    }

    results.sort_by_key(|r| r.unit_id);
    let active = results.iter().filter(|r| r.is_active()).count();
    info!("Scan of {} finished: {} active", address, active);
    results
}

/// Probe the full 1..=254 range
pub async fn scan_all(address: SocketAddr, config: ReconConfig) -> Vec<ProbeResult> {
    scan_units(address, UnitId::all(), config).await
}

/// Unit ids classified active, ascending
pub fn active_units(results: &[ProbeResult]) -> Vec<UnitId> {
    results
        .iter()
        .filter(|r| r.is_active())
        .map(|r| r.unit_id)
        .collect()
}
