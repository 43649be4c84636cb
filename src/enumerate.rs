//! Banner capture and per-unit enumeration
//!
//! A banner is one unit's first few points in every data space plus the
//! first holding registers decoded as text, read in the fixed order coils,
//! discrete inputs, holding registers, input registers, text.
//!
//! [`enumerate_units`] fans the capture out over a bounded pool. The session
//! lock is held from the unit switch until the last read of that unit, so a
//! snapshot is always read under the unit id it is tagged with.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use unicode_general_category::{get_general_category, GeneralCategory};

use crate::access::{ReadResult, Reading};
use crate::config::{BannerConfig, ReconConfig};
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{AddressRange, UnitId};
use crate::recon::{active_units, ProbeResult};
use crate::session::{Session, SharedSession};
use crate::transport::ModbusTransport;

/// Everything one unit showed at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BannerSnapshot {
    pub unit_id: UnitId,
    pub captured_at: DateTime<Utc>,
    pub coils: ReadResult<bool>,
    pub discrete_inputs: ReadResult<bool>,
    pub holding_registers: ReadResult<u16>,
    pub input_registers: ReadResult<u16>,
    /// Holding registers from address 0 as characters, `?` where unprintable or unknown
    pub text: String,
}

impl BannerSnapshot {
    /// True when no data space answered
    pub fn is_silent(&self) -> bool {
        !self.coils.is_supported()
            && !self.discrete_inputs.is_supported()
            && !self.holding_registers.is_supported()
            && !self.input_registers.is_supported()
    }
}

/// One register per character
pub fn decode_text(registers: &ReadResult<u16>) -> String {
    registers
        .iter()
        .map(|reading| match reading {
            Reading::Value(code) => char::from_u32(u32::from(code))
                .filter(|c| is_printable(*c))
                .unwrap_or('?'),
            Reading::Unknown => '?',
        })
        .collect()
}

/// The ASCII space is the only printable separator; control, format,
/// surrogate, private-use and unassigned code points are not printable.
fn is_printable(c: char) -> bool {
    use GeneralCategory::*;
    c == ' '
        || !matches!(
            get_general_category(c),
            Control
                | Format
                | Surrogate
                | PrivateUse
                | Unassigned
                | SpaceSeparator
                | LineSeparator
                | ParagraphSeparator
        )
}

impl<T: ModbusTransport> Session<T> {
    /// Capture the current unit's banner
    pub async fn grab_banner(&mut self, config: &BannerConfig) -> ModbusResult<BannerSnapshot> {
        let range = AddressRange::new(config.start, config.count)?;
        let unit_id = self.unit_id();
        let captured_at = Utc::now();

        let coils = self.read_coils(range).await;
        let discrete_inputs = self.read_discrete_inputs(range).await;
        let holding_registers = self.read_holding_registers(range).await;
        let input_registers = self.read_input_registers(range).await;
        let text = if config.text_registers == 0 {
            String::new()
        } else {
            let text_range = AddressRange::new(0, config.text_registers)?;
            decode_text(&self.read_holding_registers(text_range).await)
        };

        debug!("banner for unit {} captured", unit_id);
        Ok(BannerSnapshot {
            unit_id,
            captured_at,
            coils,
            discrete_inputs,
            holding_registers,
            input_registers,
            text,
        })
    }

    /// Banner of every given unit, one after another on this session.
    ///
    /// The current unit id is restored afterwards.
    pub async fn enumerate<I>(
        &mut self,
        units: I,
        config: &BannerConfig,
    ) -> ModbusResult<Vec<BannerSnapshot>>
    where
        I: IntoIterator<Item = UnitId>,
    {
        // Validate once so a bad config fails before any unit is touched
        AddressRange::new(config.start, config.count)?;

        let previous = self.unit_id();
        let mut snapshots = Vec::new();
        for unit in units {
            self.set_unit(unit);
            match self.grab_banner(config).await {
                Ok(s) => snapshots.push(s),
                Err(e) => warn!("banner for unit {} failed: {}", unit, e),
            }
        }
        self.set_unit(previous);
        Ok(snapshots)
    }
}

/// Capture banners for many units through a bounded worker pool sharing one
/// session.
///
/// Snapshots come back sorted by unit id. Each worker restores the session's
/// current unit id before it releases the lock.
pub async fn enumerate_units<T, I>(
    session: &SharedSession<T>,
    units: I,
    recon: ReconConfig,
    banner: BannerConfig,
) -> ModbusResult<Vec<BannerSnapshot>>
where
    T: ModbusTransport + 'static,
    I: IntoIterator<Item = UnitId>,
{
    AddressRange::new(banner.start, banner.count)?;

    let candidates: BTreeSet<UnitId> = units.into_iter().collect();
    let semaphore = Arc::new(Semaphore::new(recon.worker_count()));
    let mut set = JoinSet::new();

    info!(
        "Enumerating {} units with {} workers",
        candidates.len(),
        recon.worker_count()
    );

    for unit in candidates {
        let semaphore = semaphore.clone();
        let session = Arc::clone(session);
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let mut guard = session.lock().await;
            let previous = guard.unit_id();
            guard.set_unit(unit);
            let result = guard.grab_banner(&banner).await;
            guard.set_unit(previous);
            drop(guard);
            result.map_err(|e| (unit, e))
        });
    }

    let mut snapshots = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(snapshot)) => snapshots.push(snapshot),
            Ok(Err((unit, e))) => warn!("banner for unit {} failed: {}", unit, e),
            Err(e) => warn!("enumeration task failed: {}", e),
        }
    }

    snapshots.sort_by_key(|s| s.unit_id);
    info!("Enumeration finished: {} snapshots", snapshots.len());
    Ok(snapshots)
}

/// Shorthand for the common "banner of everything that answered a scan"
pub async fn enumerate_active<T>(
    session: &SharedSession<T>,
    probes: &[ProbeResult],
    recon: ReconConfig,
    banner: BannerConfig,
) -> ModbusResult<Vec<BannerSnapshot>>
where
    T: ModbusTransport + 'static,
{
    let active = active_units(probes);
    if active.is_empty() {
        return Err(ModbusError::validation("no active units to enumerate"));
    }
    enumerate_units(session, active, recon, banner).await
}
