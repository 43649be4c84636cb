//! # Stress Routines
//!
//! Paced bulk writes against the current unit. Every routine goes through
//! the ordinary single-attempt write path and keeps going when a write
//! fails; the failures are collected in a [`StressReport`].
//!
//! | Routine | Target | Values | Pacing |
//! |---------|--------|--------|--------|
//! | [`Session::hex_randomize`] | HR 0..count | uniform random | `write_delay` |
//! | [`Session::text_edit`] | HR 0..len | one char per register | `write_delay` |
//! | [`Session::hex_modify`] | HR addr.. | hex literal, low word first | `write_delay` |
//! | [`Session::crash_system`] | HR 0..=65535 | uniform random | `crash_delay` |
//! | [`Session::chaos_mode`] | coils 0..100 | true, false, true, ... | `write_delay` |
//!
//! Input is validated before the first write: a bad hex literal, a character
//! outside 16 bits or a run past address 65535 sends nothing.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{CrashUnitPolicy, StressConfig};
use crate::constants::{ADDRESS_SPACE_SIZE, CHAOS_COIL_COUNT, MAX_UNIT_ID, MIN_UNIT_ID};
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::UnitId;
use crate::session::Session;
use crate::transport::ModbusTransport;

/// One write that did not go through
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteFailure {
    pub unit_id: UnitId,
    pub address: u16,
    pub reason: String,
}

/// Tally of a stress routine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StressReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<WriteFailure>,
}

impl StressReport {
    fn record(&mut self, unit_id: UnitId, address: u16, result: ModbusResult<()>) {
        self.attempted += 1;
        match result {
            Ok(()) => self.succeeded += 1,
            Err(e) => self.failures.push(WriteFailure {
                unit_id,
                address,
                reason: e.to_string(),
            }),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Split a hex literal into 16-bit words, least significant word first.
///
/// An optional `0x` prefix is accepted and leading zeros are ignored;
/// `"0"` yields a single zero word.
pub fn parse_hex_words(literal: &str) -> ModbusResult<Vec<u16>> {
    let trimmed = literal.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ModbusError::validation(format!(
            "invalid hex value '{}'",
            literal
        )));
    }

    let significant = digits.trim_start_matches('0').as_bytes();
    if significant.is_empty() {
        return Ok(vec![0]);
    }

    significant
        .rchunks(4)
        .map(|chunk| {
            // Chunks are ASCII hex digits checked above
            let text = std::str::from_utf8(chunk)
                .map_err(|e| ModbusError::validation(e.to_string()))?;
            u16::from_str_radix(text, 16).map_err(|e| ModbusError::validation(e.to_string()))
        })
        .collect()
}

/// One register per character; characters beyond 16 bits are rejected
pub fn encode_text(text: &str) -> ModbusResult<Vec<u16>> {
    text.chars()
        .map(|c| {
            u16::try_from(u32::from(c)).map_err(|_| {
                ModbusError::validation(format!("character {:?} does not fit a register", c))
            })
        })
        .collect()
}

fn span_check(start: u16, len: usize) -> ModbusResult<()> {
    if start as usize + len > ADDRESS_SPACE_SIZE as usize {
        return Err(ModbusError::validation(format!(
            "{} registers from {} run past address {}",
            len,
            start,
            u16::MAX
        )));
    }
    Ok(())
}

fn rng_for(config: &StressConfig) -> StdRng {
    match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

async fn pace(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

impl<T: ModbusTransport> Session<T> {
    /// Random values into holding registers 0..count
    pub async fn hex_randomize(
        &mut self,
        count: usize,
        config: &StressConfig,
    ) -> ModbusResult<StressReport> {
        span_check(0, count)?;
        let mut rng = rng_for(config);
        let values: Vec<u16> = (0..count).map(|_| rng.gen()).collect();
        let report = self.write_sequence(0, &values, config.write_delay).await;
        info!(
            "hex randomize: {}/{} registers written",
            report.succeeded, report.attempted
        );
        Ok(report)
    }

    /// Write `text` into holding registers from address 0
    pub async fn text_edit(&mut self, text: &str, config: &StressConfig) -> ModbusResult<StressReport> {
        let words = encode_text(text)?;
        span_check(0, words.len())?;
        let report = self.write_sequence(0, &words, config.write_delay).await;
        info!(
            "text edit: {}/{} characters written",
            report.succeeded, report.attempted
        );
        Ok(report)
    }

    /// Write a hex literal as consecutive registers from `address`
    pub async fn hex_modify(
        &mut self,
        address: u16,
        literal: &str,
        config: &StressConfig,
    ) -> ModbusResult<StressReport> {
        let words = parse_hex_words(literal)?;
        span_check(address, words.len())?;
        let report = self.write_sequence(address, &words, config.write_delay).await;
        info!(
            "hex modify at {}: {}/{} words written",
            address, report.succeeded, report.attempted
        );
        Ok(report)
    }

    /// Random value into every register address, failures logged and skipped
    pub async fn crash_system(&mut self, config: &StressConfig) -> StressReport {
        let mut rng = rng_for(config);
        let current = self.unit_id();
        let mut report = StressReport::default();

        warn!(
            "crash system: writing {} registers ({:?} per write, {:?} units)",
            ADDRESS_SPACE_SIZE, config.crash_delay, config.crash_unit_policy
        );
        for address in 0..=u16::MAX {
            let value: u16 = rng.gen();
            let unit = match config.crash_unit_policy {
                CrashUnitPolicy::Current => current,
                CrashUnitPolicy::RandomPerWrite => {
                    UnitId::new(rng.gen_range(MIN_UNIT_ID..=MAX_UNIT_ID)).unwrap_or(current)
                }
            };
            let result = self.write_register_to(unit, address, value).await;
            report.record(unit, address, result);
            pace(config.crash_delay).await;
        }

        info!(
            "crash system finished: {}/{} writes succeeded",
            report.succeeded, report.attempted
        );
        report
    }

    /// Alternate the first 100 coils, starting with `true` at address 0
    pub async fn chaos_mode(&mut self, config: &StressConfig) -> StressReport {
        let unit = self.unit_id();
        let mut report = StressReport::default();
        for address in 0..CHAOS_COIL_COUNT {
            let result = self.write_coil(address, address % 2 == 0).await;
            report.record(unit, address, result);
            pace(config.write_delay).await;
        }
        info!(
            "chaos mode: {}/{} coils toggled",
            report.succeeded, report.attempted
        );
        report
    }

    async fn write_sequence(&mut self, start: u16, values: &[u16], delay: Duration) -> StressReport {
        let unit = self.unit_id();
        let mut report = StressReport::default();
        for (address, &value) in (start..=u16::MAX).zip(values) {
            let result = self.write_register(address, value).await;
            report.record(unit, address, result);
            pace(delay).await;
        }
        report
    }
}
