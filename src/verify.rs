//! Write-then-verify
//!
//! Each verified write issues the write, then reads the same range back on
//! the same unit and compares element by element. A mismatch or a failed
//! readback yields `passed == false`; nothing is written again.

use serde::Serialize;
use tracing::{info, warn};

use crate::access::ReadResult;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::AddressRange;
use crate::session::Session;
use crate::transport::ModbusTransport;

/// What the readback after a write showed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationOutcome<T> {
    pub range: AddressRange,
    pub written: Vec<T>,
    pub observed: ReadResult<T>,
    pub passed: bool,
}

impl<T: Copy + PartialEq> VerificationOutcome<T> {
    fn compare(range: AddressRange, written: Vec<T>, observed: ReadResult<T>) -> Self {
        let passed = observed.values() == Some(written.as_slice());
        Self {
            range,
            written,
            observed,
            passed,
        }
    }

    /// Offsets whose readback differs from what was written (unknown counts as different)
    pub fn mismatches(&self) -> Vec<usize> {
        self.written
            .iter()
            .enumerate()
            .filter(|(i, w)| self.observed.get(*i).value() != Some(**w))
            .map(|(i, _)| i)
            .collect()
    }
}

fn report<T: Copy + PartialEq>(outcome: &VerificationOutcome<T>) {
    if outcome.passed {
        info!("verified {}", outcome.range);
    } else {
        warn!(
            "verification failed for {}: {} of {} points differ",
            outcome.range,
            outcome.mismatches().len(),
            outcome.written.len()
        );
    }
}

fn range_for(address: u16, len: usize) -> ModbusResult<AddressRange> {
    let count = u16::try_from(len)
        .map_err(|_| ModbusError::validation(format!("{} values do not fit one request", len)))?;
    AddressRange::new(address, count)
}

impl<T: ModbusTransport> Session<T> {
    /// FC05 then FC01 readback
    pub async fn write_coil_verified(
        &mut self,
        address: u16,
        value: bool,
    ) -> ModbusResult<VerificationOutcome<bool>> {
        self.write_coil(address, value).await?;
        let range = AddressRange::single(address);
        let observed = self.read_coils(range).await;
        let outcome = VerificationOutcome::compare(range, vec![value], observed);
        report(&outcome);
        Ok(outcome)
    }

    /// FC06 then FC03 readback
    pub async fn write_register_verified(
        &mut self,
        address: u16,
        value: u16,
    ) -> ModbusResult<VerificationOutcome<u16>> {
        self.write_register(address, value).await?;
        let range = AddressRange::single(address);
        let observed = self.read_holding_registers(range).await;
        let outcome = VerificationOutcome::compare(range, vec![value], observed);
        report(&outcome);
        Ok(outcome)
    }

    /// FC15 then FC01 readback
    pub async fn write_multiple_coils_verified(
        &mut self,
        address: u16,
        values: &[bool],
    ) -> ModbusResult<VerificationOutcome<bool>> {
        let range = range_for(address, values.len())?;
        self.write_multiple_coils(address, values).await?;
        let observed = self.read_coils(range).await;
        let outcome = VerificationOutcome::compare(range, values.to_vec(), observed);
        report(&outcome);
        Ok(outcome)
    }

    /// FC16 then FC03 readback
    pub async fn write_multiple_registers_verified(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> ModbusResult<VerificationOutcome<u16>> {
        let range = range_for(address, values.len())?;
        self.write_multiple_registers(address, values).await?;
        let observed = self.read_holding_registers(range).await;
        let outcome = VerificationOutcome::compare(range, values.to_vec(), observed);
        report(&outcome);
        Ok(outcome)
    }
}
