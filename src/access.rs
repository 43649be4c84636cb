//! Register and coil access
//!
//! One operation per (data space, direction), all addressed to the session's
//! current unit id.
//!
//! | Code | Operation | Failure behaviour |
//! |------|-----------|-------------------|
//! | 0x01 | [`Session::read_coils`] | retried, then `Unsupported` |
//! | 0x02 | [`Session::read_discrete_inputs`] | retried, then `Unsupported` |
//! | 0x03 | [`Session::read_holding_registers`] | retried, then `Unsupported` |
//! | 0x04 | [`Session::read_input_registers`] | retried, then `Unsupported` |
//! | 0x05 | [`Session::write_coil`] | single attempt, `Err` |
//! | 0x06 | [`Session::write_register`] | single attempt, `Err` |
//! | 0x0F | [`Session::write_multiple_coils`] | single attempt, `Err` |
//! | 0x10 | [`Session::write_multiple_registers`] | single attempt, `Err` |
//!
//! Reads never fail outright: a read that still fails after its last attempt
//! yields [`ReadResult::Unsupported`], which still answers `len() == count`
//! and [`Reading::Unknown`] at every offset. Writes are never retried since a
//! repeated write against a stateful device can take effect twice.

use std::fmt;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::{ModbusError, ModbusResult};
use crate::pdu::{check_write_echo, parse_bits, parse_registers, PduBuilder};
use crate::protocol::{AddressRange, DataSpace, ModbusFunction, UnitId};
use crate::session::Session;
use crate::transport::ModbusTransport;

/// One point of a read: its value, or unknown when the read failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Reading<T> {
    Value(T),
    Unknown,
}

impl<T: Copy> Reading<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Reading::Value(v) => Some(v),
            Reading::Unknown => None,
        }
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, Reading::Unknown)
    }
}

impl<T: fmt::Display> fmt::Display for Reading<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Value(v) => v.fmt(f),
            Reading::Unknown => f.write_str("?"),
        }
    }
}

/// Outcome of a read over `count` addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReadResult<T> {
    /// Exactly `count` values in ascending address order
    Values(Vec<T>),
    /// The read failed on every attempt
    Unsupported { count: u16, reason: String },
}

impl<T: Copy> ReadResult<T> {
    pub(crate) fn unsupported(count: u16, err: &ModbusError) -> Self {
        ReadResult::Unsupported {
            count,
            reason: err.to_string(),
        }
    }

    /// Always the requested count
    pub fn len(&self) -> usize {
        match self {
            ReadResult::Values(v) => v.len(),
            ReadResult::Unsupported { count, .. } => *count as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, ReadResult::Values(_))
    }

    /// Value at `offset` from the range start; unknown past the end
    pub fn get(&self, offset: usize) -> Reading<T> {
        match self {
            ReadResult::Values(v) => v.get(offset).copied().map_or(Reading::Unknown, Reading::Value),
            ReadResult::Unsupported { .. } => Reading::Unknown,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Reading<T>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    pub fn readings(&self) -> Vec<Reading<T>> {
        self.iter().collect()
    }

    pub fn values(&self) -> Option<&[T]> {
        match self {
            ReadResult::Values(v) => Some(v),
            ReadResult::Unsupported { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ReadResult::Values(_) => None,
            ReadResult::Unsupported { reason, .. } => Some(reason),
        }
    }
}

/// A read over any data space
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SpaceReadings {
    Bits(ReadResult<bool>),
    Registers(ReadResult<u16>),
}

impl SpaceReadings {
    pub fn len(&self) -> usize {
        match self {
            SpaceReadings::Bits(r) => r.len(),
            SpaceReadings::Registers(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_supported(&self) -> bool {
        match self {
            SpaceReadings::Bits(r) => r.is_supported(),
            SpaceReadings::Registers(r) => r.is_supported(),
        }
    }

    /// Point at `offset` widened to u16 (coils read as 0/1)
    pub fn get(&self, offset: usize) -> Reading<u16> {
        match self {
            SpaceReadings::Bits(r) => match r.get(offset) {
                Reading::Value(b) => Reading::Value(u16::from(b)),
                Reading::Unknown => Reading::Unknown,
            },
            SpaceReadings::Registers(r) => r.get(offset),
        }
    }
}

impl<T: ModbusTransport> Session<T> {
    /// Read coils (FC01)
    pub async fn read_coils(&mut self, range: AddressRange) -> ReadResult<bool> {
        self.read_with_retry(ModbusFunction::ReadCoils, range, parse_bits)
            .await
    }

    /// Read discrete inputs (FC02)
    pub async fn read_discrete_inputs(&mut self, range: AddressRange) -> ReadResult<bool> {
        self.read_with_retry(ModbusFunction::ReadDiscreteInputs, range, parse_bits)
            .await
    }

    /// Read holding registers (FC03)
    pub async fn read_holding_registers(&mut self, range: AddressRange) -> ReadResult<u16> {
        self.read_with_retry(ModbusFunction::ReadHoldingRegisters, range, parse_registers)
            .await
    }

    /// Read input registers (FC04)
    pub async fn read_input_registers(&mut self, range: AddressRange) -> ReadResult<u16> {
        self.read_with_retry(ModbusFunction::ReadInputRegisters, range, parse_registers)
            .await
    }

    /// Read any data space, e.g. to dump its first [`DUMP_COUNT`] points
    ///
    /// [`DUMP_COUNT`]: crate::constants::DUMP_COUNT
    pub async fn read_space(&mut self, space: DataSpace, range: AddressRange) -> SpaceReadings {
        match space {
            DataSpace::Coils => SpaceReadings::Bits(self.read_coils(range).await),
            DataSpace::DiscreteInputs => SpaceReadings::Bits(self.read_discrete_inputs(range).await),
            DataSpace::HoldingRegisters => {
                SpaceReadings::Registers(self.read_holding_registers(range).await)
            }
            DataSpace::InputRegisters => {
                SpaceReadings::Registers(self.read_input_registers(range).await)
            }
        }
    }

    /// Write single coil (FC05)
    pub async fn write_coil(&mut self, address: u16, value: bool) -> ModbusResult<()> {
        let unit = self.unit_id();
        let payload = PduBuilder::write_single_coil(address, value)?;
        let echo = if value { 0xFF00 } else { 0x0000 };
        self.write_once(unit, ModbusFunction::WriteSingleCoil, &payload, address, echo)
            .await
    }

    /// Write single register (FC06)
    pub async fn write_register(&mut self, address: u16, value: u16) -> ModbusResult<()> {
        let unit = self.unit_id();
        self.write_register_to(unit, address, value).await
    }

    /// Write multiple coils (FC15)
    pub async fn write_multiple_coils(&mut self, address: u16, values: &[bool]) -> ModbusResult<()> {
        let range = write_range(address, values.len())?;
        let unit = self.unit_id();
        let payload = PduBuilder::write_multiple_coils(address, values)?;
        self.write_once(
            unit,
            ModbusFunction::WriteMultipleCoils,
            &payload,
            address,
            range.count(),
        )
        .await
    }

    /// Write multiple registers (FC16)
    pub async fn write_multiple_registers(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> ModbusResult<()> {
        let range = write_range(address, values.len())?;
        let unit = self.unit_id();
        let payload = PduBuilder::write_multiple_registers(address, values)?;
        self.write_once(
            unit,
            ModbusFunction::WriteMultipleRegisters,
            &payload,
            address,
            range.count(),
        )
        .await
    }

    /// FC06 to an explicit unit, leaving the current unit id alone
    pub(crate) async fn write_register_to(
        &mut self,
        unit: UnitId,
        address: u16,
        value: u16,
    ) -> ModbusResult<()> {
        let payload = PduBuilder::write_single_register(address, value)?;
        self.write_once(unit, ModbusFunction::WriteSingleRegister, &payload, address, value)
            .await
    }

    async fn write_once(
        &mut self,
        unit: UnitId,
        function: ModbusFunction,
        payload: &[u8],
        address: u16,
        echo: u16,
    ) -> ModbusResult<()> {
        let result = match self.execute(unit, function, payload).await {
            Ok(response) => check_write_echo(function, &response, address, echo),
            Err(e) => Err(e),
        };
        match &result {
            Ok(()) => debug!("unit {} {} at {} ok", unit, function, address),
            Err(e) => error!("unit {} {} at {} failed: {}", unit, function, address, e),
        }
        result
    }

    async fn read_with_retry<V, F>(
        &mut self,
        function: ModbusFunction,
        range: AddressRange,
        parse: F,
    ) -> ReadResult<V>
    where
        V: Copy,
        F: Fn(&[u8], u16) -> ModbusResult<Vec<V>>,
    {
        let unit = self.unit_id();
        let payload = match PduBuilder::read_request(range) {
            Ok(p) => p,
            Err(e) => return ReadResult::unsupported(range.count(), &e),
        };

        let retry = self.retry_policy();
        let attempts = retry.attempts();
        let mut attempt = 1;
        loop {
            let outcome = match self.execute(unit, function, &payload).await {
                Ok(response) => parse(&response, range.count()),
                Err(e) => Err(e),
            };

            let err = match outcome {
                Ok(values) => return ReadResult::Values(values),
                Err(e) => e,
            };

            warn!(
                "unit {} {} {} attempt {}/{} failed: {}",
                unit, function, range, attempt, attempts, err
            );
            if attempt >= attempts || !err.is_retryable() {
                return ReadResult::unsupported(range.count(), &err);
            }
            attempt += 1;
            if !retry.pause.is_zero() {
                tokio::time::sleep(retry.pause).await;
            }
        }
    }
}

fn write_range(address: u16, len: usize) -> ModbusResult<AddressRange> {
    let count = u16::try_from(len)
        .map_err(|_| ModbusError::validation(format!("{} values do not fit one request", len)))?;
    AddressRange::new(address, count)
}
