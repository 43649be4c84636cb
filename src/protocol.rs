//! Modbus protocol vocabulary
//!
//! Function codes, exception codes, unit identifiers, data spaces and
//! validated address ranges.

use std::fmt;

use serde::Serialize;

use crate::constants::{
    DEFAULT_UNIT_ID, EXCEPTION_ACKNOWLEDGE, EXCEPTION_GATEWAY_PATH_UNAVAILABLE,
    EXCEPTION_GATEWAY_TARGET_FAILED, EXCEPTION_ILLEGAL_DATA_ADDRESS,
    EXCEPTION_ILLEGAL_DATA_VALUE, EXCEPTION_ILLEGAL_FUNCTION, EXCEPTION_MEMORY_PARITY_ERROR,
    EXCEPTION_SERVER_DEVICE_BUSY, EXCEPTION_SERVER_DEVICE_FAILURE, FC_READ_COILS,
    FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL,
    FC_WRITE_SINGLE_REGISTER, MAX_ADDRESS, MAX_UNIT_ID, MIN_UNIT_ID,
};
use crate::error::{ModbusError, ModbusResult};

/// Supported Modbus function codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModbusFunction {
    ReadCoils = FC_READ_COILS,
    ReadDiscreteInputs = FC_READ_DISCRETE_INPUTS,
    ReadHoldingRegisters = FC_READ_HOLDING_REGISTERS,
    ReadInputRegisters = FC_READ_INPUT_REGISTERS,
    WriteSingleCoil = FC_WRITE_SINGLE_COIL,
    WriteSingleRegister = FC_WRITE_SINGLE_REGISTER,
    WriteMultipleCoils = FC_WRITE_MULTIPLE_COILS,
    WriteMultipleRegisters = FC_WRITE_MULTIPLE_REGISTERS,
}

impl ModbusFunction {
    pub fn from_u8(value: u8) -> ModbusResult<Self> {
        match value {
            FC_READ_COILS => Ok(Self::ReadCoils),
            FC_READ_DISCRETE_INPUTS => Ok(Self::ReadDiscreteInputs),
            FC_READ_HOLDING_REGISTERS => Ok(Self::ReadHoldingRegisters),
            FC_READ_INPUT_REGISTERS => Ok(Self::ReadInputRegisters),
            FC_WRITE_SINGLE_COIL => Ok(Self::WriteSingleCoil),
            FC_WRITE_SINGLE_REGISTER => Ok(Self::WriteSingleRegister),
            FC_WRITE_MULTIPLE_COILS => Ok(Self::WriteMultipleCoils),
            FC_WRITE_MULTIPLE_REGISTERS => Ok(Self::WriteMultipleRegisters),
            _ => Err(ModbusError::invalid_function(value)),
        }
    }

    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn is_read(self) -> bool {
        matches!(
            self,
            Self::ReadCoils
                | Self::ReadDiscreteInputs
                | Self::ReadHoldingRegisters
                | Self::ReadInputRegisters
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ReadCoils => "Read Coils",
            Self::ReadDiscreteInputs => "Read Discrete Inputs",
            Self::ReadHoldingRegisters => "Read Holding Registers",
            Self::ReadInputRegisters => "Read Input Registers",
            Self::WriteSingleCoil => "Write Single Coil",
            Self::WriteSingleRegister => "Write Single Register",
            Self::WriteMultipleCoils => "Write Multiple Coils",
            Self::WriteMultipleRegisters => "Write Multiple Registers",
        }
    }
}

impl fmt::Display for ModbusFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.to_u8())
    }
}

/// Modbus exception codes a server may answer with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModbusException {
    IllegalFunction = EXCEPTION_ILLEGAL_FUNCTION,
    IllegalDataAddress = EXCEPTION_ILLEGAL_DATA_ADDRESS,
    IllegalDataValue = EXCEPTION_ILLEGAL_DATA_VALUE,
    ServerDeviceFailure = EXCEPTION_SERVER_DEVICE_FAILURE,
    Acknowledge = EXCEPTION_ACKNOWLEDGE,
    ServerDeviceBusy = EXCEPTION_SERVER_DEVICE_BUSY,
    MemoryParityError = EXCEPTION_MEMORY_PARITY_ERROR,
    GatewayPathUnavailable = EXCEPTION_GATEWAY_PATH_UNAVAILABLE,
    GatewayTargetFailed = EXCEPTION_GATEWAY_TARGET_FAILED,
}

impl ModbusException {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            EXCEPTION_ILLEGAL_FUNCTION => Some(Self::IllegalFunction),
            EXCEPTION_ILLEGAL_DATA_ADDRESS => Some(Self::IllegalDataAddress),
            EXCEPTION_ILLEGAL_DATA_VALUE => Some(Self::IllegalDataValue),
            EXCEPTION_SERVER_DEVICE_FAILURE => Some(Self::ServerDeviceFailure),
            EXCEPTION_ACKNOWLEDGE => Some(Self::Acknowledge),
            EXCEPTION_SERVER_DEVICE_BUSY => Some(Self::ServerDeviceBusy),
            EXCEPTION_MEMORY_PARITY_ERROR => Some(Self::MemoryParityError),
            EXCEPTION_GATEWAY_PATH_UNAVAILABLE => Some(Self::GatewayPathUnavailable),
            EXCEPTION_GATEWAY_TARGET_FAILED => Some(Self::GatewayTargetFailed),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal Function",
            Self::IllegalDataAddress => "Illegal Data Address",
            Self::IllegalDataValue => "Illegal Data Value",
            Self::ServerDeviceFailure => "Server Device Failure",
            Self::Acknowledge => "Acknowledge",
            Self::ServerDeviceBusy => "Server Device Busy",
            Self::MemoryParityError => "Memory Parity Error",
            Self::GatewayPathUnavailable => "Gateway Path Unavailable",
            Self::GatewayTargetFailed => "Gateway Target Device Failed to Respond",
        }
    }
}

impl fmt::Display for ModbusException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.description(), *self as u8)
    }
}

/// Secondary unit identifier, always within 1..=254
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UnitId(u8);

impl UnitId {
    pub fn new(id: u8) -> ModbusResult<Self> {
        if (MIN_UNIT_ID..=MAX_UNIT_ID).contains(&id) {
            Ok(Self(id))
        } else {
            Err(ModbusError::validation(format!(
                "unit id {} outside {}..={}",
                id, MIN_UNIT_ID, MAX_UNIT_ID
            )))
        }
    }

    #[inline]
    pub fn get(self) -> u8 {
        self.0
    }

    /// Every addressable unit id in ascending order
    pub fn all() -> impl Iterator<Item = UnitId> {
        (MIN_UNIT_ID..=MAX_UNIT_ID).map(UnitId)
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self(DEFAULT_UNIT_ID)
    }
}

impl TryFrom<u8> for UnitId {
    type Error = ModbusError;

    fn try_from(id: u8) -> ModbusResult<Self> {
        Self::new(id)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four primitive Modbus data spaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DataSpace {
    Coils,
    DiscreteInputs,
    HoldingRegisters,
    InputRegisters,
}

impl DataSpace {
    /// Banner capture order
    pub const ALL: [DataSpace; 4] = [
        DataSpace::Coils,
        DataSpace::DiscreteInputs,
        DataSpace::HoldingRegisters,
        DataSpace::InputRegisters,
    ];

    pub fn read_function(self) -> ModbusFunction {
        match self {
            Self::Coils => ModbusFunction::ReadCoils,
            Self::DiscreteInputs => ModbusFunction::ReadDiscreteInputs,
            Self::HoldingRegisters => ModbusFunction::ReadHoldingRegisters,
            Self::InputRegisters => ModbusFunction::ReadInputRegisters,
        }
    }

    pub fn is_bit_space(self) -> bool {
        matches!(self, Self::Coils | Self::DiscreteInputs)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Coils => "Coils",
            Self::DiscreteInputs => "Discrete Inputs",
            Self::HoldingRegisters => "Holding Registers",
            Self::InputRegisters => "Input Registers",
        }
    }
}

impl fmt::Display for DataSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A contiguous block of addresses: `start..start + count`
///
/// `count` is never zero and the block never runs past address 65535.
/// Per-function protocol maxima are left to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddressRange {
    start: u16,
    count: u16,
}

impl AddressRange {
    pub fn new(start: u16, count: u16) -> ModbusResult<Self> {
        if count == 0 {
            return Err(ModbusError::validation("count must be greater than zero"));
        }
        let last = u32::from(start) + u32::from(count) - 1;
        if last > u32::from(MAX_ADDRESS) {
            return Err(ModbusError::validation(format!(
                "range {}+{} runs past address {}",
                start, count, MAX_ADDRESS
            )));
        }
        Ok(Self { start, count })
    }

    /// Range of length one
    pub fn single(address: u16) -> Self {
        Self {
            start: address,
            count: 1,
        }
    }

    #[inline]
    pub fn start(&self) -> u16 {
        self.start
    }

    #[inline]
    pub fn count(&self) -> u16 {
        self.count
    }

    /// Addresses in ascending order
    pub fn addresses(&self) -> impl Iterator<Item = u16> {
        let start = u32::from(self.start);
        (start..start + u32::from(self.count)).map(|a| a as u16)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..={}",
            self.start,
            u32::from(self.start) + u32::from(self.count) - 1
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_roundtrip() {
        for code in [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x0F, 0x10] {
            assert_eq!(ModbusFunction::from_u8(code).unwrap().to_u8(), code);
        }
        assert!(matches!(
            ModbusFunction::from_u8(0x2B),
            Err(ModbusError::InvalidFunction { code: 0x2B })
        ));
    }

    #[test]
    fn test_unit_id_bounds() {
        assert!(UnitId::new(0).is_err());
        assert!(UnitId::new(255).is_err());
        assert_eq!(UnitId::new(1).unwrap().get(), 1);
        assert_eq!(UnitId::new(254).unwrap().get(), 254);
        assert_eq!(UnitId::default().get(), 1);
        assert_eq!(UnitId::all().count(), 254);
    }

    #[test]
    fn test_address_range_validation() {
        assert!(AddressRange::new(0, 0).is_err());
        assert!(AddressRange::new(65535, 1).is_ok());
        assert!(AddressRange::new(65535, 2).is_err());

        let range = AddressRange::new(10, 3).unwrap();
        assert_eq!(range.addresses().collect::<Vec<_>>(), vec![10, 11, 12]);
        assert_eq!(range.to_string(), "10..=12");
    }

    #[test]
    fn test_data_space_functions() {
        assert_eq!(
            DataSpace::InputRegisters.read_function(),
            ModbusFunction::ReadInputRegisters
        );
        assert!(DataSpace::DiscreteInputs.is_bit_space());
        assert!(!DataSpace::HoldingRegisters.is_bit_space());
    }

    #[test]
    fn test_exception_lookup() {
        assert_eq!(
            ModbusException::from_u8(0x02),
            Some(ModbusException::IllegalDataAddress)
        );
        assert_eq!(ModbusException::from_u8(0x07), None);
    }
}
