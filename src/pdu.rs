//! PDU payload encoding and decoding
//!
//! A request payload is everything after the function code; the transport
//! prepends the MBAP header, unit id and function code. Response payloads
//! arrive the same way, function code already stripped.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::constants::{COIL_OFF, COIL_ON, MAX_PDU_SIZE};
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{AddressRange, ModbusFunction};

/// Fluent payload builder over a `BytesMut`
pub struct PduBuilder {
    buf: BytesMut,
}

impl Default for PduBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PduBuilder {
    #[inline]
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(16),
        }
    }

    /// Add a big-endian address
    #[inline]
    pub fn address(mut self, addr: u16) -> Self {
        self.buf.put_u16(addr);
        self
    }

    /// Add a big-endian quantity or value
    #[inline]
    pub fn word(mut self, value: u16) -> Self {
        self.buf.put_u16(value);
        self
    }

    #[inline]
    pub fn byte(mut self, b: u8) -> Self {
        self.buf.put_u8(b);
        self
    }

    #[inline]
    pub fn data(mut self, data: &[u8]) -> Self {
        self.buf.put_slice(data);
        self
    }

    /// Freeze the payload; fails if function code + payload exceed a PDU
    pub fn build(self) -> ModbusResult<Bytes> {
        if self.buf.len() + 1 > MAX_PDU_SIZE {
            return Err(ModbusError::validation(format!(
                "PDU would exceed max size: {} > {}",
                self.buf.len() + 1,
                MAX_PDU_SIZE
            )));
        }
        Ok(self.buf.freeze())
    }

    /// FC01-04 payload: start address + quantity
    pub fn read_request(range: AddressRange) -> ModbusResult<Bytes> {
        PduBuilder::new()
            .address(range.start())
            .word(range.count())
            .build()
    }

    /// FC05 payload
    pub fn write_single_coil(address: u16, value: bool) -> ModbusResult<Bytes> {
        PduBuilder::new()
            .address(address)
            .word(if value { COIL_ON } else { COIL_OFF })
            .build()
    }

    /// FC06 payload
    pub fn write_single_register(address: u16, value: u16) -> ModbusResult<Bytes> {
        PduBuilder::new().address(address).word(value).build()
    }

    /// FC15 payload: address, quantity, byte count, packed bits (LSB first)
    pub fn write_multiple_coils(address: u16, values: &[bool]) -> ModbusResult<Bytes> {
        let packed = pack_bits(values);
        let byte_count = u8::try_from(packed.len())
            .map_err(|_| ModbusError::validation(format!("{} coils do not fit one request", values.len())))?;
        PduBuilder::new()
            .address(address)
            .word(values.len() as u16)
            .byte(byte_count)
            .data(&packed)
            .build()
    }

    /// FC16 payload: address, quantity, byte count, big-endian registers
    pub fn write_multiple_registers(address: u16, values: &[u16]) -> ModbusResult<Bytes> {
        let byte_count = u8::try_from(values.len() * 2).map_err(|_| {
            ModbusError::validation(format!("{} registers do not fit one request", values.len()))
        })?;
        let mut builder = PduBuilder::new()
            .address(address)
            .word(values.len() as u16)
            .byte(byte_count);
        for &value in values {
            builder = builder.word(value);
        }
        builder.build()
    }
}

/// Pack coil states into bytes, first coil in bit 0
pub fn pack_bits(values: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; values.len().div_ceil(8)];
    for (i, &value) in values.iter().enumerate() {
        if value {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    packed
}

/// Split a length-prefixed read payload into its data bytes
fn counted_data(payload: &[u8]) -> ModbusResult<&[u8]> {
    let (&byte_count, rest) = payload
        .split_first()
        .ok_or_else(|| ModbusError::frame("Empty response data"))?;
    let byte_count = byte_count as usize;
    if rest.len() < byte_count {
        return Err(ModbusError::frame(format!(
            "Byte count {} but only {} data bytes",
            byte_count,
            rest.len()
        )));
    }
    Ok(&rest[..byte_count])
}

/// Decode an FC01/FC02 payload into exactly `count` bits
pub fn parse_bits(payload: &[u8], count: u16) -> ModbusResult<Vec<bool>> {
    let data = counted_data(payload)?;
    let count = count as usize;
    if data.len() * 8 < count {
        return Err(ModbusError::frame(format!(
            "Expected {} bits, response carries {}",
            count,
            data.len() * 8
        )));
    }
    Ok((0..count).map(|i| data[i / 8] & (1 << (i % 8)) != 0).collect())
}

/// Decode an FC03/FC04 payload into exactly `count` registers
pub fn parse_registers(payload: &[u8], count: u16) -> ModbusResult<Vec<u16>> {
    let data = counted_data(payload)?;
    if data.len() % 2 != 0 {
        return Err(ModbusError::frame("Odd register data length"));
    }
    if data.len() / 2 != count as usize {
        return Err(ModbusError::frame(format!(
            "Expected {} registers, response carries {}",
            count,
            data.len() / 2
        )));
    }
    Ok(data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Check the echo a server returns for a write.
///
/// FC05/FC06 echo address and value, FC15/FC16 echo address and quantity.
pub fn check_write_echo(
    function: ModbusFunction,
    payload: &[u8],
    address: u16,
    second: u16,
) -> ModbusResult<()> {
    if payload.len() < 4 {
        return Err(ModbusError::frame(format!(
            "{} echo too short: {} bytes",
            function,
            payload.len()
        )));
    }
    let echoed_address = u16::from_be_bytes([payload[0], payload[1]]);
    let echoed_second = u16::from_be_bytes([payload[2], payload[3]]);
    if echoed_address != address || echoed_second != second {
        debug!(
            "{} echo mismatch: sent ({}, {:#06X}), got ({}, {:#06X})",
            function, address, second, echoed_address, echoed_second
        );
        return Err(ModbusError::protocol(format!(
            "{} echo mismatch at address {}",
            function, address
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_request() {
        let range = AddressRange::new(0x006B, 3).unwrap();
        let payload = PduBuilder::read_request(range).unwrap();
        assert_eq!(payload.as_ref(), &[0x00, 0x6B, 0x00, 0x03]);
    }

    #[test]
    fn test_write_single_coil() {
        let payload = PduBuilder::write_single_coil(0x00AC, true).unwrap();
        assert_eq!(payload.as_ref(), &[0x00, 0xAC, 0xFF, 0x00]);
        let payload = PduBuilder::write_single_coil(0x00AC, false).unwrap();
        assert_eq!(payload.as_ref(), &[0x00, 0xAC, 0x00, 0x00]);
    }

    #[test]
    fn test_write_multiple_registers() {
        let payload = PduBuilder::write_multiple_registers(0x0001, &[0x000A, 0x0102]).unwrap();
        assert_eq!(
            payload.as_ref(),
            &[0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]
        );
    }

    #[test]
    fn test_write_multiple_coils() {
        // 10 coils: 1,0,1,1,0,0,1,1 | 1,0 -> 0xCD 0x01
        let coils = [true, false, true, true, false, false, true, true, true, false];
        let payload = PduBuilder::write_multiple_coils(0x0013, &coils).unwrap();
        assert_eq!(payload.as_ref(), &[0x00, 0x13, 0x00, 0x0A, 0x02, 0xCD, 0x01]);
    }

    #[test]
    fn test_oversized_write_rejected() {
        let values = vec![0u16; 200];
        assert!(matches!(
            PduBuilder::write_multiple_registers(0, &values),
            Err(ModbusError::Validation { .. })
        ));
    }

    #[test]
    fn test_parse_bits() {
        let bits = parse_bits(&[0x02, 0xCD, 0x01], 10).unwrap();
        assert_eq!(
            bits,
            vec![true, false, true, true, false, false, true, true, true, false]
        );
        assert!(parse_bits(&[0x01, 0xFF], 9).is_err());
        assert!(parse_bits(&[], 1).is_err());
    }

    #[test]
    fn test_parse_registers() {
        let regs = parse_registers(&[0x04, 0x12, 0x34, 0xAB, 0xCD], 2).unwrap();
        assert_eq!(regs, vec![0x1234, 0xABCD]);
        // Short response is a frame error, never a shorter vector
        assert!(parse_registers(&[0x02, 0x12, 0x34], 2).is_err());
        assert!(parse_registers(&[0x04, 0x12, 0x34], 2).is_err());
    }

    #[test]
    fn test_write_echo() {
        let echo = [0x00, 0x01, 0x00, 0x03];
        assert!(check_write_echo(ModbusFunction::WriteSingleRegister, &echo, 1, 3).is_ok());
        assert!(check_write_echo(ModbusFunction::WriteSingleRegister, &echo, 1, 4).is_err());
        assert!(check_write_echo(ModbusFunction::WriteSingleRegister, &echo[..2], 1, 3).is_err());
    }
}
