//! Modbus/TCP wire constants and engine defaults
//!
//! Frame sizes and function codes follow Modbus Application Protocol
//! v1.1b3. The probe frame bytes are the fixed liveness probe used by
//! unit reconnaissance and are not a standard request.

use std::time::Duration;

// ============================================================================
// Frame Size Constants
// ============================================================================

/// MBAP prefix length: Transaction ID(2) + Protocol ID(2) + Length(2)
///
/// The unit id byte that completes the 7-byte MBAP header is counted by the
/// length field, so it is not part of this prefix.
pub const MBAP_HEADER_LEN: usize = 6;

/// Maximum PDU (function code + data) size
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum MBAP length field value (Unit ID + PDU)
pub const MAX_MBAP_LENGTH: usize = 1 + MAX_PDU_SIZE;

/// Modbus protocol identifier carried in every MBAP header
pub const MODBUS_PROTOCOL_ID: u16 = 0x0000;

/// Highest addressable coil/register
pub const MAX_ADDRESS: u16 = u16::MAX;

/// Number of distinct register addresses (0..=65535)
pub const ADDRESS_SPACE_SIZE: u32 = MAX_ADDRESS as u32 + 1;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Coils (FC01)
pub const FC_READ_COILS: u8 = 0x01;

/// Read Discrete Inputs (FC02)
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Write Single Coil (FC05)
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Write Multiple Coils (FC15)
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

/// FC05 payload for ON
pub const COIL_ON: u16 = 0xFF00;

/// FC05 payload for OFF
pub const COIL_OFF: u16 = 0x0000;

// ============================================================================
// Modbus Exception Codes
// ============================================================================

/// Illegal Function
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;

/// Illegal Data Address
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;

/// Illegal Data Value
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

/// Server Device Failure
pub const EXCEPTION_SERVER_DEVICE_FAILURE: u8 = 0x04;

/// Acknowledge
pub const EXCEPTION_ACKNOWLEDGE: u8 = 0x05;

/// Server Device Busy
pub const EXCEPTION_SERVER_DEVICE_BUSY: u8 = 0x06;

/// Memory Parity Error
pub const EXCEPTION_MEMORY_PARITY_ERROR: u8 = 0x08;

/// Gateway Path Unavailable
pub const EXCEPTION_GATEWAY_PATH_UNAVAILABLE: u8 = 0x0A;

/// Gateway Target Device Failed to Respond
pub const EXCEPTION_GATEWAY_TARGET_FAILED: u8 = 0x0B;

// ============================================================================
// Unit Identifiers
// ============================================================================

/// Lowest unit id the engine will address
pub const MIN_UNIT_ID: u8 = 1;

/// Highest unit id the engine will address
pub const MAX_UNIT_ID: u8 = 254;

/// Unit id a fresh session starts on
pub const DEFAULT_UNIT_ID: u8 = 1;

// ============================================================================
// Reconnaissance Probe Frame
// ============================================================================

/// Fixed prefix of the probe frame (transaction id, protocol id, length)
pub const PROBE_PREFIX: [u8; 6] = [0x21, 0x00, 0x00, 0x00, 0x00, 0x06];

/// Fixed trailing bytes after the unit id
pub const PROBE_TRAILER: [u8; 5] = [0x04, 0x00, 0x01, 0x00, 0x00];

/// Total probe frame length
pub const PROBE_FRAME_LEN: usize = PROBE_PREFIX.len() + 1 + PROBE_TRAILER.len();

/// Bytes read back for a probe
pub const PROBE_REPLY_LEN: usize = 12;

/// Reply prefix that marks a unit as active
pub const PROBE_ACTIVE_PREFIX: [u8; 4] = [0x21, 0x00, 0x00, 0x00];

// ============================================================================
// Engine Defaults
// ============================================================================

/// Default Modbus/TCP port
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total attempts for a read before it degrades to unknown values
pub const DEFAULT_READ_ATTEMPTS: u32 = 2;

/// Pause between read attempts
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_millis(100);

/// Concurrent probes / enumeration workers
pub const DEFAULT_WORKERS: usize = 20;

/// Per-probe connect/send/receive bound
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Points read per data space in a banner
pub const DEFAULT_BANNER_COUNT: u16 = 10;

/// Holding registers decoded as banner text
pub const DEFAULT_TEXT_REGISTERS: u16 = 10;

/// Points read when dumping a whole data space
pub const DUMP_COUNT: u16 = 100;

/// Coils toggled by chaos mode
pub const CHAOS_COIL_COUNT: u16 = 100;

/// Pacing between stress writes
pub const DEFAULT_WRITE_DELAY: Duration = Duration::from_millis(100);

/// Pacing between crash-system writes
pub const DEFAULT_CRASH_DELAY: Duration = Duration::from_millis(10);
