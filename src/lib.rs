//! # Sploitbus - Modbus/TCP Diagnostic Engine
//!
//! Client-side engine for poking at Modbus/TCP equipment: typed register and
//! coil access with retry, write-then-verify, unit-id reconnaissance over a
//! bounded worker pool, per-unit banner enumeration, paced stress writes and
//! reverse DNS of the target.
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Used by |
//! |------|----------|---------|
//! | 0x01 | Read Coils | access, banner |
//! | 0x02 | Read Discrete Inputs | access, banner |
//! | 0x03 | Read Holding Registers | access, banner, verify |
//! | 0x04 | Read Input Registers | access, banner |
//! | 0x05 | Write Single Coil | access, chaos |
//! | 0x06 | Write Single Register | access, stress |
//! | 0x0F | Write Multiple Coils | access |
//! | 0x10 | Write Multiple Registers | access |
//!
//! Reconnaissance sends its own fixed probe frame on a fresh connection per
//! unit id; see [`recon`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sploitbus::{AddressRange, ModbusResult, ReconConfig, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let mut session = Session::connect("127.0.0.1:502", SessionConfig::default()).await?;
//!
//!     // Failed reads come back as unknown values, never as errors
//!     let regs = session.read_holding_registers(AddressRange::new(0, 10)?).await;
//!     println!("holding: {:?}", regs.readings());
//!
//!     let outcome = session.write_register_verified(100, 0x1234).await?;
//!     println!("verified: {}", outcome.passed);
//!
//!     let target = session.transport().address;
//!     let probes = sploitbus::recon::scan_all(target, ReconConfig::default()).await;
//!     println!("active: {:?}", sploitbus::recon::active_units(&probes));
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Error types and result handling
pub mod error;

/// Protocol constants, probe bytes and engine defaults
pub mod constants;

/// Function codes, unit ids, data spaces and address ranges
pub mod protocol;

/// PDU payload building and response parsing
pub mod pdu;

/// MBAP framing and the TCP transport
pub mod transport;

/// Builder-style engine settings
pub mod config;

/// Subscriber setup and packet hex dumps
pub mod logging;

// ============================================================================
// Engine
// ============================================================================

/// Connection context holding the current unit id
pub mod session;

/// Typed reads with retry and single-attempt writes
pub mod access;

/// Write followed by readback comparison
pub mod verify;

/// Concurrent unit-id probing
pub mod recon;

/// Banner capture and per-unit enumeration
pub mod enumerate;

/// Paced bulk-write routines
pub mod stress;

/// Reverse DNS of the target host
pub mod network;

#[cfg(test)]
mod test_support;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use tokio;

// === Session and results ===
pub use access::{ReadResult, Reading, SpaceReadings};
pub use enumerate::{enumerate_units, BannerSnapshot};
pub use network::{network_details, HostDetails};
pub use recon::{ProbeResult, ProbeStatus};
pub use session::{Session, SharedSession};
pub use stress::{StressReport, WriteFailure};
pub use verify::VerificationOutcome;

// === Error handling ===
pub use error::{ModbusError, ModbusResult};

// === Core types ===
pub use protocol::{AddressRange, DataSpace, ModbusFunction, UnitId};

// === Configuration ===
pub use config::{
    BannerConfig, CrashUnitPolicy, ReconConfig, RetryPolicy, SessionConfig, StressConfig,
};

// === Transport ===
pub use transport::{ModbusTransport, TcpTransport, TransportStats};

pub use constants::{DEFAULT_TCP_PORT, DUMP_COUNT, MAX_UNIT_ID, MIN_UNIT_ID};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name and version
pub fn info() -> String {
    format!("Sploitbus v{} - Modbus/TCP diagnostic engine", VERSION)
}
