//! Logging helpers
//!
//! The library only emits `tracing` events. Binaries call [`init`] once to
//! install a subscriber; `RUST_LOG` takes precedence over the level passed in.

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ModbusError, ModbusResult};

/// Install a fmt subscriber filtered at `level`
pub fn init(level: &str) -> ModbusResult<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| ModbusError::configuration(format!("logging already initialised: {}", e)))
}

/// Format raw bytes as space-separated hex
pub fn format_hex_packet(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Log one frame with its direction
pub fn log_packet(direction: &str, data: &[u8], unit_id: Option<u8>) {
    let hex_string = format_hex_packet(data);
    match unit_id {
        Some(id) => info!("[MODBUS-TCP] {} unit:{} {}", direction, id, hex_string),
        None => info!("[MODBUS-TCP] {} {}", direction, hex_string),
    }
}
