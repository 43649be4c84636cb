//! Session: one transport plus the current unit id
//!
//! The current unit id is the only mutable context the engine carries. Every
//! access call reads it from the session it runs on; nothing is global.
//! Concurrent users share a session through [`SharedSession`] and must hold
//! the lock across "switch unit, then read" so one unit's data is never
//! attributed to another.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{RetryPolicy, SessionConfig};
use crate::error::ModbusResult;
use crate::protocol::{ModbusFunction, UnitId};
use crate::transport::{ModbusTransport, TcpTransport, TransportStats};

/// A session shared between workers
pub type SharedSession<T = TcpTransport> = Arc<Mutex<Session<T>>>;

/// Long-lived connection context
pub struct Session<T: ModbusTransport = TcpTransport> {
    transport: T,
    unit_id: UnitId,
    retry: RetryPolicy,
}

impl Session<TcpTransport> {
    /// Connect to `host:port` and start on the default unit id
    pub async fn connect(addr: &str, config: SessionConfig) -> ModbusResult<Self> {
        let mut transport = TcpTransport::from_address(addr, config.timeout).await?;
        transport.set_packet_logging(config.packet_logging);
        Ok(Self::new(transport, config.retry))
    }

    /// Replace a dead connection with a fresh one; the unit id is kept
    pub async fn reconnect(&mut self) -> ModbusResult<()> {
        self.transport.reconnect().await
    }
}

impl<T: ModbusTransport> Session<T> {
    pub fn new(transport: T, retry: RetryPolicy) -> Self {
        Self {
            transport,
            unit_id: UnitId::default(),
            retry,
        }
    }

    #[inline]
    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    /// Switch the unit later calls are addressed to (1..=254)
    pub fn set_unit_id(&mut self, id: u8) -> ModbusResult<()> {
        self.set_unit(UnitId::new(id)?);
        Ok(())
    }

    pub fn set_unit(&mut self, unit: UnitId) {
        if unit != self.unit_id {
            debug!("Unit id {} -> {}", self.unit_id, unit);
        }
        self.unit_id = unit;
    }

    #[inline]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn set_retry_policy(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn stats(&self) -> TransportStats {
        self.transport.get_stats()
    }

    /// Release the connection; safe to call more than once
    pub async fn close(&mut self) -> ModbusResult<()> {
        self.transport.close().await
    }

    pub fn into_shared(self) -> SharedSession<T> {
        Arc::new(Mutex::new(self))
    }

    /// One request on an explicit unit, no retry
    pub(crate) async fn execute(
        &mut self,
        unit: UnitId,
        function: ModbusFunction,
        payload: &[u8],
    ) -> ModbusResult<Bytes> {
        self.transport.request(unit.get(), function, payload).await
    }
}
