//! # Modbus/TCP Transport
//!
//! One TCP connection, MBAP framing, request/response exchange and raw byte
//! access for hand-built frames.
//!
//! ```text
//! +----------------+-------------+--------------+---------+-----+----------+
//! | transaction id | protocol id | length       | unit id | FC  | payload  |
//! | 2 bytes        | 2 bytes (0) | 2 bytes      | 1 byte  | 1 B | N bytes  |
//! +----------------+-------------+--------------+---------+-----+----------+
//!                                  counts unit id + FC + payload
//! ```
//!
//! The transport never reconnects on its own. After a socket failure the
//! connection is dropped and every further request fails with
//! [`ModbusError::Connection`] until the owner calls [`TcpTransport::reconnect`].
//! A timed-out exchange keeps the socket; stale bytes are discarded before
//! the next request and late replies are rejected by transaction id.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use sploitbus::transport::{ModbusTransport, TcpTransport};
//! use sploitbus::protocol::ModbusFunction;
//!
//! # async fn example() -> sploitbus::ModbusResult<()> {
//! let mut transport = TcpTransport::connect("127.0.0.1:502".parse().unwrap(), Duration::from_secs(5)).await?;
//! // Read two holding registers from address 0 on unit 1
//! let payload = transport
//!     .request(1, ModbusFunction::ReadHoldingRegisters, &[0x00, 0x00, 0x00, 0x02])
//!     .await?;
//! println!("byte count {}", payload[0]);
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::constants::{EXCEPTION_FLAG, MAX_MBAP_LENGTH, MBAP_HEADER_LEN, MODBUS_PROTOCOL_ID};
use crate::error::{ModbusError, ModbusResult};
use crate::logging::log_packet;
use crate::protocol::{ModbusException, ModbusFunction};

/// Request/response exchange over some Modbus carrier.
///
/// `payload` is the PDU data after the function code; the returned bytes are
/// the response PDU data after the function code. Exception responses come
/// back as [`ModbusError::Exception`].
pub trait ModbusTransport: Send + Sync {
    fn request(
        &mut self,
        unit_id: u8,
        function: ModbusFunction,
        payload: &[u8],
    ) -> impl Future<Output = ModbusResult<Bytes>> + Send;

    /// Whether the transport still holds a usable connection
    fn is_connected(&self) -> bool;

    /// Release the connection. Calling it again is a no-op.
    fn close(&mut self) -> impl Future<Output = ModbusResult<()>> + Send;

    fn get_stats(&self) -> TransportStats;
}

/// Transport layer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// A decoded Modbus/TCP response frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MbapFrame {
    pub transaction_id: u16,
    pub unit_id: u8,
    pub function_code: u8,
    pub payload: Bytes,
}

impl MbapFrame {
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code & EXCEPTION_FLAG != 0
    }
}

/// Serialize one request into an MBAP frame
pub fn encode_frame(
    transaction_id: u16,
    unit_id: u8,
    function: ModbusFunction,
    payload: &[u8],
) -> ModbusResult<Bytes> {
    // unit id + function code + payload
    let length = 2 + payload.len();
    if length > MAX_MBAP_LENGTH {
        return Err(ModbusError::validation(format!(
            "frame length {} exceeds {}",
            length, MAX_MBAP_LENGTH
        )));
    }

    let mut frame = BytesMut::with_capacity(MBAP_HEADER_LEN + length);
    frame.put_u16(transaction_id);
    frame.put_u16(MODBUS_PROTOCOL_ID);
    frame.put_u16(length as u16);
    frame.put_u8(unit_id);
    frame.put_u8(function.to_u8());
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Parse a complete MBAP frame
pub fn decode_frame(frame: &[u8]) -> ModbusResult<MbapFrame> {
    if frame.len() < MBAP_HEADER_LEN + 2 {
        return Err(ModbusError::frame(format!(
            "Frame too short: {} bytes",
            frame.len()
        )));
    }

    let transaction_id = u16::from_be_bytes([frame[0], frame[1]]);
    let protocol_id = u16::from_be_bytes([frame[2], frame[3]]);
    let length = u16::from_be_bytes([frame[4], frame[5]]) as usize;

    if protocol_id != MODBUS_PROTOCOL_ID {
        return Err(ModbusError::frame(format!(
            "Unexpected protocol id 0x{:04X}",
            protocol_id
        )));
    }
    if !(2..=MAX_MBAP_LENGTH).contains(&length) {
        return Err(ModbusError::frame(format!("Invalid MBAP length {}", length)));
    }
    if frame.len() != MBAP_HEADER_LEN + length {
        return Err(ModbusError::frame(format!(
            "MBAP length {} but frame carries {} bytes",
            length,
            frame.len() - MBAP_HEADER_LEN
        )));
    }

    Ok(MbapFrame {
        transaction_id,
        unit_id: frame[6],
        function_code: frame[7],
        payload: Bytes::copy_from_slice(&frame[MBAP_HEADER_LEN + 2..]),
    })
}

/// Check a decoded response against the request it answers
pub fn check_response(
    frame: MbapFrame,
    transaction_id: u16,
    unit_id: u8,
    function: ModbusFunction,
) -> ModbusResult<Bytes> {
    if frame.transaction_id != transaction_id {
        return Err(ModbusError::frame(format!(
            "Transaction id mismatch: sent {}, got {}",
            transaction_id, frame.transaction_id
        )));
    }
    if frame.unit_id != unit_id {
        return Err(ModbusError::protocol(format!(
            "Unit id mismatch: sent {}, got {}",
            unit_id, frame.unit_id
        )));
    }

    if frame.is_exception() {
        let code = frame.payload.first().copied().unwrap_or(0);
        match ModbusException::from_u8(code) {
            Some(exc) => debug!("{} answered with {}", function, exc),
            None => debug!("{} answered with unknown exception 0x{:02X}", function, code),
        }
        return Err(ModbusError::exception(function.to_u8(), code));
    }

    if frame.function_code != function.to_u8() {
        return Err(ModbusError::protocol(format!(
            "Function mismatch: sent 0x{:02X}, got 0x{:02X}",
            function.to_u8(),
            frame.function_code
        )));
    }

    Ok(frame.payload)
}

/// Modbus/TCP transport over a single `TcpStream`
pub struct TcpTransport {
    stream: Option<TcpStream>,
    pub address: SocketAddr,
    timeout: Duration,
    transaction_id: u16,
    stats: TransportStats,
    packet_logging: bool,
}

impl TcpTransport {
    /// Open a connection to `address`, bounded by `timeout`
    pub async fn connect(address: SocketAddr, timeout: Duration) -> ModbusResult<Self> {
        let stream = open_stream(address, timeout).await?;
        debug!("Connected to {}", address);
        Ok(Self {
            stream: Some(stream),
            address,
            timeout,
            transaction_id: 0,
            stats: TransportStats::default(),
            packet_logging: false,
        })
    }

    /// Resolve `host:port` and connect to the first address that answers
    pub async fn from_address(addr: &str, timeout: Duration) -> ModbusResult<Self> {
        let candidates: Vec<SocketAddr> = lookup_host(addr)
            .await
            .map_err(|e| ModbusError::configuration(format!("Invalid address {}: {}", addr, e)))?
            .collect();

        let mut last_err = ModbusError::configuration(format!("{} resolved to nothing", addr));
        for candidate in candidates {
            match Self::connect(candidate, timeout).await {
                Ok(transport) => return Ok(transport),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.packet_logging = enabled;
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Drop the current socket and open a fresh one to the same address
    pub async fn reconnect(&mut self) -> ModbusResult<()> {
        self.close_stream().await;
        self.stream = Some(open_stream(self.address, self.timeout).await?);
        debug!("Reconnected to {}", self.address);
        Ok(())
    }

    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    fn stream_mut(&mut self) -> ModbusResult<&mut TcpStream> {
        let address = self.address;
        self.stream
            .as_mut()
            .ok_or_else(|| ModbusError::connection(format!("Not connected to {}", address)))
    }

    /// Record a failed exchange; socket errors kill the connection
    fn fail(&mut self, err: ModbusError) -> ModbusError {
        self.stats.errors += 1;
        match err {
            ModbusError::Timeout { .. } => self.stats.timeouts += 1,
            ModbusError::Transport { .. } | ModbusError::Connection { .. } => {
                warn!("Dropping connection to {}: {}", self.address, err);
                self.stream = None;
            }
            _ => {}
        }
        err
    }

    /// Throw away bytes left over from an exchange that timed out
    fn discard_stale(&mut self) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        let mut scratch = [0u8; 256];
        let mut discarded = 0usize;
        loop {
            match stream.try_read(&mut scratch) {
                Ok(0) => break,
                Ok(n) => discarded += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
        if discarded > 0 {
            debug!("Discarded {} stale bytes from {}", discarded, self.address);
        }
    }

    /// Write raw bytes to the socket
    pub async fn send_raw(&mut self, frame: &[u8]) -> ModbusResult<()> {
        self.send_frame(frame, None).await
    }

    /// A send that times out may have left half a frame on the wire, so the
    /// stream is dropped rather than reused.
    async fn send_frame(&mut self, frame: &[u8], unit_id: Option<u8>) -> ModbusResult<()> {
        let limit = self.timeout;
        let limit_ms = self.timeout_ms();
        let packet_logging = self.packet_logging;
        let stream = self.stream_mut()?;

        let result = match timeout(limit, stream.write_all(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ModbusError::transport(format!("send failed: {}", e))),
            Err(_) => Err(ModbusError::timeout("send request", limit_ms)),
        };

        match result {
            Ok(()) => {
                self.stats.requests_sent += 1;
                self.stats.bytes_sent += frame.len() as u64;
                if packet_logging {
                    log_packet("send", frame, unit_id);
                }
                Ok(())
            }
            Err(e @ ModbusError::Timeout { .. }) => {
                let err = self.fail(e);
                warn!("Dropping connection to {} after partial send", self.address);
                self.stream = None;
                Err(err)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// One bounded read of at most `max_len` bytes.
    ///
    /// An empty vector means the peer closed the connection without sending.
    pub async fn recv_raw(&mut self, max_len: usize) -> ModbusResult<Vec<u8>> {
        let limit = self.timeout;
        let limit_ms = self.timeout_ms();
        let packet_logging = self.packet_logging;
        let stream = self.stream_mut()?;

        let mut buf = vec![0u8; max_len];
        let result = match timeout(limit, stream.read(&mut buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(ModbusError::transport(format!("receive failed: {}", e))),
            Err(_) => Err(ModbusError::timeout("receive", limit_ms)),
        };

        match result {
            Ok(n) => {
                buf.truncate(n);
                self.stats.bytes_received += n as u64;
                if n > 0 {
                    self.stats.responses_received += 1;
                    if packet_logging {
                        log_packet("receive", &buf, None);
                    }
                }
                Ok(buf)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Read exactly one MBAP frame
    async fn read_frame(&mut self) -> ModbusResult<Vec<u8>> {
        let limit = self.timeout;
        let limit_ms = self.timeout_ms();
        let stream = self.stream_mut()?;

        let mut header = [0u8; MBAP_HEADER_LEN];
        match timeout(limit, stream.read_exact(&mut header)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(ModbusError::transport(format!(
                    "read response header: {}",
                    e
                )))
            }
            Err(_) => return Err(ModbusError::timeout("read response header", limit_ms)),
        }

        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        if !(2..=MAX_MBAP_LENGTH).contains(&length) {
            // Resynchronising inside a corrupt stream is not possible
            return Err(ModbusError::transport(format!(
                "Invalid MBAP length {} in response",
                length
            )));
        }

        let mut frame = vec![0u8; MBAP_HEADER_LEN + length];
        frame[..MBAP_HEADER_LEN].copy_from_slice(&header);
        match timeout(limit, stream.read_exact(&mut frame[MBAP_HEADER_LEN..])).await {
            Ok(Ok(_)) => Ok(frame),
            Ok(Err(e)) => Err(ModbusError::transport(format!("read response data: {}", e))),
            Err(_) => Err(ModbusError::timeout("read response data", limit_ms)),
        }
    }

    async fn close_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }
}

impl ModbusTransport for TcpTransport {
    async fn request(
        &mut self,
        unit_id: u8,
        function: ModbusFunction,
        payload: &[u8],
    ) -> ModbusResult<Bytes> {
        self.stream_mut()?;
        self.discard_stale();

        let transaction_id = self.next_transaction_id();
        let frame = encode_frame(transaction_id, unit_id, function, payload)?;
        debug!(
            "tx={} unit={} {} payload_len={}",
            transaction_id,
            unit_id,
            function,
            payload.len()
        );
        self.send_frame(&frame, Some(unit_id)).await?;

        let raw = match self.read_frame().await {
            Ok(raw) => raw,
            Err(e) => return Err(self.fail(e)),
        };
        self.stats.responses_received += 1;
        self.stats.bytes_received += raw.len() as u64;
        if self.packet_logging {
            log_packet("receive", &raw, Some(unit_id));
        }

        match decode_frame(&raw).and_then(|f| check_response(f, transaction_id, unit_id, function)) {
            Ok(payload) => Ok(payload),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) -> ModbusResult<()> {
        self.close_stream().await;
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

async fn open_stream(address: SocketAddr, limit: Duration) -> ModbusResult<TcpStream> {
    match timeout(limit, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => {
            let _ = stream.set_nodelay(true);
            Ok(stream)
        }
        Ok(Err(e)) => Err(ModbusError::connection(format!(
            "Failed to connect to {}: {}",
            address, e
        ))),
        Err(_) => Err(ModbusError::connection(format!(
            "Connecting to {} timed out after {}ms",
            address,
            limit.as_millis()
        ))),
    }
}
