//! Mock Modbus/TCP server for integration tests.
//!
//! Serves several unit ids behind one listener. Every known unit starts
//! tagged: registers 0..100 hold the unit id, coils 0..100 are set on odd
//! units and discrete inputs 0..100 on even ones. A request addressed to an
//! unknown unit makes the server hang up without answering, the way a
//! gateway with no such target behaves.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const MAX_READ_BITS: u16 = 2000;
const MAX_READ_REGISTERS: u16 = 125;

/// How the server answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Answer every request correctly
    Normal,
    /// Hold every answer back this long
    Delay(Duration),
    /// Answer every request with this exception code
    Exception(u8),
    /// Send text instead of a frame, then hang up
    Garbage,
}

#[derive(Debug, Default, Clone)]
pub struct UnitStorage {
    pub coils: HashMap<u16, bool>,
    pub discrete_inputs: HashMap<u16, bool>,
    pub holding: HashMap<u16, u16>,
    pub input: HashMap<u16, u16>,
}

impl UnitStorage {
    fn tagged(unit: u8) -> Self {
        let mut storage = Self::default();
        for addr in 0..100u16 {
            storage.holding.insert(addr, u16::from(unit));
            storage.input.insert(addr, u16::from(unit));
            storage.coils.insert(addr, unit % 2 == 1);
            storage.discrete_inputs.insert(addr, unit % 2 == 0);
        }
        storage
    }
}

struct ServerState {
    units: Mutex<HashMap<u8, UnitStorage>>,
    behavior: Mutex<MockBehavior>,
    requests: AtomicU64,
    connections: AtomicU64,
}

pub struct MockModbusServer {
    local_addr: SocketAddr,
    state: Arc<ServerState>,
    handle: JoinHandle<()>,
}

impl MockModbusServer {
    pub async fn start(units: &[u8]) -> Self {
        Self::start_with(units, MockBehavior::Normal).await
    }

    pub async fn start_with(units: &[u8], behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
        let local_addr = listener.local_addr().expect("mock server address");
        let state = Arc::new(ServerState {
            units: Mutex::new(units.iter().map(|&u| (u, UnitStorage::tagged(u))).collect()),
            behavior: Mutex::new(behavior),
            requests: AtomicU64::new(0),
            connections: AtomicU64::new(0),
        });

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(socket, accept_state.clone()));
            }
        });

        Self {
            local_addr,
            state,
            handle,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn address(&self) -> String {
        self.local_addr.to_string()
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.state.behavior.lock().unwrap() = behavior;
    }

    pub fn holding(&self, unit: u8, addr: u16) -> Option<u16> {
        self.state.units.lock().unwrap().get(&unit)?.holding.get(&addr).copied()
    }

    pub fn coil(&self, unit: u8, addr: u16) -> Option<bool> {
        self.state.units.lock().unwrap().get(&unit)?.coils.get(&addr).copied()
    }

    pub fn set_holding(&self, unit: u8, addr: u16, value: u16) {
        if let Some(storage) = self.state.units.lock().unwrap().get_mut(&unit) {
            storage.holding.insert(addr, value);
        }
    }

    pub fn request_count(&self) -> u64 {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub fn connection_count(&self) -> u64 {
        self.state.connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockModbusServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut socket: TcpStream, state: Arc<ServerState>) {
    loop {
        let mut header = [0u8; 7];
        if socket.read_exact(&mut header).await.is_err() {
            return;
        }
        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        if length < 2 {
            return;
        }
        let mut pdu = vec![0u8; length - 1];
        if socket.read_exact(&mut pdu).await.is_err() {
            return;
        }
        state.requests.fetch_add(1, Ordering::SeqCst);

        let behavior = *state.behavior.lock().unwrap();
        match behavior {
            MockBehavior::Garbage => {
                let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
                return;
            }
            MockBehavior::Delay(delay) => tokio::time::sleep(delay).await,
            _ => {}
        }

        let unit = header[6];
        let Some(response) = handle(&state, unit, &pdu, behavior) else {
            return;
        };

        let mut frame = Vec::with_capacity(7 + response.len());
        frame.extend_from_slice(&header[..4]);
        frame.extend_from_slice(&((response.len() + 1) as u16).to_be_bytes());
        frame.push(unit);
        frame.extend_from_slice(&response);
        if socket.write_all(&frame).await.is_err() {
            return;
        }
    }
}

fn exception(function: u8, code: u8) -> Vec<u8> {
    vec![function | 0x80, code]
}

/// Response PDU, or `None` to hang up
fn handle(state: &ServerState, unit: u8, pdu: &[u8], behavior: MockBehavior) -> Option<Vec<u8>> {
    let mut units = state.units.lock().unwrap();
    let storage = units.get_mut(&unit)?;
    let function = pdu[0];

    if let MockBehavior::Exception(code) = behavior {
        return Some(exception(function, code));
    }
    if pdu.len() < 5 {
        return Some(exception(function, 0x03));
    }
    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
    let second = u16::from_be_bytes([pdu[3], pdu[4]]);
    let span = |count: u16| (0..count).map(move |i| address.wrapping_add(i));

    let response = match function {
        0x01 | 0x02 => {
            if second == 0 || second > MAX_READ_BITS {
                return Some(exception(function, 0x03));
            }
            let map = if function == 0x01 {
                &storage.coils
            } else {
                &storage.discrete_inputs
            };
            let mut packed = vec![0u8; (second as usize + 7) / 8];
            for (i, addr) in span(second).enumerate() {
                if map.get(&addr).copied().unwrap_or(false) {
                    packed[i / 8] |= 1 << (i % 8);
                }
            }
            let mut out = vec![function, packed.len() as u8];
            out.extend_from_slice(&packed);
            out
        }
        0x03 | 0x04 => {
            if second == 0 || second > MAX_READ_REGISTERS {
                return Some(exception(function, 0x03));
            }
            let map = if function == 0x03 {
                &storage.holding
            } else {
                &storage.input
            };
            let mut out = vec![function, (second * 2) as u8];
            for addr in span(second) {
                out.extend_from_slice(&map.get(&addr).copied().unwrap_or(0).to_be_bytes());
            }
            out
        }
        0x05 => {
            let value = match second {
                0xFF00 => true,
                0x0000 => false,
                _ => return Some(exception(function, 0x03)),
            };
            storage.coils.insert(address, value);
            pdu[..5].to_vec()
        }
        0x06 => {
            storage.holding.insert(address, second);
            pdu[..5].to_vec()
        }
        0x0F => {
            let data = pdu.get(6..)?;
            for (i, addr) in span(second).enumerate() {
                let bit = data.get(i / 8).copied().unwrap_or(0) & (1 << (i % 8)) != 0;
                storage.coils.insert(addr, bit);
            }
            pdu[..5].to_vec()
        }
        0x10 => {
            let data = pdu.get(6..)?;
            for (addr, pair) in span(second).zip(data.chunks_exact(2)) {
                storage.holding.insert(addr, u16::from_be_bytes([pair[0], pair[1]]));
            }
            pdu[..5].to_vec()
        }
        _ => exception(function, 0x01),
    };
    Some(response)
}
