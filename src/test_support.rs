//! In-memory multi-unit device used by unit tests

use std::collections::{HashMap, HashSet};

use bytes::Bytes;

use crate::constants::{COIL_ON, EXCEPTION_GATEWAY_TARGET_FAILED, EXCEPTION_ILLEGAL_FUNCTION};
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::pack_bits;
use crate::protocol::{DataSpace, ModbusFunction};
use crate::transport::{ModbusTransport, TransportStats};

#[derive(Debug, Default, Clone)]
pub(crate) struct Bank {
    pub coils: HashMap<u16, bool>,
    pub discrete_inputs: HashMap<u16, bool>,
    pub holding: HashMap<u16, u16>,
    pub input: HashMap<u16, u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Recorded {
    pub unit: u8,
    pub function: ModbusFunction,
    pub address: u16,
}

/// Simulated Modbus device with one bank per unit id and fault injection
#[derive(Debug, Default)]
pub(crate) struct SimulatedDevice {
    banks: HashMap<u8, Bank>,
    connected: bool,
    requests: Vec<Recorded>,
    read_failures: u32,
    failing_writes: HashSet<u16>,
    unsupported: HashSet<DataSpace>,
    drop_writes: bool,
    stats: TransportStats,
}

impl SimulatedDevice {
    pub fn new(units: &[u8]) -> Self {
        Self {
            banks: units.iter().map(|&u| (u, Bank::default())).collect(),
            connected: true,
            ..Default::default()
        }
    }

    /// Every unit's registers 0..100 hold its own id; coils mirror id parity
    pub fn tagged(units: &[u8]) -> Self {
        let mut device = Self::new(units);
        for (&unit, bank) in device.banks.iter_mut() {
            for addr in 0..100u16 {
                bank.holding.insert(addr, u16::from(unit));
                bank.input.insert(addr, u16::from(unit));
                bank.coils.insert(addr, unit % 2 == 1);
                bank.discrete_inputs.insert(addr, unit % 2 == 0);
            }
        }
        device
    }

    pub fn bank_mut(&mut self, unit: u8) -> &mut Bank {
        self.banks.entry(unit).or_default()
    }

    pub fn holding(&self, unit: u8, addr: u16) -> Option<u16> {
        self.banks.get(&unit)?.holding.get(&addr).copied()
    }

    pub fn coil(&self, unit: u8, addr: u16) -> Option<bool> {
        self.banks.get(&unit)?.coils.get(&addr).copied()
    }

    /// The next `n` reads time out
    pub fn fail_next_reads(&mut self, n: u32) {
        self.read_failures = n;
    }

    /// Writes touching `addr` fail at the socket level
    pub fn fail_writes_at(&mut self, addr: u16) {
        self.failing_writes.insert(addr);
    }

    /// Reads of `space` answer with Illegal Function
    pub fn mark_unsupported(&mut self, space: DataSpace) {
        self.unsupported.insert(space);
    }

    /// Acknowledge writes without applying them
    pub fn drop_writes(&mut self) {
        self.drop_writes = true;
    }

    pub fn requests(&self) -> &[Recorded] {
        &self.requests
    }

    fn handle(&mut self, unit: u8, function: ModbusFunction, payload: &[u8]) -> ModbusResult<Bytes> {
        if payload.len() < 4 {
            return Err(ModbusError::exception(function.to_u8(), 0x03));
        }
        let address = u16::from_be_bytes([payload[0], payload[1]]);
        let second = u16::from_be_bytes([payload[2], payload[3]]);
        self.requests.push(Recorded {
            unit,
            function,
            address,
        });

        let drop_writes = self.drop_writes;
        let Some(bank) = self.banks.get_mut(&unit) else {
            return Err(ModbusError::exception(
                function.to_u8(),
                EXCEPTION_GATEWAY_TARGET_FAILED,
            ));
        };

        let space = match function {
            ModbusFunction::ReadCoils => Some(DataSpace::Coils),
            ModbusFunction::ReadDiscreteInputs => Some(DataSpace::DiscreteInputs),
            ModbusFunction::ReadHoldingRegisters => Some(DataSpace::HoldingRegisters),
            ModbusFunction::ReadInputRegisters => Some(DataSpace::InputRegisters),
            _ => None,
        };

        if let Some(space) = space {
            if self.read_failures > 0 {
                self.read_failures -= 1;
                return Err(ModbusError::timeout("simulated read", 0));
            }
            if self.unsupported.contains(&space) {
                return Err(ModbusError::exception(
                    function.to_u8(),
                    EXCEPTION_ILLEGAL_FUNCTION,
                ));
            }
            let addrs = (0..second).map(|i| address.wrapping_add(i));
            let mut out = Vec::new();
            if space.is_bit_space() {
                let map = if space == DataSpace::Coils {
                    &bank.coils
                } else {
                    &bank.discrete_inputs
                };
                let bits: Vec<bool> = addrs.map(|a| map.get(&a).copied().unwrap_or(false)).collect();
                let packed = pack_bits(&bits);
                out.push(packed.len() as u8);
                out.extend_from_slice(&packed);
            } else {
                let map = if space == DataSpace::HoldingRegisters {
                    &bank.holding
                } else {
                    &bank.input
                };
                out.push((second * 2) as u8);
                for a in addrs {
                    out.extend_from_slice(&map.get(&a).copied().unwrap_or(0).to_be_bytes());
                }
            }
            return Ok(Bytes::from(out));
        }

        let count = match function {
            ModbusFunction::WriteMultipleCoils | ModbusFunction::WriteMultipleRegisters => second,
            _ => 1,
        };
        if (0..count).any(|i| self.failing_writes.contains(&address.wrapping_add(i))) {
            return Err(ModbusError::transport("simulated write failure"));
        }

        if !drop_writes {
            match function {
                ModbusFunction::WriteSingleCoil => {
                    bank.coils.insert(address, second == COIL_ON);
                }
                ModbusFunction::WriteSingleRegister => {
                    bank.holding.insert(address, second);
                }
                ModbusFunction::WriteMultipleCoils => {
                    let data = &payload[5..];
                    for i in 0..second {
                        let idx = i as usize;
                        let bit = data[idx / 8] & (1 << (idx % 8)) != 0;
                        bank.coils.insert(address.wrapping_add(i), bit);
                    }
                }
                ModbusFunction::WriteMultipleRegisters => {
                    let data = &payload[5..];
                    for (i, pair) in data.chunks_exact(2).enumerate() {
                        bank.holding
                            .insert(address.wrapping_add(i as u16), u16::from_be_bytes([pair[0], pair[1]]));
                    }
                }
                _ => {}
            }
        }
        Ok(Bytes::copy_from_slice(&payload[..4]))
    }
}

impl ModbusTransport for SimulatedDevice {
    async fn request(
        &mut self,
        unit_id: u8,
        function: ModbusFunction,
        payload: &[u8],
    ) -> ModbusResult<Bytes> {
        if !self.connected {
            return Err(ModbusError::connection("simulated device closed"));
        }
        self.stats.requests_sent += 1;
        let result = self.handle(unit_id, function, payload);
        match &result {
            Ok(_) => self.stats.responses_received += 1,
            Err(_) => self.stats.errors += 1,
        }
        result
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) -> ModbusResult<()> {
        self.connected = false;
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
