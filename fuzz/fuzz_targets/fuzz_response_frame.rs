#![no_main]

use libfuzzer_sys::fuzz_target;
use sploitbus::pdu::{parse_bits, parse_registers};
use sploitbus::protocol::ModbusFunction;
use sploitbus::transport::{check_response, decode_frame};

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = decode_frame(data) else {
        return;
    };
    let (tid, unit) = (frame.transaction_id, frame.unit_id);
    if let Ok(payload) = check_response(frame, tid, unit, ModbusFunction::ReadHoldingRegisters) {
        let count = payload.first().map_or(1, |b| u16::from(*b / 2).max(1));
        let _ = parse_registers(&payload, count);
        let _ = parse_bits(&payload, count);
    }
});
