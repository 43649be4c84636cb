#![no_main]

use libfuzzer_sys::fuzz_target;
use sploitbus::recon::{ProbeFrame, ProbeStatus};

fuzz_target!(|data: &[u8]| {
    let status = ProbeFrame::classify(data);
    if data.starts_with(&[0x21, 0x00, 0x00, 0x00]) {
        assert_eq!(status, ProbeStatus::Active);
    }
    if data.is_empty() {
        assert_eq!(status, ProbeStatus::Inactive);
    }
});
