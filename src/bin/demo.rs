//! Sploitbus Demo
//!
//! Walks through the engine against a live Modbus/TCP server:
//! - banner capture on the default unit
//! - write-then-verify on one holding register
//! - unit-id reconnaissance over the full 1..=254 range
//! - banner enumeration of every active unit
//! - reverse DNS of the server
//!
//! Usage: cargo run --bin demo [server_address] [register]
//! Example: cargo run --bin demo 127.0.0.1:502 100
//!
//! Set `RUST_LOG=debug` for per-request logs.

use std::time::Duration;

use sploitbus::{
    enumerate::enumerate_active, logging, network_details, recon, BannerConfig, BannerSnapshot,
    ReconConfig, Session, SessionConfig, DEFAULT_TCP_PORT,
};

fn print_banner(banner: &BannerSnapshot) {
    let row = |name: &str, values: Vec<String>| println!("    {:<18} {}", name, values.join(" "));
    println!("  Unit {} @ {}", banner.unit_id, banner.captured_at.format("%H:%M:%S"));
    row(
        "Coils",
        banner.coils.iter().map(|r| r.to_string()).collect(),
    );
    row(
        "Discrete Inputs",
        banner.discrete_inputs.iter().map(|r| r.to_string()).collect(),
    );
    row(
        "Holding Registers",
        banner.holding_registers.iter().map(|r| r.to_string()).collect(),
    );
    row(
        "Input Registers",
        banner.input_registers.iter().map(|r| r.to_string()).collect(),
    );
    println!("    {:<18} {:?}", "Messages", banner.text);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init("info")?;

    println!("{}", sploitbus::info());
    println!("=============================\n");

    let server_address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("127.0.0.1:{}", DEFAULT_TCP_PORT));
    let register: u16 = match std::env::args().nth(2) {
        Some(arg) => arg.parse()?,
        None => 100,
    };

    let config = SessionConfig::new().with_timeout(Duration::from_secs(3));
    let mut session = match Session::connect(&server_address, config).await {
        Ok(session) => session,
        Err(e) => {
            println!("Connection to {} failed: {}", server_address, e);
            return Ok(());
        }
    };
    println!("Connected to {}\n", server_address);

    // =========================================================================
    // Part 1: Banner
    // =========================================================================
    println!("Part 1: Banner (unit {})", session.unit_id());
    let banner_config = BannerConfig::default();
    let banner = session.grab_banner(&banner_config).await?;
    print_banner(&banner);

    // =========================================================================
    // Part 2: Write-then-verify
    // =========================================================================
    println!("\nPart 2: Write-verify at HR {}", register);
    match session.write_register_verified(register, 0x1234).await {
        Ok(outcome) if outcome.passed => println!("  0x1234 read back as written"),
        Ok(outcome) => println!("  mismatch, read back {:?}", outcome.observed.readings()),
        Err(e) => println!("  write failed: {}", e),
    }

    // =========================================================================
    // Part 3: Reconnaissance
    // =========================================================================
    println!("\nPart 3: Unit-id scan");
    let target = session.transport().address;
    let recon_config = ReconConfig::default().with_probe_timeout(Duration::from_secs(1));
    let probes = recon::scan_all(target, recon_config).await;
    let active = recon::active_units(&probes);
    let unreachable = probes
        .iter()
        .filter(|p| p.status == sploitbus::ProbeStatus::Unreachable)
        .count();
    println!(
        "  {} active, {} unreachable: {:?}",
        active.len(),
        unreachable,
        active.iter().map(|u| u.get()).collect::<Vec<_>>()
    );

    // =========================================================================
    // Part 4: Enumeration
    // =========================================================================
    println!("\nPart 4: Enumeration");
    let stats_before = session.stats();
    let shared = session.into_shared();
    match enumerate_active(&shared, &probes, recon_config, banner_config).await {
        Ok(banners) => banners.iter().for_each(print_banner),
        Err(e) => println!("  skipped: {}", e),
    }

    let mut session = shared.lock().await;
    let stats = session.stats();
    println!("\nStatistics:");
    println!(
        "  Requests: {} (+{} during enumeration), Responses: {}",
        stats.requests_sent,
        stats.requests_sent - stats_before.requests_sent,
        stats.responses_received
    );
    println!(
        "  Errors: {}, Timeouts: {}",
        stats.errors, stats.timeouts
    );
    session.close().await?;
    drop(session);

    // =========================================================================
    // Part 5: Network details
    // =========================================================================
    println!("\nPart 5: Network details");
    match network_details(target.ip(), Duration::from_secs(2)).await {
        Ok(details) => {
            println!("  Hostname: {}", details.hostname);
            println!("  IP Address: {}", details.ip);
            println!("  Aliases: {}", details.aliases.join(", "));
        }
        Err(e) => println!("  {}", e),
    }

    Ok(())
}
