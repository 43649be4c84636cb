//! Session, access, verify, enumeration and stress over a real TCP socket

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockBehavior, MockModbusServer};
use sploitbus::{
    enumerate_units, AddressRange, BannerConfig, ModbusError, ReadResult, Reading, ReconConfig,
    RetryPolicy, Session, SessionConfig, StressConfig, UnitId,
};

fn config() -> SessionConfig {
    SessionConfig::new()
        .with_timeout(Duration::from_millis(500))
        .with_retry(RetryPolicy::new().with_pause(Duration::from_millis(10)))
}

#[tokio::test]
async fn test_reads_follow_unit_switches() {
    let server = MockModbusServer::start(&[1, 2]).await;
    let mut session = Session::connect(&server.address(), config()).await.unwrap();

    let range = AddressRange::new(0, 4).unwrap();
    assert_eq!(
        session.read_holding_registers(range).await,
        ReadResult::Values(vec![1; 4])
    );

    session.set_unit_id(2).unwrap();
    assert_eq!(
        session.read_input_registers(range).await,
        ReadResult::Values(vec![2; 4])
    );
    assert_eq!(
        session.read_discrete_inputs(range).await,
        ReadResult::Values(vec![true; 4])
    );
    assert_eq!(
        session.read_coils(range).await,
        ReadResult::Values(vec![false; 4])
    );
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_write_verify_roundtrip_over_tcp() {
    let server = MockModbusServer::start(&[1]).await;
    let mut session = Session::connect(&server.address(), config()).await.unwrap();

    for value in [0u16, 0x00FF, 0x8000, 0xFFFF] {
        let outcome = session.write_register_verified(200, value).await.unwrap();
        assert!(outcome.passed);
    }
    for value in [true, false] {
        assert!(session.write_coil_verified(300, value).await.unwrap().passed);
    }

    let coils = [true, false, false, true, true, false, true, false, true];
    let outcome = session.write_multiple_coils_verified(10, &coils).await.unwrap();
    assert!(outcome.passed);

    let regs = [0xDEAD, 0xBEEF, 0x0000];
    let outcome = session
        .write_multiple_registers_verified(50, &regs)
        .await
        .unwrap();
    assert!(outcome.passed);
    assert_eq!(server.holding(1, 51), Some(0xBEEF));
}

#[tokio::test]
async fn test_exception_degrades_reads_and_fails_writes() {
    let server = MockModbusServer::start_with(&[1], MockBehavior::Exception(0x02)).await;
    let mut session = Session::connect(&server.address(), config()).await.unwrap();

    let result = session
        .read_holding_registers(AddressRange::new(0, 6).unwrap())
        .await;
    assert_eq!(result.len(), 6);
    assert!(result.iter().all(|r| r == Reading::Unknown));
    // Two attempts for the read
    assert_eq!(server.request_count(), 2);

    let err = session.write_register(0, 1).await.unwrap_err();
    assert!(matches!(err, ModbusError::Exception { code: 0x02, .. }));
    assert_eq!(server.request_count(), 3);
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_timeouts_degrade_and_are_counted() {
    let server =
        MockModbusServer::start_with(&[1], MockBehavior::Delay(Duration::from_secs(2))).await;
    let cfg = SessionConfig::new()
        .with_timeout(Duration::from_millis(150))
        .with_retry(RetryPolicy::new().with_pause(Duration::ZERO));
    let mut session = Session::connect(&server.address(), cfg).await.unwrap();

    let result = session.read_coils(AddressRange::new(0, 3).unwrap()).await;
    assert!(!result.is_supported());
    assert_eq!(result.len(), 3);
    assert_eq!(session.stats().timeouts, 2);
}

#[tokio::test]
async fn test_connect_refused_is_connection_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = Session::connect(&addr.to_string(), config()).await;
    assert!(matches!(result, Err(ModbusError::Connection { .. })));
}

#[tokio::test]
async fn test_reconnect_after_close() {
    let server = MockModbusServer::start(&[1]).await;
    let mut session = Session::connect(&server.address(), config()).await.unwrap();
    session.set_unit_id(1).unwrap();
    session.close().await.unwrap();
    assert!(!session.is_connected());

    session.reconnect().await.unwrap();
    let result = session.read_holding_registers(AddressRange::single(0)).await;
    assert_eq!(result, ReadResult::Values(vec![1]));
}

#[tokio::test]
async fn test_enumeration_over_shared_session() {
    let units = [3u8, 8, 21, 40];
    let server = MockModbusServer::start(&units).await;
    let session = Session::connect(&server.address(), config())
        .await
        .unwrap()
        .into_shared();

    let meddler = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            for _ in 0..50 {
                session.lock().await.set_unit_id(200).unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let snapshots = enumerate_units(
        &session,
        units.iter().map(|&u| UnitId::new(u).unwrap()),
        ReconConfig::new().with_workers(4),
        BannerConfig::default(),
    )
    .await
    .unwrap();
    meddler.await.unwrap();

    assert_eq!(snapshots.len(), units.len());
    for snapshot in &snapshots {
        let tag = u16::from(snapshot.unit_id.get());
        assert_eq!(snapshot.holding_registers, ReadResult::Values(vec![tag; 10]));
        assert_eq!(snapshot.input_registers, ReadResult::Values(vec![tag; 10]));
    }
}

#[tokio::test]
async fn test_text_and_hex_stress_over_tcp() {
    let server = MockModbusServer::start(&[1]).await;
    let mut session = Session::connect(&server.address(), config()).await.unwrap();
    let stress = StressConfig::unpaced();

    let report = session.text_edit("OWNED", &stress).await.unwrap();
    assert_eq!(report.succeeded, 5);
    let banner = session
        .grab_banner(&BannerConfig::new().with_text_registers(5))
        .await
        .unwrap();
    assert_eq!(banner.text, "OWNED");

    let report = session.hex_modify(500, "0x1FFFF", &stress).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(server.holding(1, 500), Some(0xFFFF));
    assert_eq!(server.holding(1, 501), Some(0x0001));

    let report = session.chaos_mode(&stress).await;
    assert_eq!(report.succeeded, 100);
    assert_eq!(server.coil(1, 0), Some(true));
    assert_eq!(server.coil(1, 1), Some(false));
}
