mod helpers {
    include!("../../helpers/mod.rs");
}

use helpers::{init_tracing, wait_until, VirtualBus, VirtualPort};
use korri_milcan::prelude::*;
use korri_milcan::protocol::transport::can_frame::{enter_config_frame, exit_config_frame};
use korri_milcan::protocol::transport::can_id::ControlKind;
use tokio::time::{sleep, Duration};

fn open(bus: &VirtualBus, source: u8, can_be_master: bool) -> Session<VirtualPort> {
    let config = SessionConfig::builder(source)
        .can_be_sync_master(can_be_master)
        .build()
        .expect("valid config");
    Session::open(bus.attach(), config).expect("inside a runtime")
}

fn all_in(sessions: &[&Session<VirtualPort>], mode: Mode) -> bool {
    sessions.iter().all(|session| session.mode() == mode)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
/// A local request moves the whole network to System Configuration and the
/// exit sequence brings it back to normal operation.
async fn local_handshake_drives_the_network() {
    init_tracing();
    let bus = VirtualBus::new();
    let mut tap = bus.attach();
    let master = open(&bus, 10, true);
    let tool = open(&bus, 20, false);
    assert!(wait_until(Duration::from_secs(2), || all_in(&[&master, &tool], Mode::Operational)).await);

    tool.change_to_config_mode().expect("request queued");
    assert!(
        wait_until(Duration::from_secs(1), || {
            all_in(&[&master, &tool], Mode::SystemConfiguration)
        })
        .await
    );

    // The enter bytes went out in order from the requesting node.
    let mut enter_bytes = Vec::new();
    while let Some(frame) = tap.recv_within(Duration::from_millis(20)).await {
        if frame.id.control_kind() == Some(ControlKind::EnterConfig) {
            assert_eq!(frame.id.source_address(), 20);
            enter_bytes.push(frame.data[0]);
        }
    }
    assert_eq!(enter_bytes, b"CFG");

    tool.exit_configuration_mode().expect("request queued");
    assert!(
        wait_until(Duration::from_secs(1), || {
            [&master, &tool]
                .iter()
                .all(|session| session.mode() != Mode::SystemConfiguration)
        })
        .await
    );
    assert!(wait_until(Duration::from_secs(2), || all_in(&[&master, &tool], Mode::Operational)).await);

    master.close().await.expect("clean shutdown");
    tool.close().await.expect("clean shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
/// Sequences injected by an external tool are honoured; a stalled one is not.
async fn remote_sequences_are_validated() {
    init_tracing();
    let bus = VirtualBus::new();
    let tool = bus.attach();
    let node = open(&bus, 30, false);
    assert!(wait_until(Duration::from_secs(1), || node.mode() == Mode::PreOperational).await);

    tool.inject(&enter_config_frame(7, b'C'));
    sleep(Duration::from_millis(500)).await;
    tool.inject(&enter_config_frame(7, b'F'));
    tool.inject(&enter_config_frame(7, b'G'));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(node.mode(), Mode::PreOperational);

    for byte in *b"CFG" {
        tool.inject(&enter_config_frame(7, byte));
        sleep(Duration::from_millis(100)).await;
    }
    assert!(wait_until(Duration::from_secs(1), || node.mode() == Mode::SystemConfiguration).await);

    for byte in *b"OPR" {
        tool.inject(&exit_config_frame(7, byte));
    }
    assert!(wait_until(Duration::from_secs(1), || node.mode() == Mode::PreOperational).await);

    node.close().await.expect("clean shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
/// An exit request outside System Configuration changes nothing.
async fn exit_request_outside_configuration_is_ignored() {
    init_tracing();
    let bus = VirtualBus::new();
    let mut tap = bus.attach();
    let node = open(&bus, 30, false);
    assert!(wait_until(Duration::from_secs(1), || node.mode() == Mode::PreOperational).await);

    node.exit_configuration_mode().expect("request queued");
    assert_eq!(tap.recv_within(Duration::from_millis(100)).await, None);
    assert_eq!(node.mode(), Mode::PreOperational);

    node.close().await.expect("clean shutdown");
}
