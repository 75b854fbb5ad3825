mod helpers {
    include!("../../helpers/mod.rs");
}

use helpers::{drain, init_tracing, wait_for, wait_until, VirtualBus, VirtualPort};
use korri_milcan::prelude::*;
use tokio::time::{sleep, Duration};

fn open(bus: &VirtualBus, source: u8, can_be_master: bool) -> Session<VirtualPort> {
    let config = SessionConfig::builder(source)
        .can_be_sync_master(can_be_master)
        .build()
        .expect("valid config");
    Session::open(bus.attach(), config).expect("inside a runtime")
}

fn settled(sessions: &[&Session<VirtualPort>], master: u8) -> bool {
    sessions.iter().all(|session| {
        let status = session.status();
        status.sync_master == Some(master) && status.mode == Mode::Operational
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
/// Candidates 10 and 12 always elect 10, whichever opens first.
async fn lowest_address_wins_regardless_of_open_order() {
    init_tracing();
    for (first, second) in [(10u8, 12u8), (12, 10)] {
        let bus = VirtualBus::new();
        let a = open(&bus, first, true);
        sleep(Duration::from_millis(30)).await;
        let b = open(&bus, second, true);

        assert!(
            wait_until(Duration::from_secs(2), || settled(&[&a, &b], 10)).await,
            "{first} then {second}: election did not settle on 10"
        );
        sleep(Duration::from_millis(100)).await;
        assert!(settled(&[&a, &b], 10), "{first} then {second}: master changed");

        a.close().await.expect("clean shutdown");
        b.close().await.expect("clean shutdown");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
/// Nodes that may not be master follow the elected one and never transmit syncs.
async fn passive_nodes_follow_the_master() {
    init_tracing();
    let bus = VirtualBus::new();
    let mut tap = bus.attach();
    let master = open(&bus, 40, true);
    let follower = open(&bus, 5, false);

    assert!(wait_until(Duration::from_secs(2), || settled(&[&master, &follower], 40)).await);

    for _ in 0..20 {
        let frame = tap
            .recv_within(Duration::from_millis(100))
            .await
            .expect("sync traffic");
        assert_eq!(frame.id.source_address(), 40);
    }

    master.close().await.expect("clean shutdown");
    follower.close().await.expect("clean shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
/// When the master disappears, an Operational slave falls back to
/// PreOperational and reports that no master is left.
async fn slave_watchdog_reports_lost_master() {
    init_tracing();
    let bus = VirtualBus::new();
    let master = open(&bus, 10, true);
    let slave = open(&bus, 30, false);

    assert!(wait_until(Duration::from_secs(2), || settled(&[&master, &slave], 10)).await);
    drain(&slave);
    master.close().await.expect("clean shutdown");

    assert!(
        wait_for(&slave, Duration::from_millis(500), |frame| {
            *frame == Frame::ModeChanged(Mode::PreOperational)
        })
        .await
    );
    // The snapshot is refreshed before the notifications of the same tick.
    assert_eq!(slave.mode(), Mode::PreOperational);
    assert_eq!(slave.status().sync_master, None);
    assert!(
        wait_for(&slave, Duration::from_millis(100), |frame| {
            *frame == Frame::SyncMasterChanged(None)
        })
        .await
    );
    assert_eq!(slave.status().sync_master, None);

    slave.close().await.expect("clean shutdown");
}
