use chain_dispatch_connector::{
    config::SyncMonitorConfig,
    sync_monitor::{SyncEvent, SyncEventKind, SyncNotification, SyncSnapshot, SyncStatusMonitor},
};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time::{advance, timeout, Instant},
};

fn snapshot(current: u64, highest: u64) -> SyncNotification {
    SyncNotification::Snapshot(SyncSnapshot::new(current, highest))
}

fn start() -> (mpsc::Sender<SyncNotification>, SyncStatusMonitor) {
    chain_dispatch_logger::try_init_for_tests();
    let (tx, rx) = mpsc::channel(16);
    let monitor = SyncStatusMonitor::from_receiver(rx, &SyncMonitorConfig::default());
    (tx, monitor)
}

/// Waits for the next event, failing if none arrives within `limit`.
async fn expect_event(monitor: &mut SyncStatusMonitor, limit: Duration) -> SyncEvent {
    timeout(limit, monitor.next_event())
        .await
        .expect("an event within the limit")
        .expect("monitor still active")
}

/// Asserts that nothing is emitted for `limit`.
async fn expect_quiet(monitor: &mut SyncStatusMonitor, limit: Duration) {
    if let Ok(event) = timeout(limit, monitor.next_event()).await {
        panic!("unexpected event: {event:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn reports_syncing_then_caught_up_after_debounce() {
    let (tx, mut monitor) = start();
    let short = Duration::from_millis(10);

    tx.send(snapshot(100, 1000)).await.unwrap();
    assert_eq!(expect_event(&mut monitor, short).await, SyncEvent::Changed(true));
    assert_eq!(
        expect_event(&mut monitor, short).await,
        SyncEvent::Data(SyncSnapshot::new(100, 1000))
    );

    tx.send(snapshot(999, 1000)).await.unwrap();
    assert_eq!(
        expect_event(&mut monitor, short).await,
        SyncEvent::Data(SyncSnapshot::new(999, 1000))
    );

    let waiting_since = Instant::now();
    assert_eq!(
        expect_event(&mut monitor, Duration::from_secs(5)).await,
        SyncEvent::Changed(false)
    );
    assert!(waiting_since.elapsed() >= Duration::from_millis(490));

    expect_quiet(&mut monitor, Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn far_behind_snapshots_never_report_caught_up() {
    let (tx, mut monitor) = start();
    let short = Duration::from_millis(10);

    tx.send(snapshot(100, 1000)).await.unwrap();
    assert_eq!(expect_event(&mut monitor, short).await, SyncEvent::Changed(true));
    assert!(matches!(expect_event(&mut monitor, short).await, SyncEvent::Data(_)));

    for (current, highest) in [(150, 1000), (120, 1000), (400, 1000), (300, 1000), (700, 1000)] {
        tx.send(snapshot(current, highest)).await.unwrap();
        assert_eq!(
            expect_event(&mut monitor, short).await,
            SyncEvent::Data(SyncSnapshot::new(current, highest))
        );
        advance(Duration::from_millis(600)).await;
    }

    expect_quiet(&mut monitor, Duration::from_secs(10)).await;
}

#[tokio::test(start_paused = true)]
async fn flapping_near_the_tip_reports_one_transition() {
    let (tx, monitor) = start();
    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = changes.clone();
    monitor.on(SyncEventKind::Changed, move |event| {
        if let SyncEvent::Changed(syncing) = event {
            sink.lock().unwrap().push(*syncing);
        }
    });

    // Close to the tip, alternating around the threshold, faster than the debounce window.
    for (current, highest) in [(990, 1000), (790, 1000), (995, 1001), (780, 1002), (1001, 1003)] {
        tx.send(snapshot(current, highest)).await.unwrap();
        advance(Duration::from_millis(300)).await;
    }
    assert_eq!(*changes.lock().unwrap(), vec![true]);

    advance(Duration::from_millis(600)).await;
    // Let the monitor task observe the elapsed timer.
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(*changes.lock().unwrap(), vec![true, false]);
    drop(tx);
    drop(monitor);
}

#[tokio::test(start_paused = true)]
async fn a_late_behind_snapshot_keeps_syncing() {
    let (tx, mut monitor) = start();
    let short = Duration::from_millis(10);

    tx.send(snapshot(100, 1000)).await.unwrap();
    tx.send(snapshot(990, 1000)).await.unwrap();
    // Arrives inside the debounce window and is the one evaluated when it expires.
    tx.send(snapshot(500, 1000)).await.unwrap();

    let mut events = Vec::new();
    for _ in 0..4 {
        events.push(expect_event(&mut monitor, short).await);
    }
    assert_eq!(
        events,
        vec![
            SyncEvent::Changed(true),
            SyncEvent::Data(SyncSnapshot::new(100, 1000)),
            SyncEvent::Data(SyncSnapshot::new(990, 1000)),
            SyncEvent::Data(SyncSnapshot::new(500, 1000)),
        ]
    );

    expect_quiet(&mut monitor, Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_cancels_the_pending_transition() {
    let (tx, mut monitor) = start();
    let short = Duration::from_millis(10);

    tx.send(snapshot(100, 1000)).await.unwrap();
    tx.send(snapshot(999, 1000)).await.unwrap();
    for _ in 0..3 {
        expect_event(&mut monitor, short).await;
    }

    monitor.unsubscribe();
    monitor.unsubscribe();
    assert!(!monitor.is_active());

    advance(Duration::from_secs(2)).await;
    assert_eq!(monitor.next_event().await, None);
    // The source may still be fed; nobody is listening any more.
    let _ = tx.send(snapshot(1000, 1000)).await;
    assert_eq!(monitor.next_event().await, None);
}

#[tokio::test(start_paused = true)]
async fn not_syncing_notification_is_debounced() {
    let (tx, mut monitor) = start();
    let short = Duration::from_millis(10);

    // Ignored while not syncing.
    tx.send(SyncNotification::NotSyncing).await.unwrap();
    tx.send(snapshot(10, 5000)).await.unwrap();
    assert_eq!(expect_event(&mut monitor, short).await, SyncEvent::Changed(true));
    assert!(matches!(expect_event(&mut monitor, short).await, SyncEvent::Data(_)));

    tx.send(snapshot(30, 5000)).await.unwrap();
    assert!(matches!(expect_event(&mut monitor, short).await, SyncEvent::Data(_)));

    tx.send(SyncNotification::NotSyncing).await.unwrap();
    let waiting_since = Instant::now();
    expect_quiet(&mut monitor, Duration::from_millis(100)).await;
    assert_eq!(
        expect_event(&mut monitor, Duration::from_secs(5)).await,
        SyncEvent::Changed(false)
    );
    assert!(waiting_since.elapsed() >= Duration::from_millis(490));

    expect_quiet(&mut monitor, Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn far_behind_snapshot_after_not_syncing_keeps_syncing() {
    let (tx, mut monitor) = start();
    let short = Duration::from_millis(10);

    tx.send(snapshot(10, 5000)).await.unwrap();
    assert_eq!(expect_event(&mut monitor, short).await, SyncEvent::Changed(true));
    assert!(matches!(expect_event(&mut monitor, short).await, SyncEvent::Data(_)));

    tx.send(SyncNotification::NotSyncing).await.unwrap();
    advance(Duration::from_millis(200)).await;
    tx.send(snapshot(100, 5000)).await.unwrap();
    assert_eq!(
        expect_event(&mut monitor, short).await,
        SyncEvent::Data(SyncSnapshot::new(100, 5000))
    );

    expect_quiet(&mut monitor, Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn a_new_episode_reports_syncing_again() {
    let (tx, mut monitor) = start();
    let short = Duration::from_millis(10);

    tx.send(snapshot(100, 1000)).await.unwrap();
    tx.send(snapshot(999, 1000)).await.unwrap();
    for _ in 0..3 {
        expect_event(&mut monitor, short).await;
    }
    assert_eq!(
        expect_event(&mut monitor, Duration::from_secs(5)).await,
        SyncEvent::Changed(false)
    );

    tx.send(snapshot(500, 2000)).await.unwrap();
    assert_eq!(expect_event(&mut monitor, short).await, SyncEvent::Changed(true));
    assert_eq!(
        expect_event(&mut monitor, short).await,
        SyncEvent::Data(SyncSnapshot::new(500, 2000))
    );
}

#[tokio::test(start_paused = true)]
async fn closed_source_still_reports_the_pending_transition() {
    let (tx, mut monitor) = start();
    let short = Duration::from_millis(10);

    tx.send(snapshot(100, 1000)).await.unwrap();
    tx.send(snapshot(999, 1000)).await.unwrap();
    for _ in 0..3 {
        expect_event(&mut monitor, short).await;
    }

    drop(tx);
    let waiting_since = Instant::now();
    assert_eq!(
        expect_event(&mut monitor, Duration::from_secs(5)).await,
        SyncEvent::Changed(false)
    );
    assert!(waiting_since.elapsed() >= Duration::from_millis(490));

    assert_eq!(monitor.next_event().await, None);
    assert!(!monitor.is_active());
}

#[tokio::test(start_paused = true)]
async fn closed_source_without_pending_transition_ends_the_monitor() {
    let (tx, mut monitor) = start();
    let short = Duration::from_millis(10);

    tx.send(snapshot(100, 1000)).await.unwrap();
    for _ in 0..2 {
        expect_event(&mut monitor, short).await;
    }

    drop(tx);
    let closed = timeout(Duration::from_secs(1), monitor.next_event()).await;
    assert_eq!(closed, Ok(None));
    assert!(!monitor.is_active());
}

#[tokio::test(start_paused = true)]
async fn handlers_only_see_their_kind() {
    let (tx, mut monitor) = start();
    let data = Arc::new(Mutex::new(Vec::new()));
    let sink = data.clone();
    monitor.on(SyncEventKind::Data, move |event| sink.lock().unwrap().push(*event));

    tx.send(snapshot(1, 900)).await.unwrap();
    tx.send(snapshot(2, 900)).await.unwrap();
    for _ in 0..3 {
        expect_event(&mut monitor, Duration::from_millis(10)).await;
    }

    assert_eq!(
        *data.lock().unwrap(),
        vec![
            SyncEvent::Data(SyncSnapshot::new(1, 900)),
            SyncEvent::Data(SyncSnapshot::new(2, 900)),
        ]
    );
}
