use converge_eventbus::EventBus;
use pretty_assertions::assert_eq;
use rstest::rstest;
use tokio_stream::StreamExt;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Tick {
    key: &'static str,
    n: u32,
}

fn tick(key: &'static str, n: u32) -> Tick {
    Tick { key, n }
}

#[tokio::test]
async fn subscribers_see_publish_order() {
    let bus = EventBus::new(64);
    let mut a = bus.subscribe();
    let mut b = bus.subscribe();

    for n in 0..10 {
        bus.emit(tick("x", n));
    }

    for n in 0..10 {
        assert_eq!(a.recv().await, Some(tick("x", n)));
        assert_eq!(b.recv().await, Some(tick("x", n)));
    }
}

#[tokio::test]
async fn filtered_subscription_skips_other_keys() {
    let bus = EventBus::new(64);
    let mut only_y = bus.subscribe_filtered(|t: &Tick| t.key == "y");

    bus.emit(tick("x", 1));
    bus.emit(tick("y", 2));
    bus.emit(tick("x", 3));
    bus.emit(tick("y", 4));

    assert_eq!(only_y.recv().await, Some(tick("y", 2)));
    assert_eq!(only_y.recv().await, Some(tick("y", 4)));
    assert_eq!(only_y.try_recv(), None);
}

#[rstest]
#[case::four_of_ten(4, 10, 6)]
#[case::eight_of_ten(8, 10, 2)]
#[case::single_slot(1, 5, 4)]
#[case::no_overflow(16, 10, 0)]
#[tokio::test]
async fn slow_subscriber_loses_oldest_and_counts_lag(
    #[case] capacity: usize,
    #[case] emitted: u32,
    #[case] lost: u64,
) {
    let bus = EventBus::new(capacity);
    let mut slow = bus.subscribe();

    for n in 0..emitted {
        bus.emit(tick("x", n));
    }

    // Only the most recent `capacity` events survive.
    let first = u32::try_from(lost).unwrap();
    assert_eq!(slow.recv().await, Some(tick("x", first)));
    assert_eq!(slow.lagged(), lost);
    for n in first + 1..emitted {
        assert_eq!(slow.recv().await, Some(tick("x", n)));
    }
    assert_eq!(slow.lagged(), lost);
    assert_eq!(bus.total_emitted(), u64::from(emitted));
}

#[tokio::test]
async fn publishing_never_blocks_on_idle_subscriber() {
    let bus = EventBus::new(2);
    let _idle = bus.subscribe();
    for n in 0..1_000 {
        bus.emit(tick("x", n));
    }
    assert_eq!(bus.total_emitted(), 1_000);
}

#[tokio::test]
async fn recv_returns_none_after_bus_dropped() {
    let bus = EventBus::new(8);
    let mut sub = bus.subscribe();
    bus.emit(tick("x", 1));
    drop(bus);

    assert_eq!(sub.recv().await, Some(tick("x", 1)));
    assert_eq!(sub.recv().await, None);
}

#[tokio::test]
async fn stream_applies_filter() {
    let bus = EventBus::new(16);
    let stream = bus.subscribe_filtered(|t: &Tick| t.n % 2 == 0).into_stream();

    for n in 0..6 {
        bus.emit(tick("x", n));
    }
    drop(bus);

    let collected: Vec<u32> = stream.map(|t| t.n).collect().await;
    assert_eq!(collected, vec![0, 2, 4]);
}

#[test]
fn history_snapshot_matches_emits() {
    let bus = EventBus::with_history(8, None);
    bus.emit(tick("x", 1));
    bus.emit(tick("y", 2));

    assert_eq!(bus.history(), vec![tick("x", 1), tick("y", 2)]);
    assert_eq!(bus.history_for(|t| t.key == "y"), vec![tick("y", 2)]);
}
