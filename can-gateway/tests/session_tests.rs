// End-to-end session tests over the in-memory transport and bus
use can_gateway::{
    DecodedValue, Frame, GatewayConfig, GatewayError, MappingEntry, MemoryBus, MockTransport,
    RxFilter, Session, ValueType,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(2);
const POLL: Duration = Duration::from_millis(5);

fn start(config: &GatewayConfig) -> (Session, Arc<MockTransport>, Arc<MemoryBus>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let transport = Arc::new(MockTransport::new());
    let bus = Arc::new(MemoryBus::new("test"));
    let session = Session::start_with_poll_interval(
        config,
        transport.clone(),
        bus.clone(),
        bus.clone(),
        POLL,
    )
    .unwrap();
    (session, transport, bus)
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(POLL);
    }
    false
}

fn float_frame(id: u32, value: f32) -> Frame {
    let mut data = vec![0u8; 8];
    data[..4].copy_from_slice(&value.to_le_bytes());
    Frame::new(id, data)
}

#[test]
fn inbound_frame_is_published() {
    let config = GatewayConfig::new()
        .with_filter("0x0", "0x0")
        .add_input(MappingEntry::new("0x123", ValueType::Float, "environment.depth.belowTransducer"));
    let (mut session, transport, bus) = start(&config);

    assert!(transport.is_started());
    assert!(transport.inject(float_frame(0x123, 12.5)));

    let update = bus.updates().recv_timeout(WAIT).unwrap();
    assert_eq!(update.path, "environment.depth.belowTransducer");
    assert_eq!(update.value, DecodedValue::Float(12.5));
    assert_eq!(update.source, "test");

    session.stop();
}

#[test]
fn rx_filter_is_installed() {
    let config = GatewayConfig::new()
        .add_input(MappingEntry::new("0x123", ValueType::UInt, "a"))
        .add_input(MappingEntry::new("0x423", ValueType::UInt, "b"));
    let (mut session, transport, bus) = start(&config);

    assert_eq!(transport.filter(), RxFilter::new(0x400, 0x400));
    assert!(!transport.inject(Frame::new(0x123, vec![1, 0, 0, 0, 0, 0, 0, 0])));
    assert!(transport.inject(Frame::new(0x423, vec![2, 0, 0, 0, 0, 0, 0, 0])));

    let update = bus.updates().recv_timeout(WAIT).unwrap();
    assert_eq!(update.path, "b");
    assert_eq!(update.value, DecodedValue::UInt(2));

    session.stop();
    assert!(bus.drain_updates().is_empty());
}

#[test]
fn inbound_frames_inside_window_publish_once() {
    let config = GatewayConfig::new()
        .with_filter("0x0", "0x0")
        .with_throttle_ms(60_000)
        .add_input(MappingEntry::new("0x10", ValueType::Int, "a"));
    let (mut session, transport, bus) = start(&config);

    transport.inject(Frame::new(0x10, vec![1, 0, 0, 0, 0, 0, 0, 0]));
    transport.inject(Frame::new(0x10, vec![2, 0, 0, 0, 0, 0, 0, 0]));
    transport.inject(Frame::new(0x99, vec![0u8; 8]));

    assert!(wait_until(|| session.stats().frames_received == 3));
    let stats = session.stats();
    assert_eq!(stats.values_published, 1);
    assert_eq!(stats.frames_throttled, 1);
    assert_eq!(stats.frames_unmapped, 1);

    let updates = bus.drain_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].value, DecodedValue::Int(1));

    session.stop();
}

#[test]
fn realtime_input_is_still_throttled() {
    let config = GatewayConfig::new()
        .with_filter("0x0", "0x0")
        .with_throttle_ms(5000)
        .add_input(
            MappingEntry::new("0x123", ValueType::Float, "environment.depth.belowTransducer")
                .realtime(true),
        );
    let (mut session, transport, bus) = start(&config);

    transport.inject(float_frame(0x123, 12.5));
    transport.inject(float_frame(0x123, 13.0));

    assert!(wait_until(|| session.stats().frames_received == 2));
    let stats = session.stats();
    assert_eq!(stats.values_published, 1);
    assert_eq!(stats.frames_throttled, 1);

    let updates = bus.drain_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].value, DecodedValue::Float(12.5));

    session.stop();
}

#[test]
fn decode_failure_is_counted_and_dropped() {
    let config = GatewayConfig::new()
        .with_filter("0x0", "0x0")
        .add_input(MappingEntry::new("0x20", ValueType::XyzFloat, "navigation.attitude"));
    let (mut session, transport, bus) = start(&config);

    transport.inject(Frame::new(0x20, vec![0u8; 8]));
    assert!(wait_until(|| session.stats().decode_errors == 1));
    assert!(bus.drain_updates().is_empty());

    session.stop();
}

#[test]
fn realtime_output_sends_frame() {
    let config = GatewayConfig::new()
        .add_output(MappingEntry::new("0x400", ValueType::UInt, "electrical.switches.bank0").realtime(true));
    let (mut session, transport, bus) = start(&config);

    assert_eq!(bus.publish_value("electrical.switches.bank0", 42u32.into()), 1);
    let frame = transport.recv_sent(WAIT).unwrap();
    assert_eq!(frame.id, 0x400);
    assert_eq!(frame.data, vec![42, 0, 0, 0, 0, 0, 0, 0]);

    bus.publish_value("electrical.switches.bank0", 43u32.into());
    assert_eq!(transport.recv_sent(WAIT).unwrap().data[0], 43);

    session.stop();
    assert!(transport.drain_sent().is_empty());
}

#[test]
fn throttled_output_sends_first_value_only() {
    let config = GatewayConfig::new()
        .with_throttle_ms(60_000)
        .add_output(MappingEntry::new("0x401", ValueType::Float, "environment.wind.speedApparent"));
    let (mut session, transport, bus) = start(&config);

    bus.publish_value("environment.wind.speedApparent", 1.5f32.into());
    bus.publish_value("environment.wind.speedApparent", 2.5f32.into());

    let frame = transport.recv_sent(WAIT).unwrap();
    assert_eq!(&frame.data[..4], &1.5f32.to_le_bytes());
    assert!(transport.recv_sent(Duration::from_millis(100)).is_none());

    session.stop();
}

#[test]
fn stop_releases_subscriptions_and_is_idempotent() {
    let config = GatewayConfig::new()
        .add_output(MappingEntry::new("0x400", ValueType::UInt, "a").realtime(true))
        .add_output(MappingEntry::new("0x401", ValueType::Int, "b"));
    let (mut session, transport, bus) = start(&config);

    assert_eq!(bus.subscriber_count("a"), 1);
    assert_eq!(bus.subscriber_count("b"), 1);

    session.stop();
    assert!(!session.is_running());
    assert!(!transport.is_started());
    assert_eq!(bus.subscriber_count("a"), 0);
    assert_eq!(bus.subscriber_count("b"), 0);
    assert_eq!(bus.publish_value("a", 1u32.into()), 0);

    session.stop();
    drop(session);
    assert!(transport.drain_sent().is_empty());
}

#[test]
fn invalid_identifier_prevents_start() {
    let config = GatewayConfig::new()
        .add_input(MappingEntry::new("0x12Q", ValueType::UInt, "a"))
        .add_output(MappingEntry::new("0x400", ValueType::UInt, "b"));
    let transport = Arc::new(MockTransport::new());
    let bus = Arc::new(MemoryBus::new("test"));

    let result = Session::start(&config, transport.clone(), bus.clone(), bus.clone());
    assert!(matches!(result, Err(GatewayError::InvalidIdentifier(_))));
    assert!(!transport.is_started());
    assert_eq!(bus.subscriber_count("b"), 0);
}

#[test]
fn vector_output_prevents_start() {
    let config = GatewayConfig::new()
        .add_output(MappingEntry::new("0x400", ValueType::XyzFloat, "navigation.attitude"));
    let transport = Arc::new(MockTransport::new());
    let bus = Arc::new(MemoryBus::new("test"));

    let result = Session::start(&config, transport.clone(), bus.clone(), bus.clone());
    assert!(matches!(result, Err(GatewayError::Config(_))));
    assert!(transport.drain_sent().is_empty());
}

#[test]
fn zero_poll_interval_prevents_start() {
    let config = GatewayConfig::new().add_input(MappingEntry::new("0x423", ValueType::UInt, "a"));
    let transport = Arc::new(MockTransport::new());
    let bus = Arc::new(MemoryBus::new("test"));

    let result = Session::start_with_poll_interval(
        &config,
        transport.clone(),
        bus.clone(),
        bus.clone(),
        Duration::ZERO,
    );
    assert!(matches!(result, Err(GatewayError::Config(_))));
    assert!(!transport.is_started());
}
