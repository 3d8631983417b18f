//! # Dispatcher and Broadcast Cycle Tests
//!
//! Drives a real [`Engine`](udpt::dispatcher::Engine) through its event
//! channel with recorded sends in place of the network.

mod common;

use common::{enabled, harness, harness_with, iface};
use serde_json::Value;
use std::net::SocketAddr;
use udpt::config::Seeds;
use udpt::event::Event;
use udpt::store::{Store, VarDef, VarType, VarValue};

const PORT: u16 = 5005;

fn dest(addr: &str) -> SocketAddr {
    addr.parse().unwrap()
}

/// Test: A disabled engine sends nothing on timer expiry or trigger.
#[tokio::test]
async fn test_disabled_engine_sends_nothing() {
    let mut h = harness(Some("hello"), vec![iface("eth0", 1, 192, 168, 1, 10)], Seeds::default());

    h.engine.handle(Event::TimerExpired).await;
    h.trigger();
    assert_eq!(h.pump().await, 1);

    let stats = h.engine.stats();
    assert_eq!(stats.txcount(), 0);
    assert_eq!(stats.errcount(), 0);
    assert!(h.broadcaster.sent().is_empty());
}

/// Test: Two eligible interfaces and a good template give exactly two sends.
#[tokio::test]
async fn test_enabled_engine_sends_once_per_interface() {
    let mut h = harness(
        Some("hello"),
        vec![iface("eth0", 1, 192, 168, 1, 10), iface("eth1", 2, 10, 0, 0, 5)],
        enabled(PORT),
    );

    h.engine.handle(Event::TimerExpired).await;

    let stats = h.engine.stats();
    assert_eq!(stats.txcount(), 2);
    assert_eq!(stats.errcount(), 0);
    let sent = h.broadcaster.sent();
    assert_eq!(sent[0].0, dest("192.168.1.255:5005"));
    assert_eq!(sent[1].0, dest("10.0.0.255:5005"));
    assert_eq!(sent[0].1, b"hello");
}

/// Test: A missing template counts one error per attempted interface.
#[tokio::test]
async fn test_missing_template_counts_errors() {
    let mut h = harness(
        None,
        vec![iface("eth0", 1, 192, 168, 1, 10), iface("eth1", 2, 10, 0, 0, 5)],
        enabled(PORT),
    );

    h.trigger();
    h.pump().await;

    let stats = h.engine.stats();
    assert_eq!(stats.txcount(), 0);
    assert_eq!(stats.errcount(), 2);
    assert!(h.broadcaster.sent().is_empty());
}

/// Test: The template is re-rendered per interface with that interface's address.
#[tokio::test]
async fn test_each_interface_gets_its_own_rendering() {
    let mut h = harness(
        Some("ip=${/sys/udpt/ip};port=${/sys/udpt/port}"),
        vec![iface("eth0", 1, 192, 168, 1, 10), iface("eth1", 2, 10, 0, 0, 5)],
        enabled(PORT),
    );

    h.engine.handle(Event::TimerExpired).await;

    assert_eq!(
        h.broadcaster.payloads(),
        vec!["ip=192.168.1.10;port=5005", "ip=10.0.0.5;port=5005"]
    );
    // The last published address stays visible to other readers.
    assert_eq!(h.store.value_of("/sys/udpt/ip"), Some(VarValue::Str("10.0.0.5".into())));
}

/// Test: Back-to-back triggers each produce a full cycle.
#[tokio::test]
async fn test_back_to_back_triggers_are_not_coalesced() {
    let mut h = harness(
        Some("x"),
        vec![iface("eth0", 1, 192, 168, 1, 10), iface("eth1", 2, 10, 0, 0, 5)],
        enabled(PORT),
    );

    h.trigger();
    h.trigger();
    assert_eq!(h.pump().await, 2);

    assert_eq!(h.engine.stats().txcount(), 4);
}

/// Test: Three good sends and one failed send are reported verbatim.
#[tokio::test]
async fn test_report_after_three_sends_and_one_failure() {
    let mut h = harness(
        Some("x"),
        vec![
            iface("eth0", 1, 192, 168, 1, 10),
            iface("eth1", 2, 10, 0, 0, 5),
            iface("eth2", 3, 172, 16, 0, 1),
            iface("eth3", 4, 192, 168, 7, 1),
        ],
        Seeds {
            interfaces: "eth0 eth1 eth2 eth3".into(),
            ..enabled(PORT)
        },
    );
    h.broadcaster.fail_for(dest("172.16.0.255:5005"));

    h.engine.handle(Event::TimerExpired).await;
    let rx = h.store.request_report("/sys/udpt/metrics").expect("request report");
    h.pump().await;

    let body = rx.await.expect("report body");
    let report: Value = serde_json::from_str(&body).expect("report is JSON");
    assert_eq!(report["txcount"], 3);
    assert_eq!(report["errcount"], 1);
    assert_eq!(report["enabled"], "yes");
    assert_eq!(report["port"], 5005);
    assert_eq!(report["txrate"], 0);
    assert_eq!(report["interfaces"], "eth0 eth1 eth2 eth3");
}

/// Test: The report keys come out in a fixed order.
#[tokio::test]
async fn test_report_key_order() {
    let mut h = harness(Some("x"), vec![], Seeds::default());

    let rx = h.store.request_report("/sys/udpt/metrics").unwrap();
    h.pump().await;

    assert_eq!(
        rx.await.unwrap(),
        r#"{"enabled":"no","port":9999,"txrate":0,"txcount":0,"errcount":0,"interfaces":""}"#
    );
}

/// Test: Writing the enable variable takes effect on the next cycle.
#[tokio::test]
async fn test_enable_change_is_observed() {
    let mut h = harness(Some("x"), vec![iface("eth0", 1, 192, 168, 1, 10)], Seeds::default());

    h.trigger();
    h.pump().await;
    assert_eq!(h.engine.stats().txcount(), 0);

    h.write("/sys/udpt/enable", "1");
    h.trigger();
    h.pump().await;
    assert_eq!(h.engine.stats().txcount(), 1);
    assert!(h.engine.config().enable);
}

/// Test: Changing the allow-list narrows the next cycle.
#[tokio::test]
async fn test_allow_list_change_filters_interfaces() {
    let mut h = harness(
        Some("x"),
        vec![iface("eth0", 1, 192, 168, 1, 10), iface("wlan0", 2, 10, 0, 0, 5)],
        enabled(PORT),
    );

    h.write("/sys/udpt/interfaces", "eth0");
    h.trigger();
    h.pump().await;

    let sent = h.broadcaster.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, dest("192.168.1.255:5005"));
}

/// Test: Writing the rate re-arms the timer, and zero disarms it.
#[tokio::test]
async fn test_rate_change_rearms_timer() {
    let mut h = harness(Some("x"), vec![], enabled(PORT));
    assert!(!h.engine.timer().is_armed());

    h.write("/sys/udpt/txrate", "5");
    h.pump().await;
    assert!(h.engine.timer().is_armed());
    assert_eq!(h.engine.timer().interval(), 5);

    h.write("/sys/udpt/txrate", "0");
    h.pump().await;
    assert!(!h.engine.timer().is_armed());
}

/// Test: Startup arms the timer from a seeded rate.
#[tokio::test]
async fn test_start_arms_configured_rate() {
    let mut h = harness(
        Some("x"),
        vec![],
        Seeds {
            rate: 30,
            ..Seeds::default()
        },
    );

    h.engine.start().expect("arm timer");
    assert_eq!(h.engine.timer().interval(), 30);
}

/// Test: An IPv6 entry is sent to the scoped all-nodes address.
#[tokio::test]
async fn test_ipv6_entry_uses_all_nodes_destination() {
    let local = "fe80::1".parse().unwrap();
    let mut h = harness(
        Some("${/sys/udpt/ip}"),
        vec![udpt::interfaces::NetworkInterface::ipv6("eth0", 7, local)],
        enabled(PORT),
    );

    h.engine.handle(Event::TimerExpired).await;

    let sent = h.broadcaster.sent();
    match sent[0].0 {
        SocketAddr::V6(addr) => {
            assert_eq!(addr.ip(), &udpt::interfaces::IPV6_ALL_NODES);
            assert_eq!(addr.scope_id(), 7);
            assert_eq!(addr.port(), PORT);
        }
        other => panic!("expected IPv6 destination, got {other}"),
    }
    assert_eq!(sent[0].1, b"fe80::1");
}

/// Test: An address that cannot be published counts an error and skips that
/// interface; the next interface renders its own address.
#[tokio::test]
async fn test_unpublishable_address_skips_interface() {
    let local = "fe80::1234:5678:9abc".parse().unwrap();
    let mut h = harness_with(
        Some("${/sys/udpt/ip}"),
        vec![
            udpt::interfaces::NetworkInterface::ipv6("eth0", 2, local),
            iface("eth1", 3, 10, 0, 0, 1),
        ],
        enabled(PORT),
        |store| {
            store
                .create(&VarDef::new("/sys/udpt/ip", VarType::Str).max_len(8))
                .expect("pre-create ip variable");
        },
    );

    h.engine.handle(Event::TimerExpired).await;

    let stats = h.engine.stats();
    assert_eq!(stats.errcount(), 1);
    assert_eq!(stats.txcount(), 1);
    assert_eq!(h.broadcaster.sent(), vec![(dest("10.0.0.255:5005"), b"10.0.0.1".to_vec())]);
    assert_eq!(h.store.value_of("/sys/udpt/ip"), Some(VarValue::Str("10.0.0.1".into())));
}
