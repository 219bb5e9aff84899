//! Switch connection lifecycle over real TCP

use apps::AppEvent;
use codec::{Echo, MessageBody, MsgType, OfpMessage};
use e2e_tests::framework::{next_matching, wait_until, STEP_TIMEOUT};
use e2e_tests::{SimulatedSwitch, SwitchBehavior, TestController};
use event_bus::control;
use serde_json::{json, Value};
use std::time::Duration;

fn control_event(wanted: &'static str) -> impl FnMut(AppEvent) -> Option<Value> {
    move |event| match event {
        AppEvent::Control { name, payload } if name == wanted => Some(payload),
        _ => None,
    }
}

#[tokio::test]
async fn test_handshake_announces_switch() {
    let controller = TestController::start().await.unwrap();
    let mut app = controller.app("watcher").unwrap();

    let mut switch = SimulatedSwitch::connect(controller.addr(), SwitchBehavior::new(4, 0x2a))
        .await
        .unwrap();

    let hello = switch.next_message(STEP_TIMEOUT).await.unwrap();
    assert_eq!(hello.msg_type(), MsgType::Hello as u8);
    assert_eq!(hello.version, 4);
    let request = switch
        .expect_type(MsgType::FeaturesRequest, STEP_TIMEOUT)
        .await
        .unwrap();
    assert_ne!(request.xid, 0);

    let payload = next_matching(&mut app, STEP_TIMEOUT, control_event(control::SWITCH_CONNECTED))
        .await
        .unwrap();
    assert_eq!(payload, json!({"dpid": 0x2a}));
    assert_eq!(app.list_switches().await.unwrap(), vec![0x2a]);

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_both_versions_served() {
    let controller = TestController::start().await.unwrap();
    let mut v13 = SimulatedSwitch::connect(controller.addr(), SwitchBehavior::new(4, 1))
        .await
        .unwrap();
    let mut v15 = SimulatedSwitch::connect(controller.addr(), SwitchBehavior::new(6, 2))
        .await
        .unwrap();

    controller.wait_for_switch(1).await.unwrap();
    controller.wait_for_switch(2).await.unwrap();
    assert_eq!(v13.next_message(STEP_TIMEOUT).await.unwrap().version, 4);
    assert_eq!(v15.next_message(STEP_TIMEOUT).await.unwrap().version, 6);
    assert_eq!(controller.manager().list_switches(), vec![1, 2]);
}

#[tokio::test]
async fn test_switch_echo_answered() {
    let controller = TestController::start().await.unwrap();
    let mut switch = SimulatedSwitch::connect(controller.addr(), SwitchBehavior::new(4, 7))
        .await
        .unwrap();
    controller.wait_for_switch(7).await.unwrap();

    let echo = Echo {
        data: bytes::Bytes::from_static(b"ping"),
    };
    switch
        .send(OfpMessage::new(4, MessageBody::EchoRequest(echo.clone())), 0x51)
        .unwrap();

    let reply = switch
        .expect_type(MsgType::EchoReply, STEP_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(reply.xid, 0x51);
    assert_eq!(reply.body, MessageBody::EchoReply(echo));
}

#[tokio::test]
async fn test_disconnect_announced() {
    let controller = TestController::start().await.unwrap();
    let mut app = controller.app("watcher").unwrap();
    let switch = SimulatedSwitch::connect(controller.addr(), SwitchBehavior::new(4, 9))
        .await
        .unwrap();
    controller.wait_for_switch(9).await.unwrap();

    switch.disconnect().await;

    let payload = next_matching(
        &mut app,
        STEP_TIMEOUT,
        control_event(control::SWITCH_DISCONNECTED),
    )
    .await
    .unwrap();
    assert_eq!(payload, json!({"dpid": 9}));
    wait_until(STEP_TIMEOUT, || controller.manager().peer_count() == 0)
        .await
        .unwrap();
    assert!(app.list_switches().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let controller = TestController::start().await.unwrap();
    let first = SimulatedSwitch::connect(controller.addr(), SwitchBehavior::new(4, 3))
        .await
        .unwrap();
    controller.wait_for_switch(3).await.unwrap();
    first.disconnect().await;
    wait_until(STEP_TIMEOUT, || controller.manager().dpid_count() == 0)
        .await
        .unwrap();

    let _second = SimulatedSwitch::connect(controller.addr(), SwitchBehavior::new(6, 3))
        .await
        .unwrap();
    controller.wait_for_switch(3).await.unwrap();
    let switch = controller.manager().switch_by_dpid(3).unwrap();
    assert_eq!(switch.version(), Some(6));
}

#[tokio::test]
async fn test_stalled_features_fails_handshake() {
    let mut config = TestController::config();
    config.correlation.default_timeout_ms = 200;
    let controller = TestController::start_with(config).await.unwrap();
    let mut app = controller.app("watcher").unwrap();

    let switch = SimulatedSwitch::connect(
        controller.addr(),
        SwitchBehavior::new(4, 11).silent_features(),
    )
    .await
    .unwrap();

    let payload = next_matching(
        &mut app,
        STEP_TIMEOUT,
        control_event(control::HANDSHAKE_FAILED),
    )
    .await
    .unwrap();
    assert_eq!(payload, json!({"peer": switch.local_addr().to_string()}));
    assert!(controller.manager().list_switches().is_empty());
}

#[tokio::test]
async fn test_silent_switch_reported_unresponsive() {
    let mut config = TestController::config();
    config.keepalive.interval_ms = 50;
    config.keepalive.max_missed = 2;
    config.correlation.default_timeout_ms = 200;
    let controller = TestController::start_with(config).await.unwrap();
    let mut app = controller.app("watcher").unwrap();

    let mut behavior = SwitchBehavior::new(4, 12);
    behavior.answer_echo = false;
    let mut switch = SimulatedSwitch::connect(controller.addr(), behavior)
        .await
        .unwrap();

    let payload = next_matching(
        &mut app,
        Duration::from_secs(10),
        control_event(control::SWITCH_UNRESPONSIVE),
    )
    .await
    .unwrap();
    assert_eq!(payload, json!({"dpid": 12}));

    // Probes went out; the connection itself stays up
    switch
        .expect_type(MsgType::EchoRequest, STEP_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(controller.manager().list_switches(), vec![12]);
}
