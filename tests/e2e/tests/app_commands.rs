//! Applications talking to switches through the controller

use apps::{AppError, AppEvent};
use codec::{MessageBody, MsgType, OfpMessage};
use e2e_tests::framework::{next_matching, STEP_TIMEOUT};
use e2e_tests::{SimulatedSwitch, SwitchBehavior, TestController};
use serde_json::json;

async fn connected(controller: &TestController, version: u8, dpid: u64) -> SimulatedSwitch {
    let mut switch = SimulatedSwitch::connect(controller.addr(), SwitchBehavior::new(version, dpid))
        .await
        .unwrap();
    controller.wait_for_switch(dpid).await.unwrap();
    switch
        .expect_type(MsgType::FeaturesRequest, STEP_TIMEOUT)
        .await
        .unwrap();
    switch
}

#[tokio::test]
async fn test_packet_in_reaches_app() {
    let controller = TestController::start().await.unwrap();
    let mut app = controller.app("l2switch").unwrap();
    let switch = connected(&controller, 4, 0x10).await;

    switch.send_packet_in(&[0xde, 0xad]).unwrap();

    let (version, dpid, message) = next_matching(&mut app, STEP_TIMEOUT, |event| match event {
        AppEvent::OpenFlow {
            version,
            msg_type,
            dpid,
            message,
        } if msg_type == MsgType::PacketIn as u8 => Some((version, dpid, message)),
        _ => None,
    })
    .await
    .unwrap();
    assert_eq!(version, 4);
    assert_eq!(dpid, Some(0x10));
    match message.body {
        MessageBody::Raw { payload, .. } => assert_eq!(&payload[..], &[0xde, 0xad]),
        other => panic!("unexpected body {:?}", other),
    }
}

#[tokio::test]
async fn test_packet_ins_keep_switch_order() {
    let controller = TestController::start().await.unwrap();
    let mut app = controller.app("l2switch").unwrap();
    let switch = connected(&controller, 6, 0x11).await;

    for marker in 0..20u8 {
        switch.send_packet_in(&[marker]).unwrap();
    }

    for expected in 0..20u8 {
        let marker = next_matching(&mut app, STEP_TIMEOUT, |event| match event {
            AppEvent::OpenFlow { message, .. } => match message.body {
                MessageBody::Raw { payload, .. } => payload.first().copied(),
                _ => None,
            },
            _ => None,
        })
        .await
        .unwrap();
        assert_eq!(marker, expected);
    }
}

#[tokio::test]
async fn test_write_json_barrier_round_trip() {
    let controller = TestController::start().await.unwrap();
    let app = controller.app("flows").unwrap();
    let mut switch = connected(&controller, 4, 0x20).await;

    app.write_json(0x20, json!({"OFPBarrierRequest": {}}))
        .await
        .unwrap();

    let request = switch
        .expect_type(MsgType::BarrierRequest, STEP_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(request.version, 4);
    assert_ne!(request.xid, 0);
}

#[tokio::test]
async fn test_write_dpid_encoded_message() {
    let controller = TestController::start().await.unwrap();
    let app = controller.app("flows").unwrap();
    let mut switch = connected(&controller, 6, 0x21).await;

    app.write_dpid(0x21, &OfpMessage::new(6, MessageBody::BarrierRequest))
        .await
        .unwrap();
    switch
        .expect_type(MsgType::BarrierRequest, STEP_TIMEOUT)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_write_json_errors() {
    let controller = TestController::start().await.unwrap();
    let app = controller.app("flows").unwrap();
    let _switch = connected(&controller, 4, 0x22).await;

    let err = app
        .write_json(99, json!({"OFPBarrierRequest": {}}))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Rejected(ref msg) if msg == "Inexistent dpid: 99"));

    let err = app
        .write_json(0x22, json!({"OFPFlowModNope": {}}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Rejected(ref msg) if msg == "This 'OFPFlowModNope' doesn't map to an OpenFlow abstraction"
    ));
}

#[tokio::test]
async fn test_unanswered_barrier_fails_closed() {
    let mut config = TestController::config();
    config.correlation.default_timeout_ms = 200;
    config.correlation.fail_open = false;
    let controller = TestController::start_with(config).await.unwrap();
    let app = controller.app("flows").unwrap();

    let mut behavior = SwitchBehavior::new(4, 0x23);
    behavior.answer_barrier = false;
    let _switch = SimulatedSwitch::connect(controller.addr(), behavior)
        .await
        .unwrap();
    controller.wait_for_switch(0x23).await.unwrap();

    let err = app
        .write_json(0x23, json!({"OFPBarrierRequest": {}}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Rejected(ref msg) if msg == "Wrong OpenFlow message reply received"
    ));
}

#[tokio::test]
async fn test_app_message_forwarded_to_switch() {
    let controller = TestController::start().await.unwrap();
    let app = controller.app("sender").unwrap();
    let mut switch = connected(&controller, 4, 0x30).await;

    let reached = app
        .send(0x30, &OfpMessage::new(4, MessageBody::BarrierRequest))
        .await
        .unwrap();
    assert_eq!(reached, 1);

    let request = switch
        .expect_type(MsgType::BarrierRequest, STEP_TIMEOUT)
        .await
        .unwrap();
    assert_ne!(request.xid, 0);
}
