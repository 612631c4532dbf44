//! Capacity report to stream teardown through the full stack

use crate::test_utils::*;
use skyrelay_c2_router::{DispatchOutcome, GatewayError, ReplyEnvelope, ServiceMethod, ServiceReply};
use skyrelay_core::{DeviceSn, WorkspaceId};
use skyrelay_live::{LiveError, SessionStatus, VideoChannel, VideoQuality};
use std::sync::Arc;
use std::time::Duration;

const GATEWAY: &str = "4TADKAQ000002J";
const AIRCRAFT: &str = "1581F5BMD2323001";

fn stack() -> TestStack {
    let stack = TestStack::new(
        Duration::from_millis(500),
        &[(AIRCRAFT, "ws-1"), ("1581F5BMD2323002", "ws-1")],
    );
    let recorded = stack
        .ingress
        .handle_raw(&capacity_report(GATEWAY, &[(AIRCRAFT, &[2u8, 3][..])]))
        .unwrap();
    assert_eq!(recorded, 1);
    stack
}

#[tokio::test]
async fn test_capacity_report_visible_per_workspace() {
    let stack = stack();

    let capacity = stack.capabilities.get(&WorkspaceId::new("ws-1"));
    assert_eq!(capacity.len(), 1);
    assert_eq!(capacity[0].gateway_sn, DeviceSn::new(GATEWAY));
    let channel = VideoChannel::new("39-0-7", "normal-0");
    assert!(capacity[0].supports(&channel, VideoQuality::HighDefinition));
    assert!(!capacity[0].supports(&channel, VideoQuality::UltraHighDefinition));

    assert!(stack.capabilities.get(&WorkspaceId::new("ws-2")).is_empty());
}

#[tokio::test]
async fn test_unbound_device_in_report_is_skipped() {
    let stack = stack();

    let recorded = stack
        .ingress
        .handle_raw(&capacity_report(
            GATEWAY,
            &[(AIRCRAFT, &[0u8, 1, 2, 3, 4][..]), ("UNBOUND-SN", &[3u8][..])],
        ))
        .unwrap();
    assert_eq!(recorded, 1);
    assert!(stack
        .capabilities
        .get_device(&DeviceSn::new("UNBOUND-SN"))
        .is_none());

    // The second report replaced the first wholesale
    let capability = stack.capabilities.get_device(&DeviceSn::new(AIRCRAFT)).unwrap();
    assert!(capability.supports(
        &VideoChannel::new("39-0-7", "normal-0"),
        VideoQuality::UltraHighDefinition
    ));
}

#[tokio::test]
async fn test_full_stream_lifecycle() {
    let stack = stack();

    let session = stack
        .controller
        .start(start_request(AIRCRAFT, VideoQuality::HighDefinition))
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Live);
    assert_eq!(stack.controller.active_sessions().len(), 1);

    let session = stack
        .controller
        .update_quality(&video_id(AIRCRAFT), VideoQuality::StandardDefinition)
        .await
        .unwrap();
    assert_eq!(session.quality, VideoQuality::StandardDefinition);

    let session = stack.controller.stop(&video_id(AIRCRAFT)).await.unwrap();
    assert_eq!(session.status, SessionStatus::Stopped);
    assert!(stack.controller.active_sessions().is_empty());

    let methods: Vec<ServiceMethod> = stack
        .published
        .lock()
        .unwrap()
        .iter()
        .map(|e| e.method)
        .collect();
    assert_eq!(
        methods,
        vec![
            ServiceMethod::LiveStartPush,
            ServiceMethod::LiveSetQuality,
            ServiceMethod::LiveStopPush,
        ]
    );
    assert!(stack.registry.is_empty());
    // Counters are bumped just after the hand-off, so give the last worker a moment
    for _ in 0..50 {
        if stack.dispatcher.stats().delivered == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(stack.dispatcher.stats().delivered, 3);
}

#[tokio::test]
async fn test_unsupported_quality_never_published() {
    let stack = stack();

    let err = stack
        .controller
        .start(start_request(AIRCRAFT, VideoQuality::UltraHighDefinition))
        .await
        .unwrap_err();
    assert!(matches!(err, LiveError::UnsupportedCapability { .. }));
    assert_eq!(stack.published_count(), 0);
}

#[tokio::test]
async fn test_device_failure_code_surfaces() {
    let stack = stack();
    stack.set_behaviour(DeviceBehaviour {
        result: 513003,
        ..DeviceBehaviour::default()
    });

    let err = stack
        .controller
        .start(start_request(AIRCRAFT, VideoQuality::HighDefinition))
        .await
        .unwrap_err();
    assert!(matches!(err, LiveError::DeviceReportedFailure { code: 513003, .. }));
    assert!(stack.controller.session(&video_id(AIRCRAFT)).is_none());
}

#[tokio::test]
async fn test_timeout_then_late_reply_is_orphaned() {
    let stack = TestStack::new(Duration::from_millis(50), &[(AIRCRAFT, "ws-1")]);
    stack
        .ingress
        .handle_raw(&capacity_report(GATEWAY, &[(AIRCRAFT, &[3u8][..])]))
        .unwrap();
    stack.set_behaviour(DeviceBehaviour {
        silent: true,
        ..DeviceBehaviour::default()
    });

    let err = stack
        .controller
        .start(start_request(AIRCRAFT, VideoQuality::HighDefinition))
        .await
        .unwrap_err();
    assert!(matches!(err, LiveError::Gateway(GatewayError::Timeout { .. })));
    assert!(stack.registry.is_empty());
    assert!(stack.controller.session(&video_id(AIRCRAFT)).is_none());

    // Deliver the swallowed call's reply now that nobody waits for it
    let request = stack.published.lock().unwrap()[0].clone();
    let reply = ReplyEnvelope::answering(&request, ServiceReply::ok());
    assert_eq!(stack.dispatcher.handle(reply), DispatchOutcome::Orphaned);
    assert!(stack.controller.session(&video_id(AIRCRAFT)).is_none());
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_start() {
    let stack = stack();
    stack.set_behaviour(DeviceBehaviour {
        silent: true,
        ..DeviceBehaviour::default()
    });

    let gateway = Arc::clone(&stack.gateway);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        gateway.shutdown();
    });

    let err = stack
        .controller
        .start(start_request(AIRCRAFT, VideoQuality::HighDefinition))
        .await
        .unwrap_err();
    assert!(matches!(err, LiveError::Gateway(GatewayError::Cancelled { .. })));
    assert!(stack.registry.is_empty());
}
