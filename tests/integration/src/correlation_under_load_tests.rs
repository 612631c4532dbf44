//! Many concurrent sessions sharing one reply queue

use crate::test_utils::*;
use skyrelay_core::WorkspaceId;
use skyrelay_live::{SessionStatus, VideoQuality};
use std::sync::Arc;
use std::time::Duration;

const GATEWAY: &str = "4TADKAQ000002J";
const FLEET: usize = 32;

fn fleet_sns() -> Vec<String> {
    (0..FLEET).map(|i| format!("1581F5BMD23230{i:02}")).collect()
}

fn fleet_stack() -> Arc<TestStack> {
    let sns = fleet_sns();
    let bindings: Vec<(&str, &str)> = sns.iter().map(|sn| (sn.as_str(), "ws-fleet")).collect();
    let stack = TestStack::new(Duration::from_secs(2), &bindings);

    let devices: Vec<(&str, &[u8])> = sns
        .iter()
        .map(|sn| (sn.as_str(), &[1u8, 2, 3][..]))
        .collect();
    let recorded = stack
        .ingress
        .handle_raw(&capacity_report(GATEWAY, &devices))
        .unwrap();
    assert_eq!(recorded, FLEET);

    stack.set_behaviour(DeviceBehaviour {
        max_delay: Duration::from_millis(40),
        ..DeviceBehaviour::default()
    });
    Arc::new(stack)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_each_get_their_own_reply() {
    let stack = fleet_stack();
    assert_eq!(stack.capabilities.get(&WorkspaceId::new("ws-fleet")).len(), FLEET);

    let handles: Vec<_> = fleet_sns()
        .into_iter()
        .map(|sn| {
            let stack = Arc::clone(&stack);
            tokio::spawn(async move {
                stack
                    .controller
                    .start(start_request(&sn, VideoQuality::Smooth))
                    .await
                    .map(|session| (sn, session))
            })
        })
        .collect();

    for handle in handles {
        let (sn, session) = handle.await.unwrap().unwrap();
        assert_eq!(session.video_id, video_id(&sn));
        assert_eq!(session.status, SessionStatus::Live);
    }

    assert_eq!(stack.controller.active_sessions().len(), FLEET);
    assert!(stack.registry.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_operations_across_sessions() {
    let stack = fleet_stack();
    for sn in fleet_sns() {
        stack
            .controller
            .start(start_request(&sn, VideoQuality::Smooth))
            .await
            .unwrap();
    }

    // Even devices change quality while odd devices stop, all at once
    let handles: Vec<_> = fleet_sns()
        .into_iter()
        .enumerate()
        .map(|(i, sn)| {
            let stack = Arc::clone(&stack);
            tokio::spawn(async move {
                let id = video_id(&sn);
                if i % 2 == 0 {
                    stack
                        .controller
                        .update_quality(&id, VideoQuality::HighDefinition)
                        .await
                } else {
                    stack.controller.stop(&id).await
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let active = stack.controller.active_sessions();
    assert_eq!(active.len(), FLEET / 2);
    assert!(active
        .iter()
        .all(|s| s.quality == VideoQuality::HighDefinition));
    assert!(stack.registry.is_empty());
    assert_eq!(stack.published_count(), FLEET * 2);
}
