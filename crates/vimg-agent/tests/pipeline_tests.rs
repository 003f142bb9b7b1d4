// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Orchestrator pipeline tests through the test harness.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use vimg_core::{Destination, FailureKind, FilterMode, HostResponse};
use vimg_test_utils::{TestHarness, fixtures};
use vimg_transfer::TransferClient;

fn is_image(response: &HostResponse) -> bool {
    matches!(response, HostResponse::Image { .. })
}

#[tokio::test]
async fn concurrent_requests_from_one_origin_respect_the_ceiling() {
    let harness = Arc::new(
        TestHarness::builder()
            .with_rate_limit(3, Duration::from_secs(60))
            .with_generator_delay(Duration::from_millis(20))
            .build()
            .await
            .unwrap(),
    );

    let calls = (0..10).map(|_| {
        let harness = harness.clone();
        async move { harness.send("busy-group", "a cat").await }
    });
    let responses = join_all(calls).await;

    let admitted = responses.iter().filter(|r| is_image(r)).count();
    let limited = responses
        .iter()
        .filter(|r| {
            matches!(
                r,
                HostResponse::Failure {
                    kind: FailureKind::RateLimited,
                    ..
                }
            )
        })
        .count();
    assert_eq!(admitted, 3);
    assert_eq!(limited, 7);
    assert_eq!(harness.generator.call_count(), 3);
}

#[tokio::test]
async fn window_expiry_readmits_origin() {
    let harness = TestHarness::builder()
        .with_rate_limit(2, Duration::from_millis(200))
        .build()
        .await
        .unwrap();

    assert!(is_image(&harness.send("g", "one").await));
    assert!(is_image(&harness.send("g", "two").await));
    assert!(!is_image(&harness.send("g", "three").await));

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(is_image(&harness.send("g", "four").await));
}

#[tokio::test]
async fn whitelist_and_blacklist_decide_per_origin() {
    let whitelist = TestHarness::builder()
        .with_filter(FilterMode::Whitelist, ["A"])
        .build()
        .await
        .unwrap();
    assert!(is_image(&whitelist.send("A", "x").await));
    assert!(!is_image(&whitelist.send("B", "x").await));

    let blacklist = TestHarness::builder()
        .with_filter(FilterMode::Blacklist, ["A"])
        .build()
        .await
        .unwrap();
    assert!(!is_image(&blacklist.send("A", "x").await));
    assert!(is_image(&blacklist.send("B", "x").await));
}

#[tokio::test]
async fn remote_delivery_reports_peer_path() {
    let harness = TestHarness::builder()
        .with_destination(Destination::Remote {
            host: "10.0.0.2".into(),
            port: 3658,
        })
        .build()
        .await
        .unwrap();

    let HostResponse::Image {
        local_path,
        reply_path,
        delivery_warning,
        ..
    } = harness.send("g", "x").await
    else {
        panic!("expected an image");
    };
    assert!(reply_path.starts_with("/peer/"));
    assert_ne!(reply_path, local_path.display().to_string());
    assert!(delivery_warning.is_none());
}

#[tokio::test]
async fn refused_peer_degrades_to_local_path() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let destination = Destination::Remote {
        host: "127.0.0.1".into(),
        port,
    };
    let transfer = TransferClient::new(
        destination.clone(),
        Duration::from_secs(1),
        Duration::from_secs(1),
        false,
    );
    let harness = TestHarness::builder()
        .with_destination(destination)
        .with_delivery(Arc::new(transfer))
        .build()
        .await
        .unwrap();

    let HostResponse::Image {
        local_path,
        reply_path,
        delivery_warning,
        ..
    } = harness.send("g", "x").await
    else {
        panic!("expected an image");
    };
    assert_eq!(reply_path, local_path.display().to_string());
    assert!(local_path.is_file());
    assert!(delivery_warning.unwrap().contains(&format!("127.0.0.1:{port}")));
}

#[tokio::test]
async fn edit_command_forwards_reference_images() {
    let harness = TestHarness::builder().build().await.unwrap();
    let response = harness
        .message(Some("g"), "/改图 add a blue neon background", vec![fixtures::reference_png()])
        .await
        .unwrap();
    assert!(is_image(&response));

    let request = harness.generator.last_request().await.unwrap();
    assert_eq!(request.prompt(), "add a blue neon background");
    assert_eq!(request.reference_images().len(), 1);
}

#[tokio::test]
async fn filtered_origin_gets_no_reply() {
    let harness = TestHarness::builder()
        .with_filter(FilterMode::Blacklist, ["muted"])
        .build()
        .await
        .unwrap();
    assert!(harness.message(Some("muted"), "/imagine x", Vec::new()).await.is_none());
    assert!(harness.message(Some("muted"), "/imghelp", Vec::new()).await.is_none());
    assert_eq!(harness.generator.call_count(), 0);
}
