//! End-to-end publish workflows
//!
//! These tests drive complete runs through `GramcastService` with on-disk
//! state and a scripted Graph API:
//! - auto carousel and reel runs on fresh state
//! - exhausted video pool
//! - empty selective selection
//! - a container that never becomes ready
//! - selective publishing with and without caption overrides

use libgramcast::captions::StaticCaptionSource;
use libgramcast::credentials::StaticCredentialSource;
use libgramcast::platforms::mock::{GraphCall, MockGraph};
use libgramcast::platforms::ContainerStatus;
use libgramcast::selector::video_file_names;
use libgramcast::state::{Cursor, FileStateStore, StateStore};
use libgramcast::{
    Account, AccountStore, GramcastError, GramcastService, ImageNaming, RunState,
};
use std::sync::Arc;
use tempfile::TempDir;

const CAPTIONS: &str = "https://cdn.example/captions.txt";

struct Harness {
    service: GramcastService,
    state: Arc<FileStateStore>,
    graph: MockGraph,
    temp_dir: TempDir,
}

fn harness(graph: MockGraph) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let state = Arc::new(FileStateStore::new(temp_dir.path().join("state")));
    let service = GramcastService::with_parts(
        AccountStore::new(temp_dir.path().join("accounts.json")),
        state.clone(),
        Arc::new(StaticCaptionSource::new().with_list(CAPTIONS, &["a", "b"])),
        Arc::new(graph.clone()),
        Arc::new(
            StaticCredentialSource::new()
                .with("IG_TOKEN", "token")
                .with("IG_USER", "17841400000000000"),
        ),
    );
    Harness {
        service,
        state,
        graph,
        temp_dir,
    }
}

fn carousel(slides: u32) -> Account {
    Account::carousel("Cars", "cars", "http://x/", slides)
        .with_caption_url(CAPTIONS)
        .with_credentials("IG_TOKEN", "IG_USER")
        .with_naming(ImageNaming::Img)
}

fn reel() -> Account {
    Account::reel("Clips", "clips", "http://v/")
        .with_caption_url(CAPTIONS)
        .with_credentials("IG_TOKEN", "IG_USER")
}

#[tokio::test]
async fn test_fresh_carousel_run() {
    let h = harness(MockGraph::success());
    let account = carousel(2);

    let outcome = h.service.run_auto(&account).await.expect("run should succeed");
    assert_eq!(outcome.media_id, "media-1");
    assert_eq!(outcome.permalink, "https://www.instagram.com/p/mock/");

    let calls = h.graph.calls();
    assert_eq!(
        calls[0],
        GraphCall::ImageContainer {
            image_url: "http://x/img%20%281%29.jpg".to_string()
        }
    );
    assert!(calls.contains(&GraphCall::ImageContainer {
        image_url: "http://x/img%20%282%29.jpg".to_string()
    }));
    assert!(calls.contains(&GraphCall::CarouselContainer {
        children: vec!["container-1".to_string(), "container-2".to_string()],
        caption: "a".to_string(),
    }));

    let rotation = h.service.rotation(&account).unwrap();
    assert_eq!(rotation.image_cursor, 2);
    assert_eq!(rotation.caption_cursor, 1);

    // Legacy file shapes
    let state_dir = h.temp_dir.path().join("state");
    let image: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(state_dir.join("cars_image.json")).unwrap())
            .unwrap();
    assert_eq!(image["last_index"], 2);

    let status = h.service.get_status(&account).unwrap();
    assert_eq!(status.status, RunState::Success);
    assert_eq!(
        status.message,
        "Carousel published\nMedia ID: media-1\nPermalink: https://www.instagram.com/p/mock/"
    );
}

#[tokio::test]
async fn test_second_run_continues_rotation() {
    let h = harness(MockGraph::success());
    let account = carousel(2);

    h.service.run_auto(&account).await.unwrap();
    h.service.run_auto(&account).await.unwrap();

    assert!(h.graph.calls().contains(&GraphCall::CarouselContainer {
        children: vec!["container-4".to_string(), "container-5".to_string()],
        caption: "b".to_string(),
    }));
    assert!(h.graph.calls().contains(&GraphCall::ImageContainer {
        image_url: "http://x/img%20%284%29.jpg".to_string()
    }));

    let rotation = h.service.rotation(&account).unwrap();
    assert_eq!(rotation.image_cursor, 4);
    assert_eq!(rotation.caption_cursor, 2);
}

#[tokio::test]
async fn test_fresh_reel_run() {
    let h = harness(MockGraph::success().with_permalink(""));
    let account = reel();

    let outcome = h.service.run_auto(&account).await.unwrap();
    assert_eq!(outcome.permalink, "");

    let used = h.state.load_used_videos("clips").unwrap();
    assert_eq!(used.len(), 1);

    match &h.graph.calls()[0] {
        GraphCall::ReelContainer { video_url, caption } => {
            assert!(video_url.starts_with("http://v/vid"));
            assert_eq!(caption, "a");
        }
        other => panic!("Expected reel container first, got {:?}", other),
    }

    let status = h.service.get_status(&account).unwrap();
    assert_eq!(status.status, RunState::Success);
    assert!(status.message.starts_with("Reel published\n"));
    assert!(status.message.ends_with("Permalink: (not available)"));
}

#[tokio::test]
async fn test_exhausted_video_pool_fails_run() {
    let h = harness(MockGraph::success());
    let account = reel();
    h.state
        .save_used_videos("clips", &video_file_names().collect())
        .unwrap();

    assert!(h.service.run_auto(&account).await.is_none());

    let status = h.service.get_status(&account).unwrap();
    assert_eq!(status.status, RunState::Error);
    assert_eq!(status.message, "No videos left");
    assert_eq!(h.graph.total_calls(), 0);
    assert_eq!(h.state.load_cursor("clips", Cursor::Caption).unwrap(), 0);

    match h.service.try_run_auto(&account).await {
        Err(GramcastError::NoContentAvailable(_)) => {}
        other => panic!("Expected NoContentAvailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_legacy_encoded_used_list_excludes_published_videos() {
    let h = harness(MockGraph::success());
    let account = reel();
    let state_dir = h.temp_dir.path().join("state");
    std::fs::create_dir_all(&state_dir).unwrap();
    std::fs::write(
        state_dir.join("clips_video_used.json"),
        r#"{"used": ["vid.mp4", "vid%20%281%29.mp4"]}"#,
    )
    .unwrap();

    let candidates = h.service.preview_video_candidates(&account, 2).unwrap();
    assert_eq!(
        candidates,
        vec![
            "http://v/vid%20%282%29.mp4".to_string(),
            "http://v/vid%20%283%29.mp4".to_string()
        ]
    );
}

#[tokio::test]
async fn test_empty_selection_is_rejected_before_remote_calls() {
    let h = harness(MockGraph::success());
    let account = carousel(2);

    let err = h
        .service
        .publish_selected_carousel(&account, &[], Some("caption"))
        .await
        .unwrap_err();
    assert!(matches!(err, GramcastError::NoSelection));
    assert_eq!(err.exit_code(), 3);

    assert_eq!(h.graph.total_calls(), 0);
    assert_eq!(h.service.get_status(&account).unwrap().status, RunState::Never);
}

#[tokio::test]
async fn test_container_never_ready_aborts_run() {
    let h = harness(MockGraph::never_ready(2));
    let account = carousel(3);

    assert!(h.service.run_auto(&account).await.is_none());

    assert_eq!(h.graph.image_container_calls(), 2);
    assert_eq!(h.graph.carousel_container_calls(), 0);
    assert_eq!(h.graph.publish_calls(), 0);

    // The image commit happened before the failure; the caption was never reached
    let rotation = h.service.rotation(&account).unwrap();
    assert_eq!(rotation.image_cursor, 3);
    assert_eq!(rotation.caption_cursor, 0);

    let status = h.service.get_status(&account).unwrap();
    assert_eq!(status.status, RunState::Error);
    assert_eq!(status.message, "Media container container-2 failed readiness");
}

#[tokio::test]
async fn test_container_error_status_aborts_without_exhausting_polls() {
    let h = harness(MockGraph::success().with_status(1, ContainerStatus::Error));
    let account = reel();

    assert!(h.service.run_auto(&account).await.is_none());
    assert_eq!(
        h.graph.count(|c| matches!(c, GraphCall::Status { .. })),
        1
    );
    assert_eq!(h.graph.publish_calls(), 0);
    // The video was picked before the upload and stays used
    assert_eq!(h.state.load_used_videos("clips").unwrap().len(), 1);
}

#[tokio::test]
async fn test_publish_failure_is_recorded() {
    let h = harness(MockGraph::publish_failure("(#9007) Media ID is not available"));
    let account = carousel(1);

    let err = h.service.try_run_auto(&account).await.unwrap_err();
    assert!(err.to_string().contains("media_publish error"));

    let status = h.service.get_status(&account).unwrap();
    assert_eq!(status.status, RunState::Error);
    assert_eq!(status.message, err.to_string());
}

#[tokio::test]
async fn test_selective_carousel_with_caption_override() {
    let h = harness(MockGraph::success());
    let account = carousel(2);
    let selected = vec![
        "http://x/img%20%283%29.jpg".to_string(),
        "http://x/img%20%285%29.jpg".to_string(),
        "http://x/img%20%286%29.jpg".to_string(),
    ];

    let outcome = h
        .service
        .publish_selected_carousel(&account, &selected, Some("my own caption"))
        .await
        .unwrap();
    assert_eq!(outcome.media_id, "media-1");

    assert!(h.graph.calls().contains(&GraphCall::CarouselContainer {
        children: vec![
            "container-1".to_string(),
            "container-2".to_string(),
            "container-3".to_string()
        ],
        caption: "my own caption".to_string(),
    }));

    let rotation = h.service.rotation(&account).unwrap();
    assert_eq!(rotation.image_cursor, 3);
    assert_eq!(rotation.caption_cursor, 0);

    let status = h.service.get_status(&account).unwrap();
    assert!(status.message.starts_with("Carousel (manual) published\n"));
}

#[tokio::test]
async fn test_selective_carousel_failure_keeps_image_cursor() {
    let h = harness(MockGraph::upload_failure("unsupported image"));
    let account = carousel(2);

    let err = h
        .service
        .publish_selected_carousel(&account, &["http://x/img%20%281%29.jpg".to_string()], None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unsupported image"));

    let rotation = h.service.rotation(&account).unwrap();
    assert_eq!(rotation.image_cursor, 0);
    assert_eq!(h.service.get_status(&account).unwrap().status, RunState::Error);
}

#[tokio::test]
async fn test_selective_reel_uses_rotating_caption_and_marks_video() {
    let h = harness(MockGraph::success());
    let account = reel();

    let candidates = h.service.preview_video_candidates(&account, 8).unwrap();
    assert_eq!(candidates.len(), 8);
    let chosen = candidates[2].clone();
    assert_eq!(chosen, "http://v/vid%20%282%29.mp4");

    h.service
        .publish_selected_reel(&account, &chosen, Some(""))
        .await
        .unwrap();

    assert_eq!(
        h.graph.calls()[0],
        GraphCall::ReelContainer {
            video_url: chosen.clone(),
            caption: "a".to_string(),
        }
    );
    assert!(h
        .state
        .load_used_videos("clips")
        .unwrap()
        .contains("vid (2).mp4"));
    assert!(!h
        .service
        .preview_video_candidates(&account, 8)
        .unwrap()
        .contains(&chosen));
    assert_eq!(h.state.load_cursor("clips", Cursor::Caption).unwrap(), 1);
}
