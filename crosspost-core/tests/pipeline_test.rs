mod common;

use chrono::{Duration as ChronoDuration, Local};
use crosspost_core::{PlatformAdapter, PublishRequest, PublishSection, PublishStage};

use common::{harness, MockAdapter, MOCK_SUCCESS_URL, MOCK_UPLOAD_URL};

#[tokio::test]
async fn happy_path_confirms_by_navigation_and_refreshes_the_blob() {
    let h = harness();
    let adapter = MockAdapter::new(&h.world);
    h.seed_session(adapter.platform_name());
    h.world
        .set_exported_state(br#"{"cookies":[{"name":"rotated"}]}"#);

    let mut request = PublishRequest::new(h.media_file("clip.mp4"), "title");
    request.description = "body".to_string();

    let result = h.pipeline().run(&adapter, &request, false).await;

    assert!(result.succeeded, "failure: {:?}", result.failure);
    assert_eq!(result.stage, PublishStage::Confirmed);
    assert_eq!(result.last_url.as_deref(), Some(MOCK_SUCCESS_URL));
    assert!(result.warnings.is_empty());
    // Post-publish cookie rotation reached the store.
    assert_eq!(
        h.store.load(adapter.platform_name()).unwrap().as_bytes(),
        br#"{"cookies":[{"name":"rotated"}]}"#
    );
    // All resources handed back.
    assert_eq!(h.world.sessions_closed(), h.world.sessions_opened());
    assert_eq!(h.pool.ref_count().await, 0);
}

#[tokio::test]
async fn tags_reach_the_adapter_in_insertion_order() {
    let h = harness();
    let adapter = MockAdapter::new(&h.world);
    h.seed_session(adapter.platform_name());

    let mut request = PublishRequest::new(h.media_file("clip.mp4"), "title");
    request.tags = vec!["a".into(), "b".into(), "c".into()];

    let result = h.pipeline().run(&adapter, &request, false).await;

    assert!(result.succeeded);
    assert_eq!(*adapter.tags_seen.borrow(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn one_bad_tag_degrades_instead_of_aborting() {
    let h = harness();
    let mut adapter = MockAdapter::new(&h.world);
    adapter.fail_tag = Some("b".to_string());
    h.seed_session(adapter.platform_name());

    let mut request = PublishRequest::new(h.media_file("clip.mp4"), "title");
    request.tags = vec!["a".into(), "b".into(), "c".into()];

    let result = h.pipeline().run(&adapter, &request, false).await;

    assert!(result.succeeded);
    assert_eq!(*adapter.tags_seen.borrow(), vec!["a", "c"]);
    assert!(result.warnings.iter().any(|warning| warning.contains("'b'")));
}

#[tokio::test]
async fn processing_budget_exhaustion_degrades_and_continues() {
    let h = harness();
    let mut adapter = MockAdapter::new(&h.world);
    adapter.processing_ready_on = None;
    h.seed_session(adapter.platform_name());

    let request = PublishRequest::new(h.media_file("clip.mp4"), "title");
    let result = h.pipeline().run(&adapter, &request, false).await;

    assert!(result.succeeded, "budget exhaustion must not fail the run");
    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.contains("media processing not confirmed")));
    assert!(!adapter.titles_seen.borrow().is_empty(), "metadata stage still ran");
}

#[tokio::test]
async fn confirmation_timeout_is_optimistic_success_with_last_url() {
    let h = harness();
    let mut adapter = MockAdapter::new(&h.world);
    adapter.publish_navigates_to = None;
    h.seed_session(adapter.platform_name());

    let request = PublishRequest::new(h.media_file("clip.mp4"), "title");
    let result = h.pipeline().run(&adapter, &request, false).await;

    assert!(result.succeeded);
    assert_eq!(result.stage, PublishStage::Submitted, "never observed Confirmed");
    assert_eq!(result.last_url.as_deref(), Some(MOCK_UPLOAD_URL));
    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.contains("confirmation not observed")));
}

#[tokio::test]
async fn title_is_truncated_to_the_platform_limit() {
    let h = harness();
    let adapter = MockAdapter::new(&h.world);
    h.seed_session(adapter.platform_name());

    let request = PublishRequest::new(h.media_file("clip.mp4"), "0123456789ABCDEF");
    let result = h.pipeline().run(&adapter, &request, false).await;

    assert!(result.succeeded);
    assert_eq!(*adapter.titles_seen.borrow(), vec!["0123456789"]);
}

#[tokio::test]
async fn cover_is_skipped_cleanly_when_the_file_is_missing() {
    let h = harness();
    let adapter = MockAdapter::new(&h.world);
    h.seed_session(adapter.platform_name());

    let mut request = PublishRequest::new(h.media_file("clip.mp4"), "title");
    request.cover_path = Some(h.dir.path().join("missing-cover.png"));

    let result = h.pipeline().run(&adapter, &request, false).await;

    assert!(result.succeeded);
    assert!(adapter.covers_seen.borrow().is_empty());
    assert_ne!(result.stage, PublishStage::CoverApplied);
}

#[tokio::test]
async fn cover_is_applied_when_the_file_exists() {
    let h = harness();
    let adapter = MockAdapter::new(&h.world);
    h.seed_session(adapter.platform_name());

    let cover = h.media_file("cover.png");
    let mut request = PublishRequest::new(h.media_file("clip.mp4"), "title");
    request.cover_path = Some(cover.clone());

    let result = h.pipeline().run(&adapter, &request, false).await;

    assert!(result.succeeded);
    assert_eq!(*adapter.covers_seen.borrow(), vec![cover]);
}

#[tokio::test]
async fn past_schedule_is_rejected_before_any_browser_work() {
    let h = harness();
    let adapter = MockAdapter::new(&h.world);
    h.seed_session(adapter.platform_name());

    let mut request = PublishRequest::new(h.media_file("clip.mp4"), "title");
    request.scheduled_at = Some(Local::now() - ChronoDuration::minutes(1));

    let result = h.pipeline().run(&adapter, &request, false).await;

    assert!(!result.succeeded);
    assert_eq!(result.stage, PublishStage::Init);
    assert_eq!(h.world.launches(), 0);
}

#[tokio::test]
async fn future_schedule_reaches_the_adapter() {
    let h = harness();
    let adapter = MockAdapter::new(&h.world);
    h.seed_session(adapter.platform_name());

    let at = Local::now() + ChronoDuration::hours(3);
    let mut request = PublishRequest::new(h.media_file("clip.mp4"), "title");
    request.scheduled_at = Some(at);

    let result = h.pipeline().run(&adapter, &request, false).await;

    assert!(result.succeeded);
    assert!(result.stage >= PublishStage::ScheduleApplied);
    assert_eq!(*adapter.schedule_seen.borrow(), Some(at));
}

#[tokio::test]
async fn missing_media_file_fails_at_validation() {
    let h = harness();
    let adapter = MockAdapter::new(&h.world);
    h.seed_session(adapter.platform_name());

    let request = PublishRequest::new(h.dir.path().join("nope.mp4"), "title");
    let result = h.pipeline().run(&adapter, &request, false).await;

    assert!(!result.succeeded);
    assert_eq!(result.stage, PublishStage::Init);
    assert!(result.failure.unwrap().contains("media file not found"));
}

#[tokio::test]
async fn auth_failure_is_terminal_and_touches_no_upload_page() {
    let h = harness();
    let adapter = MockAdapter::new(&h.world);
    // No seeded session and auto-login disabled.

    let request = PublishRequest::new(h.media_file("clip.mp4"), "title");
    let result = h.pipeline().run(&adapter, &request, false).await;

    assert!(!result.succeeded);
    assert!(result.failure.unwrap().contains("authentication"));
    assert!(!h.world.has_event(&format!("navigate {MOCK_UPLOAD_URL}")));
}

#[tokio::test]
async fn fatal_adapter_error_fails_the_run_but_still_cleans_up() {
    let h = harness();
    let mut adapter = MockAdapter::new(&h.world);
    adapter.fatal_on_title = true;
    h.seed_session(adapter.platform_name());

    let request = PublishRequest::new(h.media_file("clip.mp4"), "title");
    let result = h.pipeline().run(&adapter, &request, false).await;

    assert!(!result.succeeded);
    assert_eq!(result.stage, PublishStage::MediaProcessed);
    assert_eq!(h.world.sessions_closed(), h.world.sessions_opened());
    assert_eq!(h.pool.ref_count().await, 0);
    assert!(!h.world.alive(), "browser closed once the last lease returned");
}

#[tokio::test]
async fn extras_are_forwarded_opaquely() {
    let h = harness();
    let adapter = MockAdapter::new(&h.world);
    h.seed_session(adapter.platform_name());

    let mut request = PublishRequest::new(h.media_file("clip.mp4"), "title");
    request
        .extra
        .insert("location".to_string(), serde_json::json!("Shenzhen"));

    let result = h.pipeline().run(&adapter, &request, false).await;

    assert!(result.succeeded);
    assert_eq!(*adapter.extras_seen.borrow(), vec!["location"]);
}

#[tokio::test]
async fn longer_processing_wait_respects_the_configured_budget() {
    let h = harness();
    let mut adapter = MockAdapter::new(&h.world);
    adapter.processing_ready_on = Some(5);
    h.seed_session(adapter.platform_name());

    let pipeline = h.pipeline_with(PublishSection {
        poll_interval_ms: 1,
        poll_jitter_ms: 0,
        processing_max_attempts: 8,
        confirm_timeout_seconds: 0,
    });
    let request = PublishRequest::new(h.media_file("clip.mp4"), "title");
    let result = pipeline.run(&adapter, &request, false).await;

    assert!(result.succeeded);
    assert!(result.warnings.is_empty(), "signal arrived inside the budget");
    assert!(result.stage >= PublishStage::MediaProcessed);
}
