use super::*;
use crate::test_support::FakeBackend;
use shared::{
    domain::Preset,
    error::ErrorCode,
    protocol::{ComfortResponse, PreferencesResponse},
};

const DEBOUNCE: Duration = Duration::from_millis(500);

fn build(backend: &Arc<FakeBackend>) -> (ComfortEstimationController, CancellationToken) {
    let (events, _) = broadcast::channel(16);
    let root = CancellationToken::new();
    let controller = ComfortEstimationController::new(backend.clone(), DEBOUNCE, events, &root);
    (controller, root)
}

#[tokio::test(start_paused = true)]
async fn burst_of_toggles_sends_one_request_with_the_final_set() {
    let backend = FakeBackend::shared();
    let (controller, _root) = build(&backend);

    controller.toggle_avoid_hour(8).await.expect("toggle");
    tokio::time::sleep(Duration::from_millis(100)).await;
    controller.toggle_avoid_hour(9).await.expect("toggle");
    tokio::time::sleep(Duration::from_millis(100)).await;
    controller.toggle_avoid_hour(10).await.expect("toggle");
    controller.toggle_avoid_hour(8).await.expect("toggle off");

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(backend.comfort_calls().is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let calls = backend.comfort_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].to_vec(), vec![9, 10]);

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.preferences.comfort_level, 7.5);
    assert_eq!(snapshot.advice.as_deref(), Some("Moderate comfort"));
    assert!(!snapshot.calculating);
}

#[tokio::test(start_paused = true)]
async fn edits_apply_locally_before_the_recompute() {
    let backend = FakeBackend::shared();
    let (controller, _root) = build(&backend);

    let hours = controller.toggle_avoid_hour(22).await.expect("toggle");
    assert!(hours.contains(22));
    assert!(controller.snapshot().await.preferences.avoid_hours.contains(22));
    assert!(controller.has_pending_recompute().await);
}

#[tokio::test(start_paused = true)]
async fn night_sleeper_preset_sends_nine_hours() {
    let backend = FakeBackend::shared();
    let (controller, _root) = build(&backend);

    let hours = controller
        .apply_preset(Preset::NightSleeper.hours().to_vec())
        .await
        .expect("preset");
    assert_eq!(hours.len(), 9);

    tokio::time::sleep(Duration::from_millis(600)).await;
    let calls = backend.comfort_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].to_vec(), vec![0, 1, 2, 3, 4, 5, 6, 22, 23]);
}

#[tokio::test(start_paused = true)]
async fn invalid_hours_are_rejected_without_scheduling() {
    let backend = FakeBackend::shared();
    let (controller, _root) = build(&backend);

    let err = controller.toggle_avoid_hour(24).await.expect_err("out of range");
    assert_eq!(err.code, ErrorCode::Validation);
    let err = controller.apply_preset([1, 2, 99]).await.expect_err("out of range");
    assert!(err.is_validation());

    assert!(!controller.has_pending_recompute().await);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(backend.comfort_calls().is_empty());
    assert!(controller.snapshot().await.preferences.avoid_hours.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_recompute_keeps_the_edit_and_surfaces_a_notice() {
    let backend = FakeBackend::shared();
    FakeBackend::set(
        &backend.comfort_result,
        Err(ApiError::server(500, "comfort model unavailable")),
    );
    let (events, mut rx) = broadcast::channel(16);
    let root = CancellationToken::new();
    let controller = ComfortEstimationController::new(backend.clone(), DEBOUNCE, events, &root);

    controller.toggle_avoid_hour(7).await.expect("toggle");
    tokio::time::sleep(Duration::from_millis(600)).await;

    let snapshot = controller.snapshot().await;
    assert!(snapshot.preferences.avoid_hours.contains(7));
    assert_eq!(snapshot.preferences.comfort_level, 5.0);
    assert!(!snapshot.calculating);
    assert_eq!(
        snapshot.notice.as_ref().map(|err| err.message.as_str()),
        Some("comfort model unavailable")
    );

    let mut saw_notice = false;
    while let Ok(event) = rx.try_recv() {
        if let ClientEvent::Notice(notice) = event {
            assert_eq!(notice.context, NoticeContext::ComfortRecompute);
            saw_notice = true;
        }
    }
    assert!(saw_notice);

    controller.dismiss_notice().await;
    assert!(controller.snapshot().await.notice.is_none());
}

#[tokio::test(start_paused = true)]
async fn out_of_range_scores_are_clamped() {
    let backend = FakeBackend::shared();
    FakeBackend::set(
        &backend.comfort_result,
        Ok(ComfortResponse {
            comfort_level: Some(14.0),
            advice: "  ".into(),
        }),
    );
    let (controller, _root) = build(&backend);

    controller.toggle_avoid_hour(3).await.expect("toggle");
    tokio::time::sleep(Duration::from_millis(600)).await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.preferences.comfort_level, 10.0);
    assert!(snapshot.advice.is_none());
}

#[tokio::test(start_paused = true)]
async fn stale_answers_do_not_overwrite_newer_ones() {
    let backend = FakeBackend::shared();
    FakeBackend::set(&backend.comfort_latency, Some(Duration::from_secs(2)));
    let (controller, _root) = build(&backend);

    controller.toggle_avoid_hour(1).await.expect("toggle");
    // First recompute is now in flight for 2s.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(controller.snapshot().await.calculating);

    FakeBackend::set(
        &backend.comfort_result,
        Ok(ComfortResponse {
            comfort_level: Some(3.0),
            advice: "Fewer hours avoided".into(),
        }),
    );
    FakeBackend::set(&backend.comfort_latency, Some(Duration::from_millis(100)));
    controller.toggle_avoid_hour(2).await.expect("toggle");
    tokio::time::sleep(Duration::from_millis(700)).await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.preferences.comfort_level, 3.0);

    // The first answer lands later and is ignored.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(controller.snapshot().await.preferences.comfort_level, 3.0);
    assert_eq!(backend.comfort_calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_the_pending_timer() {
    let backend = FakeBackend::shared();
    let (controller, _root) = build(&backend);

    controller.toggle_avoid_hour(5).await.expect("toggle");
    controller.shutdown().await;

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(backend.comfort_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn root_cancellation_stops_the_timer() {
    let backend = FakeBackend::shared();
    let (controller, root) = build(&backend);

    controller.toggle_avoid_hour(5).await.expect("toggle");
    root.cancel();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(backend.comfort_calls().is_empty());
}

#[tokio::test]
async fn load_replaces_local_preferences() {
    let backend = FakeBackend::shared();
    FakeBackend::set(
        &backend.preferences,
        Ok(PreferencesResponse {
            avoid_hours: AvoidHours::new([23, 0]).expect("hours"),
            priority_appliances: vec!["Dryer".into()],
            comfort_level: None,
        }),
    );
    let (controller, _root) = build(&backend);

    let snapshot = controller.load().await.expect("load");
    assert_eq!(snapshot.preferences.avoid_hours.to_vec(), vec![0, 23]);
    assert_eq!(snapshot.preferences.priority_appliances, vec!["Dryer"]);
    assert_eq!(snapshot.preferences.comfort_level, 5.0);
}

#[tokio::test]
async fn load_failure_keeps_local_state() {
    let backend = FakeBackend::shared();
    FakeBackend::set(
        &backend.preferences,
        Err(ApiError::transport("connection refused")),
    );
    let (controller, _root) = build(&backend);

    let err = controller.load().await.expect_err("offline");
    assert_eq!(err.code, ErrorCode::Transport);
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.preferences, Preferences::default());
    assert!(snapshot.notice.is_some());
}

#[tokio::test]
async fn save_sends_hours_and_priorities() {
    let backend = FakeBackend::shared();
    FakeBackend::set(
        &backend.save_preferences_result,
        Ok(shared::protocol::SavePreferencesResponse {
            comfort_level: Some(6.0),
            advice: "Saved".into(),
        }),
    );
    let (controller, _root) = build(&backend);

    controller
        .apply_preset(Preset::EarlyBird.hours().to_vec())
        .await
        .expect("preset");
    let priorities = controller
        .set_priority_appliances(vec![" Dryer ".into(), String::new(), "Oven".into()])
        .await;
    assert_eq!(priorities, vec!["Dryer", "Oven"]);
    controller.cancel_pending().await;

    let snapshot = controller.save().await.expect("save");
    assert_eq!(snapshot.preferences.comfort_level, 6.0);
    assert_eq!(snapshot.advice.as_deref(), Some("Saved"));

    let saved = backend.saved_preferences.lock().expect("lock").clone();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].avoid_hours.to_vec(), vec![20, 21, 22, 23]);
    assert_eq!(saved[0].priority_appliances, vec!["Dryer", "Oven"]);
}

#[tokio::test(start_paused = true)]
async fn load_discards_a_recompute_for_the_replaced_set() {
    let backend = FakeBackend::shared();
    FakeBackend::set(&backend.comfort_latency, Some(Duration::from_secs(2)));
    FakeBackend::set(
        &backend.preferences,
        Ok(PreferencesResponse {
            avoid_hours: AvoidHours::new([12]).expect("hours"),
            priority_appliances: Vec::new(),
            comfort_level: Some(9.0),
        }),
    );
    let (controller, _root) = build(&backend);

    controller.toggle_avoid_hour(1).await.expect("toggle");
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(controller.snapshot().await.calculating);

    let loaded = controller.load().await.expect("load");
    assert!(!loaded.calculating);
    assert_eq!(loaded.preferences.comfort_level, 9.0);

    tokio::time::sleep(Duration::from_secs(3)).await;
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.preferences.avoid_hours.to_vec(), vec![12]);
    assert_eq!(snapshot.preferences.comfort_level, 9.0);
    assert!(snapshot.advice.is_none());
}

#[tokio::test(start_paused = true)]
async fn save_discards_a_recompute_already_in_flight() {
    let backend = FakeBackend::shared();
    FakeBackend::set(&backend.comfort_latency, Some(Duration::from_secs(2)));
    FakeBackend::set(
        &backend.save_preferences_result,
        Ok(shared::protocol::SavePreferencesResponse {
            comfort_level: Some(6.0),
            advice: "Saved".into(),
        }),
    );
    let (controller, _root) = build(&backend);

    controller.toggle_avoid_hour(4).await.expect("toggle");
    tokio::time::sleep(Duration::from_millis(600)).await;
    controller.save().await.expect("save");

    tokio::time::sleep(Duration::from_secs(3)).await;
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.preferences.comfort_level, 6.0);
    assert_eq!(snapshot.advice.as_deref(), Some("Saved"));
    assert!(!snapshot.calculating);
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_the_calculating_state() {
    let backend = FakeBackend::shared();
    FakeBackend::set(&backend.comfort_latency, Some(Duration::from_millis(300)));
    let (events, mut rx) = broadcast::channel(16);
    let root = CancellationToken::new();
    let controller = ComfortEstimationController::new(backend.clone(), DEBOUNCE, events, &root);

    controller.toggle_avoid_hour(6).await.expect("toggle");
    tokio::time::sleep(Duration::from_secs(1)).await;

    let calculating: Vec<bool> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter_map(|event| match event {
            ClientEvent::ComfortUpdated(snapshot) => Some(snapshot.calculating),
            _ => None,
        })
        .collect();
    assert_eq!(calculating, vec![false, true, false]);
}
