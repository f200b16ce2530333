use super::*;
use crate::test_support::{running, FakeBackend};
use shared::domain::TrainingStatus;
use std::time::Duration;

fn client(backend: &Arc<FakeBackend>) -> EnergyClient {
    EnergyClient::with_backend(backend.clone(), &ClientSettings::default())
}

#[test]
fn connect_rejects_an_invalid_base_url() {
    let settings = ClientSettings {
        api_base_url: "not a url".into(),
        ..ClientSettings::default()
    };
    let err = EnergyClient::connect(&settings).err().expect("invalid url");
    assert!(err.is_validation());
}

#[tokio::test]
async fn connect_uses_the_configured_backend() {
    let client = EnergyClient::connect(&ClientSettings::default()).expect("client");
    assert_eq!(client.settings().api_base_url, "http://localhost:8000/api");
    assert!(!client.is_shut_down());
}

#[tokio::test(start_paused = true)]
async fn training_uses_the_avoid_set_being_edited() {
    let backend = FakeBackend::shared();
    backend.script_status([running("Episode 1/10")]);
    let client = client(&backend);

    client.comfort().toggle_avoid_hour(21).await.expect("toggle");
    client.comfort().toggle_avoid_hour(3).await.expect("toggle");
    assert_eq!(
        client.train_with_current_preferences().await.expect("train"),
        StartOutcome::Started
    );

    let starts = backend.training_starts.lock().expect("lock").clone();
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].avoid_hours.to_vec(), vec![3, 21]);
    assert_eq!(starts[0].prices.len(), 24);
}

#[tokio::test(start_paused = true)]
async fn logout_clears_session_pending_recompute_and_transcript() {
    let store = LocalStore::new();
    store.set("unrelated", "kept").await;
    let backend = FakeBackend::shared();
    let client =
        EnergyClient::with_local_store(backend.clone(), &ClientSettings::default(), store.clone());

    client.session().begin().await;
    client.comfort().toggle_avoid_hour(12).await.expect("toggle");
    client
        .conversation()
        .send_suggestion("Tell me about energy optimization")
        .await
        .expect("chat");
    assert_eq!(client.conversation().transcript().await.len(), 3);

    client.logout().await;

    assert!(client.session().marker().await.is_none());
    assert_eq!(store.get("unrelated").await.as_deref(), Some("kept"));
    assert!(!client.comfort().has_pending_recompute().await);
    assert_eq!(client.conversation().transcript().await.len(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(backend.comfort_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_every_timer_and_poll() {
    let backend = FakeBackend::shared();
    backend.script_status([running("a"), running("b"), running("c")]);
    let client = client(&backend);

    client.comfort().toggle_avoid_hour(1).await.expect("toggle");
    client.train_with_current_preferences().await.expect("train");
    client.prices().spawn_auto_refresh().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    client.shutdown().await;
    assert!(client.is_shut_down());
    let live_calls = backend.live_calls.load(std::sync::atomic::Ordering::SeqCst);

    tokio::time::sleep(Duration::from_secs(900)).await;
    assert!(backend.comfort_calls().is_empty());
    assert_eq!(backend.status_call_count(), 0);
    assert_eq!(
        backend.live_calls.load(std::sync::atomic::Ordering::SeqCst),
        live_calls
    );
    assert_eq!(
        client.training().snapshot().await.status,
        TrainingStatus::Running
    );
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_controller_events() {
    let backend = FakeBackend::shared();
    let client = client(&backend);
    let mut events = client.subscribe_events();

    client.comfort().toggle_avoid_hour(9).await.expect("toggle");
    match events.recv().await.expect("event") {
        ClientEvent::ComfortUpdated(snapshot) => {
            assert!(snapshot.preferences.avoid_hours.contains(9));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(600)).await;
    let mut saw_recompute = false;
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::ComfortUpdated(snapshot) = event {
            saw_recompute |= snapshot.preferences.comfort_level == 7.5;
        }
    }
    assert!(saw_recompute);
}
