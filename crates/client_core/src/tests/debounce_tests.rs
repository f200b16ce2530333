use super::*;
use std::sync::atomic::AtomicUsize;

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn bump(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
    let counter = Arc::clone(counter);
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
        std::future::ready(())
    }
}

#[tokio::test(start_paused = true)]
async fn fires_once_after_quiet_period() {
    let scheduler = DebounceScheduler::default();
    let fired = counter();

    assert!(!scheduler.schedule("comfort", Duration::from_millis(500), bump(&fired)).await);
    assert!(scheduler.is_pending(&"comfort").await);

    tokio::time::sleep(Duration::from_millis(499)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!scheduler.is_pending(&"comfort").await);
}

#[tokio::test(start_paused = true)]
async fn rescheduling_restarts_the_delay_and_runs_only_the_last_action() {
    let scheduler = DebounceScheduler::default();
    let first = counter();
    let last = counter();

    scheduler
        .schedule("comfort", Duration::from_millis(500), bump(&first))
        .await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let superseded = scheduler
        .schedule("comfort", Duration::from_millis(500), bump(&last))
        .await;
    assert!(superseded);

    // 600ms after the first schedule, but only 300ms after the second.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(last.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(last.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn keys_are_independent() {
    let scheduler = DebounceScheduler::default();
    let a = counter();
    let b = counter();

    scheduler.schedule(1_u8, Duration::from_millis(100), bump(&a)).await;
    scheduler.schedule(2_u8, Duration::from_millis(100), bump(&b)).await;
    assert_eq!(scheduler.pending_count().await, 2);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(a.load(Ordering::SeqCst), 1);
    assert_eq!(b.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.pending_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_drops_the_pending_action() {
    let scheduler = DebounceScheduler::default();
    let fired = counter();

    scheduler
        .schedule("comfort", Duration::from_millis(500), bump(&fired))
        .await;
    assert!(scheduler.cancel(&"comfort").await);
    assert!(!scheduler.cancel(&"comfort").await);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_pending_timers_and_rejects_new_work() {
    let scheduler = DebounceScheduler::default();
    let fired = counter();

    scheduler
        .schedule("comfort", Duration::from_millis(500), bump(&fired))
        .await;
    scheduler.shutdown().await;
    assert!(scheduler.is_shut_down());
    assert_eq!(scheduler.pending_count().await, 0);

    scheduler
        .schedule("comfort", Duration::from_millis(10), bump(&fired))
        .await;
    assert!(!scheduler.is_pending(&"comfort").await);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn parent_cancellation_reaches_the_scheduler() {
    let parent = CancellationToken::new();
    let scheduler = DebounceScheduler::new(parent.child_token());
    let fired = counter();

    scheduler
        .schedule("comfort", Duration::from_millis(500), bump(&fired))
        .await;
    parent.cancel();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(scheduler.is_shut_down());
}
