//! Bounded waits: state futures and start trackers

mod common;

use bllvm_framework::framework::TrackerStatus;
use bllvm_framework::{BundleState, FrameworkError, StartOptions};
use common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_await_state_sees_later_start() {
    let fixture = Arc::new(FrameworkFixture::new());
    let id = fixture.install(&manifest("org.example.later", "1.0.0"));

    let starter = {
        let fixture = Arc::clone(&fixture);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            fixture.framework.start(id, StartOptions::default()).unwrap();
        })
    };

    let state = fixture
        .framework
        .await_state(id, BundleState::Active, WAIT)
        .await
        .unwrap();
    assert_eq!(state, BundleState::Active);
    starter.join().unwrap();
}

#[tokio::test]
async fn test_await_state_returns_at_once_when_reached() {
    let fixture = FrameworkFixture::new();
    let id = fixture.install(&manifest("org.example.ready", "1.0.0"));
    let state = fixture
        .framework
        .await_state(id, BundleState::Installed, Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(state, BundleState::Installed);
}

#[tokio::test]
async fn test_await_state_times_out() {
    let fixture = FrameworkFixture::new();
    let id = fixture.install(&manifest("org.example.idle", "1.0.0"));
    let err = fixture
        .framework
        .await_state(id, BundleState::Active, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, FrameworkError::Timeout(_)));
    assert_eq!(fixture.framework.state(id), Some(BundleState::Installed));
}

#[tokio::test]
async fn test_await_state_fails_on_uninstall() {
    let fixture = Arc::new(FrameworkFixture::new());
    let id = fixture.install(&manifest("org.example.doomed", "1.0.0"));

    let remover = {
        let fixture = Arc::clone(&fixture);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            fixture.framework.uninstall(id).unwrap();
        })
    };

    let err = fixture
        .framework
        .await_state(id, BundleState::Active, WAIT)
        .await
        .unwrap_err();
    assert!(matches!(err, FrameworkError::NotInstalled(_)));
    remover.join().unwrap();
}

#[tokio::test]
async fn test_future_state() {
    let fixture = FrameworkFixture::new();
    let id = fixture.install(&manifest("org.example.future", "1.0.0"));
    let future = fixture
        .framework
        .future_state(id, BundleState::Resolved)
        .with_timeout(Duration::from_millis(50));
    assert!(!future.is_done());
    assert!(matches!(future.wait().await, Err(FrameworkError::Timeout(_))));

    fixture.framework.resolve_bundles(Some(&[id])).unwrap();
    assert!(future.is_done());
    assert_eq!(future.wait().await.unwrap(), BundleState::Resolved);
}

#[tokio::test]
async fn test_tracker_completes_when_all_started() {
    let fixture = FrameworkFixture::new();
    let a = fixture.install(&manifest("org.example.a", "1.0.0"));
    let b = fixture.install(&manifest("org.example.b", "1.0.0"));
    fixture.framework.start(a, StartOptions::default()).unwrap();

    let tracker = fixture.framework.track_start(&[a, b], false);
    assert_eq!(tracker.pending(), vec![b]);
    assert_eq!(tracker.status(), TrackerStatus::Pending);

    fixture.framework.start(b, StartOptions::default()).unwrap();
    assert_eq!(tracker.status(), TrackerStatus::AllStarted);
    assert!(tracker.await_completion(WAIT).await.unwrap());
    assert!(tracker.failed().is_empty());
}

#[tokio::test]
async fn test_tracker_completes_on_first_failure() {
    let fixture = FrameworkFixture::new();
    let script = fixture.script("broken");
    script.fail_start.store(true, Ordering::SeqCst);
    let good = fixture.install(&manifest("org.example.good", "1.0.0"));
    let bad = fixture.install(&with_activator(manifest("org.example.bad", "1.0.0"), "broken"));
    let idle = fixture.install(&manifest("org.example.idle", "1.0.0"));

    let tracker = fixture.framework.track_start(&[good, bad, idle], true);
    fixture.framework.start(good, StartOptions::default()).unwrap();
    assert!(fixture.framework.start(bad, StartOptions::default()).is_err());

    assert_eq!(tracker.status(), TrackerStatus::Failed);
    assert!(!tracker.await_completion(WAIT).await.unwrap());
    assert_eq!(tracker.failed(), vec![bad]);
    assert_eq!(tracker.pending(), vec![idle]);
}

#[tokio::test]
async fn test_tracker_waits_for_the_rest_after_failure() {
    let fixture = FrameworkFixture::new();
    let script = fixture.script("broken");
    script.fail_start.store(true, Ordering::SeqCst);
    let bad = fixture.install(&with_activator(manifest("org.example.bad", "1.0.0"), "broken"));
    let good = fixture.install(&manifest("org.example.good", "1.0.0"));

    let tracker = fixture.framework.track_start(&[bad, good], false);
    assert!(fixture.framework.start(bad, StartOptions::default()).is_err());
    assert_eq!(tracker.status(), TrackerStatus::Pending);

    fixture.framework.start(good, StartOptions::default()).unwrap();
    assert_eq!(tracker.status(), TrackerStatus::Failed);
    assert!(!tracker.await_completion(WAIT).await.unwrap());
}

#[tokio::test]
async fn test_tracker_times_out() {
    let fixture = FrameworkFixture::new();
    let id = fixture.install(&manifest("org.example.never", "1.0.0"));
    let tracker = fixture.framework.track_start(&[id], true);
    let err = tracker
        .await_completion(Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, FrameworkError::Timeout(_)));
    tracker.detach();
}
