//! Timing tests for the throttle gate. Most run on paused Tokio time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use switchboard_core::{BackendDescriptor, UnitOfWork};
use switchboard_error::{BackendFailure, FailureKind};
use switchboard_rate_limit::{GateUpdate, ThrottleGate};
use tokio::time::{Instant, advance, sleep};
use tokio_util::sync::CancellationToken;

fn gate(max_concurrent: usize, requests_per_window: u32, window: Duration, timeout: Duration) -> ThrottleGate {
    let descriptor = BackendDescriptor::builder()
        .id("test")
        .max_concurrent(max_concurrent)
        .requests_per_window(requests_per_window)
        .window(window)
        .timeout(timeout)
        .build()
        .unwrap();
    ThrottleGate::new(&descriptor)
}

async fn wait_for_queued(gate: &ThrottleGate, queued: usize) {
    while *gate.snapshot().queued() < queued {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_never_exceeds_limit() {
    let gate = gate(3, 0, Duration::from_secs(60), Duration::from_secs(600));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let gate = gate.clone();
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            let admission = gate.admit().await.unwrap();
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            assert!(*gate.snapshot().active() <= 3);
            sleep(Duration::from_millis(100)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            admission.release();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(peak.load(Ordering::SeqCst), 3);
    let snapshot = gate.snapshot();
    assert_eq!(*snapshot.active(), 0);
    assert_eq!(*snapshot.queued(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sliding_window_caps_admissions() {
    let window = Duration::from_secs(1);
    let gate = gate(10, 2, window, Duration::from_secs(60));
    let start = Instant::now();
    let stamps = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let gate = gate.clone();
        let stamps = Arc::clone(&stamps);
        handles.push(tokio::spawn(async move {
            let admission = gate.admit().await.unwrap();
            stamps.lock().unwrap().push(Instant::now());
            admission.release();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stamps = stamps.lock().unwrap().clone();
    assert_eq!(stamps.len(), 6);
    for &t in &stamps {
        let in_window = stamps
            .iter()
            .filter(|&&other| other >= t && other < t + window)
            .count();
        assert!(in_window <= 2, "{in_window} admissions within one window");
    }
    // Six admissions at two per window need three windows.
    assert_eq!(start.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_queued_admissions_are_fifo() {
    let gate = gate(1, 0, Duration::from_secs(60), Duration::from_secs(600));
    let held = gate.admit().await.unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for i in 0..5 {
        let task_gate = gate.clone();
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            let admission = task_gate.admit().await.unwrap();
            order.lock().unwrap().push(i);
            sleep(Duration::from_millis(10)).await;
            admission.release();
        }));
        wait_for_queued(&gate, i + 1).await;
    }

    held.release();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_queue_timeout_leaves_no_trace() {
    let gate = gate(1, 0, Duration::from_secs(60), Duration::from_secs(1));
    let held = gate.admit().await.unwrap();

    let err = gate.admit().await.unwrap_err();
    assert!(err.kind().is_timeout());

    let snapshot = gate.snapshot();
    assert_eq!(*snapshot.queued(), 0);
    assert_eq!(*snapshot.active(), 1);

    held.release();
    assert_eq!(*gate.snapshot().active(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_aborted_waiter_is_removed() {
    let gate = gate(1, 0, Duration::from_secs(60), Duration::from_secs(600));
    let held = gate.admit().await.unwrap();

    let waiter = {
        let gate = gate.clone();
        tokio::spawn(async move { gate.admit().await.map(|admission| admission.release()) })
    };
    wait_for_queued(&gate, 1).await;

    waiter.abort();
    assert!(waiter.await.unwrap_err().is_cancelled());
    assert_eq!(*gate.snapshot().queued(), 0);

    held.release();
    let again = gate.admit().await.unwrap();
    assert_eq!(*gate.snapshot().active(), 1);
    drop(again);
    assert_eq!(*gate.snapshot().active(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_counts_queue_time() {
    let timeout = Duration::from_secs(10);
    let gate = gate(1, 0, Duration::from_secs(60), timeout);
    let start = Instant::now();
    let held = gate.admit().await.unwrap();
    let seen_token: Arc<Mutex<Option<CancellationToken>>> = Arc::new(Mutex::new(None));

    let task = {
        let gate = gate.clone();
        let seen_token = Arc::clone(&seen_token);
        tokio::spawn(async move {
            gate.run(UnitOfWork::new(move |token| async move {
                *seen_token.lock().unwrap() = Some(token);
                sleep(Duration::from_secs(5)).await;
                Ok("late".to_string())
            }))
            .await
        })
    };

    sleep(timeout.mul_f64(0.9)).await;
    held.release();

    let failure = task.await.unwrap().unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(failure.kind(), Some(FailureKind::Timeout));
    assert!(failure.message().contains("spent queued"));
    // Queued for 9s leaves at most 1s of execution.
    assert!(elapsed <= timeout + Duration::from_millis(1), "{elapsed:?}");
    let token = seen_token.lock().unwrap().clone().unwrap();
    assert!(token.is_cancelled());
    assert_eq!(*gate.snapshot().active(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_passes_through_backend_failure() {
    let gate = gate(1, 0, Duration::from_secs(60), Duration::from_secs(5));
    let failure = gate
        .run(UnitOfWork::new(|_token| async {
            Err(BackendFailure::new("HTTP 401 Unauthorized"))
        }))
        .await
        .unwrap_err();

    assert_eq!(failure.message(), "HTTP 401 Unauthorized");
    assert_eq!(failure.kind(), None);
    assert_eq!(*gate.snapshot().active(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_raising_concurrency_admits_waiters() {
    let gate = gate(1, 0, Duration::from_secs(60), Duration::from_secs(600));
    let held = gate.admit().await.unwrap();

    let waiter = {
        let gate = gate.clone();
        tokio::spawn(async move { gate.admit().await })
    };
    wait_for_queued(&gate, 1).await;

    gate.update(GateUpdate::default().with_max_concurrent(2)).unwrap();
    let admission = waiter.await.unwrap().unwrap();

    assert_eq!(*gate.snapshot().active(), 2);
    assert_eq!(*gate.limits().max_concurrent(), 2);
    drop(admission);
    drop(held);
}

#[tokio::test(start_paused = true)]
async fn test_raising_window_limit_admits_waiters() {
    let gate = gate(5, 1, Duration::from_secs(60), Duration::from_secs(600));
    gate.admit().await.unwrap().release();

    let waiter = {
        let gate = gate.clone();
        tokio::spawn(async move { gate.admit().await.map(|admission| admission.release()) })
    };
    wait_for_queued(&gate, 1).await;

    let start = Instant::now();
    gate.update(GateUpdate::default().with_requests_per_window(2))
        .unwrap();
    waiter.await.unwrap().unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_update_is_rejected() {
    let gate = gate(1, 0, Duration::from_secs(60), Duration::from_secs(5));
    assert!(gate.update(GateUpdate::default().with_max_concurrent(0)).is_err());
    assert!(gate.update(GateUpdate::default().with_timeout(Duration::ZERO)).is_err());
    assert_eq!(*gate.limits().max_concurrent(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_window_log_expires() {
    let gate = gate(5, 5, Duration::from_secs(1), Duration::from_secs(5));
    gate.admit().await.unwrap().release();
    gate.admit().await.unwrap().release();
    assert_eq!(*gate.snapshot().in_window(), 2);

    advance(Duration::from_secs(1)).await;
    assert_eq!(*gate.snapshot().in_window(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_lowering_timeout_keeps_running_call_deadline() {
    let gate = gate(1, 0, Duration::from_secs(60), Duration::from_secs(10));

    let task = {
        let gate = gate.clone();
        tokio::spawn(async move {
            gate.run(UnitOfWork::new(|_token| async {
                sleep(Duration::from_secs(5)).await;
                Ok("finished".to_string())
            }))
            .await
        })
    };
    sleep(Duration::from_secs(1)).await;
    assert_eq!(*gate.snapshot().active(), 1);

    gate.update(GateUpdate::default().with_timeout(Duration::from_secs(1)))
        .unwrap();

    assert_eq!(task.await.unwrap().unwrap(), "finished");
    assert_eq!(*gate.limits().timeout(), Duration::from_secs(1));
    assert_eq!(*gate.snapshot().active(), 0);
}

// Real time: each runtime owns its own timer, so the wake-up scheduled on the
// first one dies with it.
#[test]
fn test_window_wake_survives_runtime_restart() {
    let runtime = || {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
    };
    let gate = gate(1, 1, Duration::from_millis(300), Duration::from_secs(1));

    let first = runtime();
    first.block_on(async {
        gate.admit().await.unwrap().release();
        let deadline = Instant::now() + Duration::from_millis(20);
        assert!(gate.admit_until(deadline).await.is_err());
    });
    drop(first);

    let second = runtime();
    let start = Instant::now();
    second.block_on(async {
        let admission = gate
            .admit_until(start + Duration::from_secs(2))
            .await
            .unwrap();
        admission.release();
    });
    assert!(start.elapsed() < Duration::from_secs(1), "{:?}", start.elapsed());
}
