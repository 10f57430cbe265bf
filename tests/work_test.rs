//! Work callback scenarios: submission, bulk drain, cooperative cancel.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use petrel::{Event, SystemThreadPool, ThreadPool, WorkCallback};

#[test]
fn submit_runs_the_callback() {
    let pool = SystemThreadPool::new();
    let event = Arc::new(Event::manual());
    let counter = Arc::new(AtomicUsize::new(0));

    {
        let event = event.clone();
        let counter = counter.clone();
        pool.submit_work(WorkCallback::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            event.set();
        }))
        .unwrap();
    }

    assert!(event.wait_timeout(Duration::from_secs(5)));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn fifty_workers_drain_completely() {
    let pool = SystemThreadPool::new();
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..50 {
        let counter = counter.clone();
        pool.submit_work(WorkCallback::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    }

    assert!(pool.wait_works());
    assert_eq!(counter.load(Ordering::SeqCst), 50);
}

#[test]
fn wait_works_on_idle_pool_returns_true() {
    let pool = SystemThreadPool::new();
    assert!(pool.wait_works());
}

#[test]
fn instance_signal_on_return_fires_after_the_callback() {
    let pool = SystemThreadPool::new();
    let event = Arc::new(Event::manual());
    let flag = Arc::new(AtomicBool::new(false));

    {
        let event = event.clone();
        let flag = flag.clone();
        pool.submit_work(WorkCallback::with_instance(move |instance| {
            instance.signal_on_return(event.clone());
            flag.store(true, Ordering::SeqCst);
        }))
        .unwrap();
    }

    assert!(event.wait_timeout(Duration::from_secs(5)));
    assert!(flag.load(Ordering::SeqCst));
}

#[test]
fn cancellation_predicate_aborts_the_drain() {
    let cancel_requested = Arc::new(AtomicBool::new(false));
    let pool = {
        let cancel_requested = cancel_requested.clone();
        ThreadPool::with_thread_count_and_test_cancel(1, 1, move || {
            cancel_requested.load(Ordering::SeqCst)
        })
    };

    for _ in 0..4 {
        pool.submit_work(WorkCallback::new(|| {
            thread::sleep(Duration::from_millis(300));
        }))
        .unwrap();
    }

    cancel_requested.store(true, Ordering::SeqCst);
    assert!(!pool.wait_works());
}

#[test]
fn cancel_works_discards_queued_callbacks() {
    let pool = ThreadPool::with_thread_count(1, 1);
    let ran = Arc::new(AtomicUsize::new(0));

    // The first callback occupies the single worker while the rest queue up.
    {
        let ran = ran.clone();
        pool.submit_work(WorkCallback::new(move || {
            ran.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(200));
        }))
        .unwrap();
    }
    for _ in 0..5 {
        let ran = ran.clone();
        pool.submit_work(WorkCallback::new(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    }

    pool.cancel_works();

    assert_eq!(pool.queued_works(), 0);
    // Only callbacks already started may have run.
    assert!(ran.load(Ordering::SeqCst) <= 1);
}

#[test]
fn faulting_callback_does_not_poison_the_pool() {
    let pool = SystemThreadPool::new();
    let counter = Arc::new(AtomicUsize::new(0));

    pool.submit_work(WorkCallback::new(|| panic!("deliberate fault")))
        .unwrap();
    {
        let counter = counter.clone();
        pool.submit_work(WorkCallback::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    }

    assert!(pool.wait_works());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
