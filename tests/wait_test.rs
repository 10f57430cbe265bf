//! Wait callback scenarios: signal and timeout delivery, replacement,
//! cancellation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use petrel::{Event, PoolError, SystemThreadPool, WaitCallback, WaitResult};

#[test]
fn submit_returns_an_id() {
    let pool = SystemThreadPool::new();
    let event = Arc::new(Event::auto());

    let id = pool.submit_wait(&event, WaitCallback::new(|_| {})).unwrap();
    assert_eq!(pool.pending_waits(), 1);

    pool.cancel_wait(id);
    assert_eq!(pool.pending_waits(), 0);
}

#[test]
fn signaled_event_completes_the_wait() {
    let pool = SystemThreadPool::new();
    let event = Arc::new(Event::auto());
    let completed = Arc::new(Event::manual());
    let observed_signal = Arc::new(AtomicBool::new(false));

    {
        let completed = completed.clone();
        let observed_signal = observed_signal.clone();
        pool.submit_wait(
            &event,
            WaitCallback::with_instance(move |instance, result| {
                observed_signal.store(result == WaitResult::Signaled, Ordering::SeqCst);
                instance.signal_on_return(completed.clone());
            }),
        )
        .unwrap();
    }

    event.set();

    assert!(completed.wait_timeout(Duration::from_secs(5)));
    assert!(observed_signal.load(Ordering::SeqCst));
}

#[test]
fn timed_wait_still_completes_on_signal() {
    let pool = SystemThreadPool::new();
    let event = Arc::new(Event::auto());
    let completed = Arc::new(Event::manual());
    let observed_signal = Arc::new(AtomicBool::new(false));

    {
        let completed = completed.clone();
        let observed_signal = observed_signal.clone();
        pool.submit_wait_timeout(
            &event,
            Duration::from_secs(2),
            WaitCallback::with_instance(move |instance, result| {
                observed_signal.store(result == WaitResult::Signaled, Ordering::SeqCst);
                instance.signal_on_return(completed.clone());
            }),
        )
        .unwrap();
    }

    event.set();

    assert!(completed.wait_timeout(Duration::from_secs(5)));
    assert!(observed_signal.load(Ordering::SeqCst));
}

#[test]
fn unsignaled_wait_times_out() {
    let pool = SystemThreadPool::new();
    let event = Arc::new(Event::auto());
    let completed = Arc::new(Event::manual());
    let observed_timeout = Arc::new(AtomicBool::new(false));

    {
        let completed = completed.clone();
        let observed_timeout = observed_timeout.clone();
        pool.submit_wait_timeout(
            &event,
            Duration::from_millis(10),
            WaitCallback::with_instance(move |instance, result| {
                observed_timeout.store(result == WaitResult::TimedOut, Ordering::SeqCst);
                instance.signal_on_return(completed.clone());
            }),
        )
        .unwrap();
    }

    assert!(completed.wait_timeout(Duration::from_millis(500)));
    assert!(observed_timeout.load(Ordering::SeqCst));
}

#[test]
fn replace_swaps_the_callback_before_completion() {
    let pool = SystemThreadPool::new();
    let event = Arc::new(Event::auto());
    let completed = Arc::new(Event::manual());
    let old_ran = Arc::new(AtomicUsize::new(0));
    let new_ran = Arc::new(AtomicUsize::new(0));

    let id = {
        let old_ran = old_ran.clone();
        pool.submit_wait(
            &event,
            WaitCallback::new(move |_| {
                old_ran.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap()
    };

    {
        let completed = completed.clone();
        let new_ran = new_ran.clone();
        pool.replace_wait(
            id,
            WaitCallback::with_instance(move |instance, _| {
                new_ran.fetch_add(1, Ordering::SeqCst);
                instance.signal_on_return(completed.clone());
            }),
        )
        .unwrap();
    }

    event.set();

    assert!(completed.wait_timeout(Duration::from_secs(5)));
    assert_eq!(old_ran.load(Ordering::SeqCst), 0);
    assert_eq!(new_ran.load(Ordering::SeqCst), 1);
}

#[test]
fn replace_of_unknown_id_fails_cleanly() {
    let pool = SystemThreadPool::new();
    let event = Arc::new(Event::auto());

    let id = pool.submit_wait(&event, WaitCallback::new(|_| {})).unwrap();
    pool.cancel_wait(id);

    let outcome = pool.replace_wait(id, WaitCallback::new(|_| {}));
    assert!(matches!(outcome, Err(PoolError::NotFound)));
}

#[test]
fn cancelled_wait_never_fires() {
    let pool = SystemThreadPool::new();
    let event = Arc::new(Event::auto());
    let fired = Arc::new(AtomicUsize::new(0));

    let id = {
        let fired = fired.clone();
        pool.submit_wait(
            &event,
            WaitCallback::new(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap()
    };

    pool.cancel_wait(id);
    event.set();

    thread::sleep(Duration::from_millis(100));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(pool.pending_waits(), 0);
}

#[test]
fn cancel_all_waits_suppresses_both_callbacks() {
    let pool = SystemThreadPool::new();
    let first = Arc::new(Event::auto());
    let second = Arc::new(Event::auto());
    let fired = Arc::new(AtomicUsize::new(0));

    for event in [&first, &second] {
        let fired = fired.clone();
        pool.submit_wait(
            event,
            WaitCallback::new(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
    }
    assert_eq!(pool.pending_waits(), 2);

    pool.cancel_waits();
    first.set();
    second.set();

    thread::sleep(Duration::from_millis(100));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(pool.pending_waits(), 0);
}

#[test]
fn one_shot_wait_leaves_the_map_after_completion() {
    let pool = SystemThreadPool::new();
    let event = Arc::new(Event::auto());
    let completed = Arc::new(Event::manual());

    {
        let completed = completed.clone();
        pool.submit_wait(
            &event,
            WaitCallback::with_instance(move |instance, _| {
                instance.signal_on_return(completed.clone());
            }),
        )
        .unwrap();
    }

    event.set();
    assert!(completed.wait_timeout(Duration::from_secs(5)));

    // The cleanup runs inside the completion; give it a moment to finish.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while pool.pending_waits() != 0 {
        assert!(std::time::Instant::now() < deadline, "wait context leaked");
        thread::sleep(Duration::from_millis(5));
    }
}
