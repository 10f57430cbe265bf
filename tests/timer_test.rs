//! Timer scenarios: one-shot, periodic, deadline and replacement behavior.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use petrel::{Event, PoolError, SystemThreadPool, TimerCallback};

#[test]
fn one_shot_timer_fires_exactly_once() {
    let pool = SystemThreadPool::new();
    let counter = Arc::new(AtomicUsize::new(0));

    {
        let counter = counter.clone();
        pool.submit_timer(
            Duration::from_millis(2),
            TimerCallback::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
    }

    thread::sleep(Duration::from_millis(100));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn periodic_timer_fires_repeatedly() {
    let pool = SystemThreadPool::new();
    let counter = Arc::new(AtomicUsize::new(0));

    let id = {
        let counter = counter.clone();
        pool.submit_periodic_timer(
            Duration::from_millis(2),
            Duration::from_millis(2),
            TimerCallback::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap()
    };

    thread::sleep(Duration::from_millis(60));
    pool.cancel_timer(id);

    assert!(counter.load(Ordering::SeqCst) > 1);
}

#[test]
fn periodic_timer_stops_after_cancel() {
    let pool = SystemThreadPool::new();
    let counter = Arc::new(AtomicUsize::new(0));

    let id = {
        let counter = counter.clone();
        pool.submit_periodic_timer(
            Duration::from_millis(5),
            Duration::from_millis(5),
            TimerCallback::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap()
    };

    thread::sleep(Duration::from_millis(50));
    pool.cancel_timer(id);
    let after_cancel = counter.load(Ordering::SeqCst);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(counter.load(Ordering::SeqCst), after_cancel);
    assert_eq!(pool.pending_timers(), 0);
}

#[test]
fn replace_before_the_fire_runs_the_new_callback_once() {
    let pool = SystemThreadPool::new();
    let old_ran = Arc::new(AtomicUsize::new(0));
    let new_ran = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(Event::manual());

    let id = {
        let old_ran = old_ran.clone();
        pool.submit_timer(
            Duration::from_millis(20),
            TimerCallback::new(move || {
                old_ran.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap()
    };

    {
        let new_ran = new_ran.clone();
        let completed = completed.clone();
        pool.replace_timer(
            id,
            TimerCallback::with_instance(move |instance| {
                new_ran.fetch_add(1, Ordering::SeqCst);
                instance.signal_on_return(completed.clone());
            }),
        )
        .unwrap();
    }

    assert!(completed.wait_timeout(Duration::from_secs(5)));
    thread::sleep(Duration::from_millis(50));

    assert_eq!(old_ran.load(Ordering::SeqCst), 0);
    assert_eq!(new_ran.load(Ordering::SeqCst), 1);
}

#[test]
fn replace_of_completed_timer_fails_cleanly() {
    let pool = SystemThreadPool::new();
    let completed = Arc::new(Event::manual());

    let id = {
        let completed = completed.clone();
        pool.submit_timer(
            Duration::from_millis(2),
            TimerCallback::with_instance(move |instance| {
                instance.signal_on_return(completed.clone());
            }),
        )
        .unwrap()
    };

    assert!(completed.wait_timeout(Duration::from_secs(5)));

    // One-shot completion tears the context down; wait for that to settle.
    let deadline = Instant::now() + Duration::from_secs(5);
    while pool.pending_timers() != 0 {
        assert!(Instant::now() < deadline, "timer context leaked");
        thread::sleep(Duration::from_millis(5));
    }

    let outcome = pool.replace_timer(id, TimerCallback::new(|| {}));
    assert!(matches!(outcome, Err(PoolError::NotFound)));
}

#[test]
fn cancelled_timer_never_fires() {
    let pool = SystemThreadPool::new();
    let counter = Arc::new(AtomicUsize::new(0));

    let id = {
        let counter = counter.clone();
        pool.submit_timer(
            Duration::from_millis(50),
            TimerCallback::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap()
    };

    pool.cancel_timer(id);
    thread::sleep(Duration::from_millis(120));

    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn past_deadline_fires_immediately() {
    let pool = SystemThreadPool::new();
    let completed = Arc::new(Event::manual());

    {
        let completed = completed.clone();
        // By the time the submission runs this instant is already history.
        pool.submit_timer_at(
            Instant::now(),
            TimerCallback::with_instance(move |instance| {
                instance.signal_on_return(completed.clone());
            }),
        )
        .unwrap();
    }

    assert!(completed.wait_timeout(Duration::from_millis(500)));
}

#[test]
fn future_deadline_fires_near_the_deadline() {
    let pool = SystemThreadPool::new();
    let completed = Arc::new(Event::manual());
    let submitted = Instant::now();

    {
        let completed = completed.clone();
        pool.submit_timer_at(
            submitted + Duration::from_millis(30),
            TimerCallback::with_instance(move |instance| {
                instance.signal_on_return(completed.clone());
            }),
        )
        .unwrap();
    }

    assert!(completed.wait_timeout(Duration::from_secs(5)));
    assert!(submitted.elapsed() >= Duration::from_millis(30));
}

#[test]
fn periodic_deadline_timer_keeps_firing() {
    let pool = SystemThreadPool::new();
    let counter = Arc::new(AtomicUsize::new(0));

    let id = {
        let counter = counter.clone();
        pool.submit_periodic_timer_at(
            Instant::now() + Duration::from_millis(2),
            Duration::from_millis(2),
            TimerCallback::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap()
    };

    thread::sleep(Duration::from_millis(60));
    pool.cancel_timer(id);

    assert!(counter.load(Ordering::SeqCst) > 1);
}
