use pacelimit::{Clock, Limiter, PauseRange, VirtualClock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

#[test]
fn acquire_pauses_until_virtual_time_advances() {
    let clock = Arc::new(VirtualClock::new());
    let limiter = Limiter::new(2, Duration::from_millis(10), Some(clock.clone())).unwrap();
    let (acquired_tx, acquired_rx) = mpsc::channel();

    let worker = {
        let limiter = limiter.clone();
        thread::spawn(move || acquired_tx.send(limiter.acquire()).unwrap())
    };

    // Pause time not exceeded, acquire should not happen.
    assert!(acquired_rx.recv_timeout(Duration::from_millis(50)).is_err());

    // Acquire should happen any time up to the pause.
    let mut got = None;
    for _ in 0..10 {
        clock.advance(Duration::from_millis(1));
        if let Ok(granted) = acquired_rx.recv_timeout(Duration::from_millis(20)) {
            got = Some(granted);
            break;
        }
    }
    if got.is_none() {
        got = acquired_rx.recv_timeout(Duration::from_secs(5)).ok();
    }
    assert_eq!(got, Some(true));
    assert!(clock.elapsed() <= Duration::from_millis(10));
    worker.join().unwrap();
}

#[test]
fn full_limiter_still_waits_for_pacing_then_denies() {
    let clock = Arc::new(VirtualClock::new());
    let limiter = Limiter::new(1, Duration::from_millis(10), Some(clock.clone())).unwrap();
    clock.advance(Duration::from_millis(10));
    assert!(limiter.acquire());

    let (tx, rx) = mpsc::channel();
    let worker = {
        let limiter = limiter.clone();
        thread::spawn(move || tx.send(limiter.acquire()).unwrap())
    };

    // Gate closed: the caller is parked even though the answer will be "full".
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    clock.advance(Duration::from_millis(10));
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(false));
    worker.join().unwrap();
}

#[test]
fn denial_after_gate_keeps_pacing_slot_open() {
    let clock = Arc::new(VirtualClock::new());
    let limiter = Limiter::new(1, Duration::from_millis(10), Some(clock.clone())).unwrap();
    let t0 = clock.now();

    clock.advance(Duration::from_millis(10));
    assert!(limiter.acquire());
    assert_eq!(limiter.next_allowed(), Some(t0 + Duration::from_millis(20)));

    clock.advance(Duration::from_millis(10));
    assert!(!limiter.acquire());
    assert!(!limiter.acquire());
    assert_eq!(limiter.next_allowed(), Some(t0 + Duration::from_millis(20)));

    // No further time has passed, yet the freed slot is granted at once.
    limiter.release().unwrap();
    assert!(limiter.acquire());
    assert_eq!(limiter.next_allowed(), Some(t0 + Duration::from_millis(30)));
}

#[test]
fn acquire_wait_respects_pacing_between_waiters() {
    let clock = Arc::new(VirtualClock::new());
    let limiter = Limiter::new(5, Duration::from_millis(10), Some(clock.clone())).unwrap();
    let (tx, rx) = mpsc::channel();

    let handles: Vec<_> = (0..2)
        .map(|id| {
            let limiter = limiter.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                limiter.acquire_wait();
                tx.send(id).unwrap();
            })
        })
        .collect();

    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

    // First deadline: exactly one waiter gets through.
    clock.advance(Duration::from_millis(10));
    rx.recv_timeout(Duration::from_secs(5)).expect("first waiter admitted");
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

    // Second deadline: the other one.
    clock.advance(Duration::from_millis(10));
    rx.recv_timeout(Duration::from_secs(5)).expect("second waiter admitted");

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(limiter.outstanding(), 2);
}

#[test]
fn jittered_spacing_stays_in_range() {
    let clock = Arc::new(VirtualClock::new());
    let limiter = Limiter::builder(100)
        .min_pause(Duration::from_millis(5))
        .max_pause(Duration::from_millis(15))
        .clock(clock.clone())
        .build()
        .unwrap();

    let mut previous = clock.now();
    for _ in 0..20 {
        let next = limiter.next_allowed().expect("pacing enabled");
        let gap = next - previous;
        assert!(gap >= Duration::from_millis(5), "gap {:?} below min", gap);
        assert!(gap <= Duration::from_millis(15), "gap {:?} above max", gap);

        clock.advance_to(next);
        assert!(limiter.acquire());
        previous = next;
    }
}

#[test]
fn seeded_jitter_produces_reproducible_deadlines() {
    let range = PauseRange::between(Duration::from_millis(5), Duration::from_millis(15)).unwrap();
    let clock = Arc::new(VirtualClock::new());
    let limiter = Limiter::builder(100)
        .pause_range(range)
        .rng_seed(2024)
        .clock(clock.clone())
        .build()
        .unwrap();

    // Same seed, same draws: every deadline is known up front.
    let mut replay = StdRng::seed_from_u64(2024);
    let mut expected = clock.now() + range.draw_with_rng(&mut replay);
    for _ in 0..20 {
        assert_eq!(limiter.next_allowed(), Some(expected));
        clock.advance_to(expected);
        assert!(limiter.acquire());
        expected += range.draw_with_rng(&mut replay);
    }
    assert_eq!(limiter.next_allowed(), Some(expected));

    // A second limiter with the same seed walks the same schedule.
    let twin_clock = Arc::new(VirtualClock::starting_at(clock.now()));
    let twin = Limiter::builder(1)
        .pause_range(range)
        .rng_seed(2024)
        .clock(twin_clock.clone())
        .build()
        .unwrap();
    let mut replay = StdRng::seed_from_u64(2024);
    assert_eq!(twin.next_allowed(), Some(twin_clock.now() + range.draw_with_rng(&mut replay)));
}

#[test]
fn system_clock_pacing_spaces_real_grants() {
    let limiter = Limiter::new(3, Duration::from_millis(20), None).unwrap();
    let start = std::time::Instant::now();
    assert!(limiter.acquire());
    assert!(limiter.acquire());
    // Two paced grants: at least two pauses have elapsed. Small tolerance for timer jitter.
    assert!(start.elapsed() >= Duration::from_millis(35));
}
