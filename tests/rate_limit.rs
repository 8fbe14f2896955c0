use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use pathwaydb::rate_limit::{KEGG_HOST, KEGG_MIN_INTERVAL, RateLimiter};

#[test]
fn completions_are_spaced_per_host() {
    let interval = Duration::from_millis(60);
    let limiter = RateLimiter::new(interval);

    let mut finished = Vec::new();
    for _ in 0..3 {
        limiter.throttle("api.example.org", || ());
        finished.push(Instant::now());
    }
    for pair in finished.windows(2) {
        assert!(pair[1] - pair[0] >= interval, "gap {:?}", pair[1] - pair[0]);
    }
}

#[test]
fn hosts_are_limited_independently() {
    let limiter = RateLimiter::new(Duration::from_secs(5));
    limiter.mark("a.example.org");
    let start = Instant::now();
    assert_eq!(limiter.wait("b.example.org"), Duration::ZERO);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn threads_sharing_a_limiter_keep_the_gap() {
    let interval = Duration::from_millis(80);
    let limiter = Arc::new(RateLimiter::new(interval));
    let barrier = Arc::new(Barrier::new(3));

    let handles = (0..3)
        .map(|_| {
            let limiter = limiter.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                limiter.throttle("api.example.org", Instant::now)
            })
        })
        .collect::<Vec<_>>();
    let mut finished = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();
    finished.sort();
    for pair in finished.windows(2) {
        assert!(pair[1] - pair[0] >= interval, "gap {:?}", pair[1] - pair[0]);
    }
}

#[test]
fn busy_host_does_not_block_others() {
    let limiter = Arc::new(RateLimiter::new(Duration::from_secs(5)));
    limiter.mark("slow.example.org");

    let blocked = {
        let limiter = limiter.clone();
        thread::spawn(move || limiter.throttle("slow.example.org", || ()))
    };
    thread::sleep(Duration::from_millis(20));
    let start = Instant::now();
    limiter.throttle("fast.example.org", || ());
    assert!(start.elapsed() < Duration::from_secs(1));
    drop(blocked);
}

#[test]
fn kegg_gets_its_own_interval() {
    let limiter = RateLimiter::with_defaults(Duration::from_secs(1));
    assert_eq!(limiter.interval_for(KEGG_HOST), KEGG_MIN_INTERVAL);
    assert_eq!(limiter.interval_for("www.ebi.ac.uk"), Duration::from_secs(1));
}
