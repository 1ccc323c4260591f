mod common;

use common::{init_tracing, wait_until};
use courier::{BackgroundPool, BatchPolicy, StopPolicy, Submit, Task};

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

#[test]
fn test_concurrent_producers_exactly_once() {
    init_tracing();
    let pool = Arc::new(BackgroundPool::start("bg-once", 4, BatchPolicy::Unbounded).unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let producers: Vec<_> = (0..8)
        .map(|p| {
            let pool = pool.clone();
            let seen = seen.clone();
            thread::spawn(move || {
                for i in 0..250 {
                    let seen = seen.clone();
                    pool.submit(move || seen.lock().unwrap().push(p * 250 + i))
                        .unwrap();
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }

    pool.stop(StopPolicy::Drain);

    let mut seen = seen.lock().unwrap().clone();
    seen.sort_unstable();
    assert_eq!(seen, (0..2000).collect::<Vec<_>>());
}

#[test]
fn test_submissions_racing_a_drain_are_not_lost() {
    init_tracing();
    let pool = Arc::new(BackgroundPool::start("bg-race", 1, BatchPolicy::Unbounded).unwrap());
    let counter = Arc::new(AtomicUsize::new(0));

    // Keep the consumer busy so producers race against a drain in progress.
    pool.submit(|| thread::sleep(Duration::from_millis(20)))
        .unwrap();

    let producers: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            let counter = counter.clone();
            thread::spawn(move || {
                for _ in 0..250 {
                    let counter = counter.clone();
                    pool.submit(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }

    pool.stop(StopPolicy::Drain);

    assert_eq!(counter.load(Ordering::SeqCst), 2000);
    assert_eq!(pool.stats()[0].executed(), 2001);
}

#[test]
fn test_failing_task_does_not_block_queue() {
    init_tracing();
    let pool = BackgroundPool::start("bg-isolation", 1, BatchPolicy::Unbounded).unwrap();
    let out = Arc::new(Mutex::new(Vec::new()));

    pool.submit(|| panic!("thumbnail decoder crashed")).unwrap();
    for i in 2..=5 {
        let out = out.clone();
        pool.submit(move || out.lock().unwrap().push(i)).unwrap();
    }

    pool.stop(StopPolicy::Drain);

    assert_eq!(*out.lock().unwrap(), vec![2, 3, 4, 5]);

    let stats = &pool.stats()[0];
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 4);
}

#[test]
fn test_fallible_task_error_is_counted() {
    init_tracing();
    let pool = BackgroundPool::start("bg-fallible", 1, BatchPolicy::Unbounded).unwrap();

    pool.submit_task(Task::fallible(|| Err::<(), _>("missing texture")))
        .unwrap();
    pool.submit_task(Task::fallible(|| Ok::<(), std::io::Error>(())))
        .unwrap();

    pool.stop(StopPolicy::Drain);

    let stats = &pool.stats()[0];
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 1);
}

#[test]
fn test_idle_worker_stays_parked() {
    init_tracing();
    let pool = BackgroundPool::start("bg-idle", 1, BatchPolicy::Unbounded).unwrap();

    assert!(wait_until(Duration::from_secs(5), || pool.stats()[0].parked));
    let before = pool.stats().remove(0);

    thread::sleep(Duration::from_millis(200));
    let after = pool.stats().remove(0);

    assert!(after.parked);
    assert_eq!(after.parks, before.parks);
    assert_eq!(after.iterations, 0);
}

/// Blocks every worker of `pool` in its first iteration until the returned
/// barrier is reached by the caller, so that work submitted meanwhile is
/// already queued when the workers resume.
fn hold_workers(pool: &BackgroundPool) -> Arc<Barrier> {
    let release = Arc::new(Barrier::new(pool.len() + 1));
    let (started_tx, started_rx) = mpsc::channel();

    for worker in 0..pool.len() {
        let release = release.clone();
        let started_tx = started_tx.clone();
        pool.submit_to(
            worker,
            Task::new(move || {
                started_tx.send(()).unwrap();
                release.wait();
            }),
        )
        .unwrap();
    }

    for _ in 0..pool.len() {
        started_rx.recv().unwrap();
    }

    release
}

/// Iterations a `Spread` worker of a four-worker pool may need for `queued`
/// tasks: each one runs a quarter of what is left, at least one task.
fn spread_bound(queued: u64) -> u64 {
    (queued as f64).log(4.0 / 3.0).ceil() as u64 + 4
}

#[test]
fn test_spread_policy_runs_every_task() {
    init_tracing();
    let pool = BackgroundPool::start("bg-spread", 4, BatchPolicy::spread()).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let release = hold_workers(&pool);
    for i in 1..=2001 {
        let seen = seen.clone();
        pool.submit(move || seen.lock().unwrap().push(i)).unwrap();
    }
    release.wait();

    pool.stop(StopPolicy::Drain);

    let seen = seen.lock().unwrap();
    let unique: HashSet<_> = seen.iter().copied().collect();
    assert_eq!(seen.len(), 2001);
    assert_eq!(unique.len(), 2001);
    assert!((1..=2001).all(|i| unique.contains(&i)));

    for stats in pool.stats() {
        // One blocked iteration, then the queued share.
        let queued = stats.executed() - 1;
        assert!(queued >= 500, "{}: {queued} tasks", stats.name);
        assert!(
            stats.iterations <= 1 + spread_bound(queued),
            "{}: {} iterations for {queued} tasks",
            stats.name,
            stats.iterations
        );
        assert!(stats.iterations > 2, "{}: batch was not spread", stats.name);
        assert!(stats.carried_over > 0);
    }
}

#[test]
fn test_unbounded_policy_runs_queue_in_one_iteration() {
    init_tracing();
    let pool = BackgroundPool::start("bg-unbounded", 4, BatchPolicy::Unbounded).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));

    let release = hold_workers(&pool);
    for _ in 0..2001 {
        let ran = ran.clone();
        pool.submit(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    release.wait();

    pool.stop(StopPolicy::Drain);

    assert_eq!(ran.load(Ordering::SeqCst), 2001);
    for stats in pool.stats() {
        assert_eq!(stats.iterations, 2, "{}", stats.name);
        assert_eq!(stats.carried_over, 0);
    }
}

#[test]
fn test_spread_remainder_runs_in_order() {
    init_tracing();
    let pool = BackgroundPool::start("bg-carry", 4, BatchPolicy::spread()).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    pool.submit_to(
        0,
        Task::new(move || {
            started_tx.send(()).unwrap();
            let _ = release_rx.recv();
        }),
    )
    .unwrap();
    started_rx.recv().unwrap();

    for i in 0..100 {
        let order = order.clone();
        pool.submit_to(0, Task::new(move || order.lock().unwrap().push(i)))
            .unwrap();
    }
    release_tx.send(()).unwrap();

    pool.stop(StopPolicy::Drain);

    assert_eq!(*order.lock().unwrap(), (0..100).collect::<Vec<_>>());
    assert!(pool.stats()[0].carried_over > 0);
}

#[test]
fn test_one_worker_never_runs_two_tasks_at_once() {
    init_tracing();
    let pool = BackgroundPool::start("bg-exclusive", 2, BatchPolicy::Unbounded).unwrap();
    let active = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let threads = Arc::new(Mutex::new(HashSet::new()));

    for _ in 0..200 {
        let active = active.clone();
        let overlaps = overlaps.clone();
        let threads = threads.clone();

        pool.submit_to(
            0,
            Task::new(move || {
                if active.fetch_add(1, Ordering::SeqCst) != 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                threads.lock().unwrap().insert(thread::current().id());
                thread::yield_now();
                active.fetch_sub(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
    }

    pool.stop(StopPolicy::Drain);

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(threads.lock().unwrap().len(), 1);
}

#[test]
fn test_workers_run_in_parallel() {
    init_tracing();
    let pool = BackgroundPool::start("bg-parallel", 4, BatchPolicy::Unbounded).unwrap();
    let barrier = Arc::new(Barrier::new(4));
    let done = Arc::new(AtomicUsize::new(0));

    // Only completes if all four workers are inside a task at the same time.
    for worker in 0..4 {
        let barrier = barrier.clone();
        let done = done.clone();
        pool.submit_to(
            worker,
            Task::new(move || {
                barrier.wait();
                done.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
    }

    assert!(wait_until(Duration::from_secs(10), || {
        done.load(Ordering::SeqCst) == 4
    }));
}

#[test]
fn test_cancelled_task_is_skipped() {
    init_tracing();
    let pool = BackgroundPool::start("bg-cancel", 1, BatchPolicy::Unbounded).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));

    let (release_tx, release_rx) = mpsc::channel::<()>();
    pool.submit(move || {
        let _ = release_rx.recv();
    })
    .unwrap();

    let (task, handle) = Task::cancellable({
        let ran = ran.clone();
        move || {
            ran.fetch_add(1, Ordering::SeqCst);
        }
    });
    pool.submit_task(task).unwrap();
    handle.cancel();
    release_tx.send(()).unwrap();

    pool.stop(StopPolicy::Drain);

    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(pool.stats()[0].skipped, 1);
}

#[test]
fn test_round_robin_spreads_submissions() {
    init_tracing();
    let pool = BackgroundPool::start("bg-rr", 3, BatchPolicy::Unbounded).unwrap();

    for _ in 0..30 {
        pool.submit(|| {}).unwrap();
    }

    pool.stop(StopPolicy::Drain);

    for stats in pool.stats() {
        assert_eq!(stats.submitted, 10, "worker {} unbalanced", stats.name);
    }
}
