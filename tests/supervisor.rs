mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{drain_worker_events, next_matching, Behavior, ScriptedPool, Trace};
use procvisor::{
    EventKind, Exit, Hook, HookError, ManagementConfig, RestartPolicy, Signal, SpawnTarget,
    Supervisor, SupervisorConfig, SupervisorError, WorkerStatus,
};
use tokio::time::Instant;

fn graceful_pair(trace: &Trace) -> Vec<SpawnTarget> {
    vec![
        ScriptedPool::target("A", Behavior::Graceful, trace),
        ScriptedPool::target("B", Behavior::Graceful, trace),
    ]
}

#[tokio::test(start_paused = true)]
async fn workers_start_one_after_another() {
    let trace = Trace::default();
    let sup = Supervisor::builder(graceful_pair(&trace), SupervisorConfig::default()).build();
    let mut rx = sup.subscribe();

    sup.start().await.unwrap();

    assert_eq!(
        trace.entries(),
        vec!["fork:A", "started:A", "fork:B", "started:B"]
    );
    assert_eq!(
        drain_worker_events(&mut rx),
        vec![
            (EventKind::WorkerReady, 0),
            (EventKind::WorkerStarted, 0),
            (EventKind::WorkerReady, 1),
            (EventKind::WorkerStarted, 1),
        ]
    );

    let infos = sup.workers();
    assert_eq!(&*infos[0].title, "A");
    assert_eq!(infos[0].status, WorkerStatus::Started);
    assert_eq!(infos[1].status, WorkerStatus::Started);
}

#[tokio::test(start_paused = true)]
async fn global_stop_is_graceful_for_cooperative_workers() {
    let trace = Trace::default();
    let sup = Supervisor::builder(graceful_pair(&trace), SupervisorConfig::default()).build();
    sup.start().await.unwrap();
    let mut rx = sup.subscribe();

    sup.stop().await.unwrap();

    assert!(sup.is_shutting_down());
    let events = drain_worker_events(&mut rx);
    let stopped = events
        .iter()
        .filter(|(k, _)| *k == EventKind::WorkerStopped)
        .count();
    assert_eq!(stopped, 2);
    assert!(events.iter().all(|(k, _)| *k != EventKind::WorkerKilled));
    assert_eq!(trace.count("stop:A"), 1);
    assert_eq!(trace.count("stop:B"), 1);
    for info in sup.workers() {
        assert_eq!(info.status, WorkerStatus::Stopped);
        assert_eq!(info.pid, None);
    }
}

#[tokio::test(start_paused = true)]
async fn ready_timeout_does_not_block_later_workers() {
    let trace = Trace::default();
    let targets = vec![
        ScriptedPool::target("A", Behavior::NeverReady, &trace),
        ScriptedPool::target("B", Behavior::Graceful, &trace),
    ];
    let sup = Supervisor::builder(targets, SupervisorConfig::default()).build();
    let mut rx = sup.subscribe();

    let begin = Instant::now();
    sup.start().await.unwrap();
    assert!(begin.elapsed() >= Duration::from_secs(10));

    let err = next_matching(&mut rx, |e| e.kind == EventKind::WorkerError).await;
    assert_eq!(err.worker_id(), Some(0));
    assert_eq!(err.error, Some("worker_ready_timeout"));

    assert_eq!(sup.workers()[0].status, WorkerStatus::Spawned);
    assert_eq!(sup.workers()[1].status, WorkerStatus::Started);
    assert_eq!(trace.count("started:B"), 1);

    // The timed-out process is still owned by its slot and gets stopped.
    sup.stop().await.unwrap();
    assert_eq!(trace.count("stop:A"), 1);
}

#[tokio::test(start_paused = true)]
async fn start_failure_of_first_worker_continues_the_sequence() {
    let trace = Trace::default();
    let targets = vec![
        ScriptedPool::target("A", Behavior::ExitOnStart(3), &trace),
        ScriptedPool::target("B", Behavior::Graceful, &trace),
    ];
    let sup = Supervisor::builder(targets, SupervisorConfig::default()).build();
    let mut rx = sup.subscribe();

    sup.start().await.unwrap();

    let err = next_matching(&mut rx, |e| e.kind == EventKind::WorkerError).await;
    assert_eq!(err.worker_id(), Some(0));
    assert_eq!(err.error, Some("worker_start_failure"));
    assert_eq!(sup.workers()[0].status, WorkerStatus::Errored);
    assert_eq!(sup.workers()[1].status, WorkerStatus::Started);

    let direct = sup.handles()[0].start().await.unwrap_err();
    assert!(matches!(direct, SupervisorError::StartFailure { code: Some(3) }));
}

#[tokio::test(start_paused = true)]
async fn stubborn_worker_is_killed_once_after_kill_timeout() {
    let trace = Trace::default();
    let targets = vec![ScriptedPool::target("A", Behavior::IgnoreStop, &trace)];
    let cfg = SupervisorConfig::default().with_kill_timeout(Duration::from_secs(5));
    let sup = Supervisor::builder(targets, cfg).build();
    sup.start().await.unwrap();
    let mut rx = sup.subscribe();

    let begin = Instant::now();
    let exit = sup.handles()[0].stop().await.unwrap();
    let elapsed = begin.elapsed();

    assert_eq!(exit, Some(Exit::signaled(Signal::Kill)));
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_secs(6));
    assert_eq!(trace.count("stop:A"), 1);
    assert_eq!(trace.count("signal:A:SIGKILL"), 1);

    let killed = next_matching(&mut rx, |e| e.worker_id().is_some()).await;
    assert_eq!(killed.kind, EventKind::WorkerKilled);
    assert_eq!(killed.exit, Some(Exit::signaled(Signal::Kill)));
    assert_eq!(sup.workers()[0].status, WorkerStatus::Killed);
}

#[tokio::test(start_paused = true)]
async fn stopping_a_stopped_worker_is_an_error_except_during_shutdown() {
    let trace = Trace::default();
    let sup = Supervisor::builder(graceful_pair(&trace), SupervisorConfig::default()).build();
    let mut rx = sup.subscribe();

    // Never started.
    let err = sup.handles()[1].stop().await.unwrap_err();
    assert!(matches!(err, SupervisorError::AlreadyStopped));
    let ev = next_matching(&mut rx, |e| e.kind == EventKind::WorkerError).await;
    assert_eq!(ev.error, Some("worker_already_stopped"));

    let a = &sup.handles()[0];
    a.start().await.unwrap();
    assert_eq!(a.stop().await.unwrap(), Some(Exit::code(0)));
    assert!(matches!(
        a.stop().await,
        Err(SupervisorError::AlreadyStopped)
    ));

    sup.stop().await.unwrap();
    assert_eq!(a.stop().await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn starting_a_started_worker_is_rejected() {
    let trace = Trace::default();
    let sup = Supervisor::builder(graceful_pair(&trace), SupervisorConfig::default()).build();
    let a = &sup.handles()[0];
    a.start().await.unwrap();

    let err = a.start().await.unwrap_err();
    assert!(matches!(err, SupervisorError::AlreadyStarted));
    assert_eq!(trace.count("fork:A"), 1);
}

#[tokio::test(start_paused = true)]
async fn automatic_restarts_stop_at_the_cap() {
    let trace = Trace::default();
    let pool = ScriptedPool::new("A", &[Behavior::CrashAfterStart(1)], &trace);
    let forks = pool.forks();
    let cfg = SupervisorConfig::default().with_restarts(2);
    let sup = Supervisor::builder([SpawnTarget::pool(pool)], cfg).build();
    let mut rx = sup.subscribe();

    sup.start().await.unwrap();
    let stopped = next_matching(&mut rx, |e| e.kind == EventKind::WorkerStopped).await;

    assert_eq!(stopped.exit, Some(Exit::code(1)));
    assert_eq!(forks.load(Ordering::SeqCst), 3);
    let info = sup.workers().remove(0);
    assert_eq!(info.restarts.policy, RestartPolicy::Limited(2));
    assert_eq!(info.restarts.automatic, 2);
    assert_eq!(info.restarts.manual, 0);
    assert_eq!(info.status, WorkerStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn automatic_restart_waits_for_the_restart_delay() {
    let trace = Trace::default();
    let pool = ScriptedPool::new(
        "A",
        &[Behavior::CrashAfterStart(2), Behavior::Graceful],
        &trace,
    );
    let forks = pool.forks();
    let mut cfg = SupervisorConfig::default().with_restarts(-1);
    cfg.restart_delay = Duration::from_secs(3);
    let sup = Supervisor::builder([SpawnTarget::pool(pool)], cfg).build();
    let mut rx = sup.subscribe();

    sup.start().await.unwrap();
    let begin = Instant::now();
    let restarted = next_matching(&mut rx, |e| e.kind == EventKind::WorkerRestarted).await;
    assert!(begin.elapsed() >= Duration::from_secs(3));
    assert_eq!(restarted.reason.as_deref(), Some("automatic"));

    next_matching(&mut rx, |e| e.kind == EventKind::WorkerStarted).await;
    assert_eq!(forks.load(Ordering::SeqCst), 2);
    assert_eq!(sup.workers()[0].restarts.automatic, 1);
}

#[tokio::test(start_paused = true)]
async fn clean_exit_is_never_restarted() {
    let trace = Trace::default();
    let pool = ScriptedPool::new("A", &[Behavior::CrashAfterStart(0)], &trace);
    let forks = pool.forks();
    let cfg = SupervisorConfig::default().with_restarts(-1);
    let sup = Supervisor::builder([SpawnTarget::pool(pool)], cfg).build();
    let mut rx = sup.subscribe();

    sup.start().await.unwrap();
    let stopped = next_matching(&mut rx, |e| e.kind == EventKind::WorkerStopped).await;
    assert_eq!(stopped.exit, Some(Exit::code(0)));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(forks.load(Ordering::SeqCst), 1);
    assert_eq!(sup.workers()[0].restarts.automatic, 0);
}

#[tokio::test(start_paused = true)]
async fn manual_restart_stops_then_starts() {
    let trace = Trace::default();
    let sup = Supervisor::builder(graceful_pair(&trace), SupervisorConfig::default()).build();
    let a = &sup.handles()[0];
    a.start().await.unwrap();
    let mut rx = sup.subscribe();

    a.restart().await.unwrap();

    assert_eq!(
        drain_worker_events(&mut rx),
        vec![
            (EventKind::WorkerStopped, 0),
            (EventKind::WorkerRestarted, 0),
            (EventKind::WorkerReady, 0),
            (EventKind::WorkerStarted, 0),
        ]
    );
    assert_eq!(trace.count("fork:A"), 2);
    let info = a.info();
    assert_eq!(info.restarts.manual, 1);
    assert_eq!(info.restarts.automatic, 0);
    assert_eq!(info.status, WorkerStatus::Started);
}

#[tokio::test(start_paused = true)]
async fn stop_during_handshake_interrupts_the_start() {
    let trace = Trace::default();
    let targets = vec![ScriptedPool::target("A", Behavior::NeverReady, &trace)];
    let sup = Supervisor::builder(targets, SupervisorConfig::default()).build();
    let a = sup.handles()[0].clone();

    let starting = tokio::spawn({
        let a = a.clone();
        async move { a.start().await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(a.status(), WorkerStatus::Spawned);

    assert_eq!(a.stop().await.unwrap(), Some(Exit::code(0)));
    let res = starting.await.unwrap();
    assert!(matches!(
        res,
        Err(SupervisorError::StartInterrupted { signal: None })
    ));
    assert_eq!(a.status(), WorkerStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn restart_while_starting_is_rejected() {
    let trace = Trace::default();
    let targets = vec![ScriptedPool::target("A", Behavior::NeverReady, &trace)];
    let sup = Supervisor::builder(targets, SupervisorConfig::default()).build();
    let a = sup.handles()[0].clone();

    let starting = tokio::spawn({
        let a = a.clone();
        async move { a.start().await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(matches!(
        a.restart().await,
        Err(SupervisorError::RestartInProgress)
    ));
    assert!(matches!(
        starting.await.unwrap(),
        Err(SupervisorError::ReadyTimeout { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn hooks_wrap_the_sequences() {
    let trace = Trace::default();
    let starts = Arc::new(AtomicUsize::new(0));
    let on_start = {
        let starts = Arc::clone(&starts);
        Hook::new(move || {
            let starts = Arc::clone(&starts);
            async move {
                starts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    };
    let on_stop = Hook::new(|| async { Err(HookError::new("flush failed")) });
    let sup = Supervisor::builder(graceful_pair(&trace), SupervisorConfig::default())
        .on_start(on_start)
        .on_stop(on_stop)
        .build();

    sup.start().await.unwrap();
    assert_eq!(starts.load(Ordering::SeqCst), 1);

    // A failing stop hook is reported, but workers are still stopped.
    let err = sup.stop().await.unwrap_err();
    assert!(matches!(err, SupervisorError::Hook(_)));
    assert_eq!(trace.count("stop:A"), 1);
    assert_eq!(trace.count("stop:B"), 1);
}

#[tokio::test(start_paused = true)]
async fn failing_start_hook_spawns_nothing() {
    let trace = Trace::default();
    let sup = Supervisor::builder(graceful_pair(&trace), SupervisorConfig::default())
        .on_start(Hook::new(|| async { Err(HookError::new("no config")) }))
        .build();

    assert!(matches!(sup.start().await, Err(SupervisorError::Hook(_))));
    assert!(trace.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn management_interface_echoes_worker_events() {
    let trace = Trace::default();
    let cfg = SupervisorConfig::default().with_management(ManagementConfig::default());
    let sup = Supervisor::builder(graceful_pair(&trace), cfg).build();
    let mgmt = sup.management().expect("management enabled");
    let mut console = mgmt.attach();

    sup.start().await.unwrap();

    let mut lines = Vec::new();
    for _ in 0..4 {
        let line = tokio::time::timeout(Duration::from_secs(5), console.recv())
            .await
            .unwrap()
            .unwrap();
        lines.push(line);
    }
    assert_eq!(
        lines,
        vec![
            "0/A: worker ready",
            "0/A: worker started",
            "1/B: worker ready",
            "1/B: worker started",
        ]
    );
    assert_eq!(mgmt.workers().len(), 2);

    mgmt.worker(1).unwrap().stop().await.unwrap();
    assert_eq!(mgmt.workers()[1].status, WorkerStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn restart_due_during_shutdown_is_dropped() {
    let trace = Trace::default();
    let pool = ScriptedPool::new(
        "A",
        &[Behavior::CrashAfterStart(1), Behavior::Graceful],
        &trace,
    );
    let forks = pool.forks();
    let cfg = SupervisorConfig::default().with_restarts(3);
    // Outlasts the 1s restart delay.
    let on_stop = Hook::new(|| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    });
    let sup = Supervisor::builder([SpawnTarget::pool(pool)], cfg)
        .on_stop(on_stop)
        .build();
    let mut rx = sup.subscribe();

    sup.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    sup.stop().await.unwrap();

    assert_eq!(forks.load(Ordering::SeqCst), 1);
    let mut stopped = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        assert_ne!(ev.kind, EventKind::WorkerRestarted);
        if ev.kind == EventKind::WorkerStopped {
            stopped.push(ev.exit);
        }
    }
    assert_eq!(stopped, vec![Some(Exit::code(1))]);
    let info = sup.workers().remove(0);
    assert_eq!(info.restarts.automatic, 0);
    assert_eq!(info.status, WorkerStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn signaled_exit_is_never_restarted() {
    let trace = Trace::default();
    let pool = ScriptedPool::new(
        "A",
        &[Behavior::SignaledAfterStart(Signal::Terminate)],
        &trace,
    );
    let forks = pool.forks();
    let cfg = SupervisorConfig::default().with_restarts(-1);
    let sup = Supervisor::builder([SpawnTarget::pool(pool)], cfg).build();
    let mut rx = sup.subscribe();

    sup.start().await.unwrap();
    let stopped = next_matching(&mut rx, |e| e.kind == EventKind::WorkerStopped).await;
    assert_eq!(stopped.exit, Some(Exit::signaled(Signal::Terminate)));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(forks.load(Ordering::SeqCst), 1);
    let info = sup.workers().remove(0);
    assert_eq!(info.restarts.automatic, 0);
    assert_eq!(info.status, WorkerStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_start_times_out() {
    let trace = Trace::default();
    let targets = vec![ScriptedPool::target("A", Behavior::NeverStarted, &trace)];
    let sup = Supervisor::builder(targets, SupervisorConfig::default()).build();
    let mut rx = sup.subscribe();
    let a = &sup.handles()[0];

    let begin = Instant::now();
    let err = a.start().await.unwrap_err();
    assert!(begin.elapsed() >= Duration::from_secs(10));
    assert!(matches!(
        err,
        SupervisorError::StartAckTimeout { timeout } if timeout == Duration::from_secs(10)
    ));
    assert_eq!(trace.count("ignored-start:A"), 1);

    let ev = next_matching(&mut rx, |e| e.kind == EventKind::WorkerError).await;
    assert_eq!(ev.error, Some("worker_start_ack_timeout"));
    // The process is kept and still answers a stop.
    assert_eq!(a.status(), WorkerStatus::Ready);
    assert_eq!(a.stop().await.unwrap(), Some(Exit::code(0)));
}

#[tokio::test(start_paused = true)]
async fn signal_during_handshake_interrupts_the_start() {
    let trace = Trace::default();
    let targets = vec![
        ScriptedPool::target("A", Behavior::SignaledOnStart(Signal::Terminate), &trace),
        ScriptedPool::target("B", Behavior::SignaledOnStart(Signal::Kill), &trace),
    ];
    let sup = Supervisor::builder(targets, SupervisorConfig::default()).build();
    let mut rx = sup.subscribe();
    let (a, b) = (&sup.handles()[0], &sup.handles()[1]);

    assert!(matches!(
        a.start().await,
        Err(SupervisorError::StartInterrupted {
            signal: Some(Signal::Terminate)
        })
    ));
    let stopped = next_matching(&mut rx, |e| e.kind == EventKind::WorkerStopped).await;
    assert_eq!(stopped.worker_id(), Some(0));
    assert_eq!(stopped.exit, Some(Exit::signaled(Signal::Terminate)));
    assert_eq!(a.status(), WorkerStatus::Stopped);
    assert_eq!(a.info().pid, None);

    assert!(matches!(
        b.start().await,
        Err(SupervisorError::StartInterrupted {
            signal: Some(Signal::Kill)
        })
    ));
    let killed = next_matching(&mut rx, |e| e.kind == EventKind::WorkerKilled).await;
    assert_eq!(killed.worker_id(), Some(1));
    assert_eq!(b.status(), WorkerStatus::Killed);
}

#[tokio::test(start_paused = true)]
async fn supervisor_start_leaves_running_workers_alone() {
    let trace = Trace::default();
    let sup = Supervisor::builder(graceful_pair(&trace), SupervisorConfig::default()).build();
    sup.handles()[0].start().await.unwrap();

    sup.start().await.unwrap();

    assert_eq!(trace.count("fork:A"), 1);
    assert_eq!(trace.count("fork:B"), 1);
    for info in sup.workers() {
        assert_eq!(info.status, WorkerStatus::Started);
    }
}

#[tokio::test(start_paused = true)]
async fn abandoned_start_request_leaves_the_worker_usable() {
    let trace = Trace::default();
    let targets = vec![ScriptedPool::target("A", Behavior::NeverReady, &trace)];
    let sup = Supervisor::builder(targets, SupervisorConfig::default()).build();
    let a = sup.handles()[0].clone();

    let starting = tokio::spawn({
        let a = a.clone();
        async move { a.start().await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    starting.abort();

    // The ready timeout elapses with nobody waiting for the reply.
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(a.status(), WorkerStatus::Spawned);
    assert_eq!(a.stop().await.unwrap(), Some(Exit::code(0)));
    assert_eq!(a.status(), WorkerStatus::Stopped);
}
