//! End-to-end coverage of the scheduler's concurrency cap and graceful
//! shutdown, driven against real `mock-engine` child processes through
//! `MemoryPersistence` rather than a running database.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ugi_arena::game::TimeControl;
use ugi_arena::persistence::memory::MemoryPersistence;
use ugi_arena::persistence::PersistenceAdapter;
use ugi_arena::scheduler::{Scheduler, SchedulerConfig};
use ugi_arena::testing::mock_session_config;

/// A config for one engine's mock process: sleeps `think_ms` before every
/// `bestmove` so a match set's duration is controllable, and bumps a
/// shared counter file while its process is alive so the test can poll
/// how many engine processes are running at once.
fn timed_session_config(name: &str, think_ms: u64, activity_file: &std::path::Path) -> ugi_arena::ugi::SessionConfig {
    let mut config = mock_session_config(name, 4, "win");
    config.env.insert("MOCK_ENGINE_THINK_MS".to_string(), think_ms.to_string());
    config.env.insert(
        "MOCK_ENGINE_ACTIVITY_FILE".to_string(),
        activity_file.to_string_lossy().into_owned(),
    );
    config
}

fn read_activity(path: &std::path::Path) -> i64 {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

/// Polls `activity_file` until its count becomes positive, so a test can
/// wait for the scheduler's first match set to actually start its child
/// processes before acting.
async fn wait_until_active(activity_file: &std::path::Path) {
    for _ in 0..200 {
        if read_activity(activity_file) > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no engine process became active in time");
}

#[tokio::test]
async fn concurrency_cap_is_never_exceeded() {
    let activity_file = std::env::temp_dir().join(format!(
        "ugi-arena-test-activity-{}-cap",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&activity_file);
    std::fs::write(&activity_file, "0").unwrap();

    let persistence: Arc<dyn PersistenceAdapter> = Arc::new(MemoryPersistence::new());
    let mut session_configs = HashMap::new();
    let names = ["alpha", "beta", "gamma", "delta"];
    for name in names {
        persistence.add_engine(name, 1500, None).await.unwrap();
        session_configs.insert(
            name.to_string(),
            timed_session_config(name, 150, &activity_file),
        );
    }

    let concurrency = 2;
    let config = SchedulerConfig {
        concurrency,
        time_control: TimeControl::parse("5+0").unwrap(),
        move_cap: None,
        k_factor: ugi_arena::elo::DEFAULT_K_FACTOR,
        match_sets: Vec::new(),
        default_match_set: None,
        session_configs,
    };

    let scheduler = Scheduler::new(persistence.clone(), config);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    let mut max_observed = 0i64;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(4);
    while tokio::time::Instant::now() < deadline {
        max_observed = max_observed.max(read_activity(&activity_file));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let _ = shutdown_tx.send(true);
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("scheduler did not drain in time")
        .unwrap()
        .unwrap();

    let _ = std::fs::remove_file(&activity_file);

    // Each in-flight match set keeps at most two engine processes alive
    // at once (the pair currently playing), so the cap bounds the total
    // process count at `concurrency * 2`.
    assert!(
        max_observed <= (concurrency * 2) as i64,
        "observed {max_observed} concurrent engine processes with a concurrency cap of {concurrency}"
    );
}

#[tokio::test]
async fn graceful_shutdown_drains_in_flight_and_spawns_nothing_new() {
    let activity_file = std::env::temp_dir().join(format!(
        "ugi-arena-test-activity-{}-shutdown",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&activity_file);
    std::fs::write(&activity_file, "0").unwrap();

    let persistence: Arc<dyn PersistenceAdapter> = Arc::new(MemoryPersistence::new());
    let mut session_configs = HashMap::new();
    // Three engines give three candidate pairs, so a scheduler that kept
    // spawning after shutdown would have somewhere to go.
    let names = ["alpha", "beta", "gamma"];
    for name in names {
        persistence.add_engine(name, 1500, None).await.unwrap();
        session_configs.insert(
            name.to_string(),
            timed_session_config(name, 200, &activity_file),
        );
    }

    let config = SchedulerConfig {
        concurrency: 1,
        time_control: TimeControl::parse("5+0").unwrap(),
        move_cap: None,
        k_factor: ugi_arena::elo::DEFAULT_K_FACTOR,
        match_sets: Vec::new(),
        default_match_set: None,
        session_configs,
    };

    let scheduler = Scheduler::new(persistence.clone(), config);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    wait_until_active(&activity_file).await;
    let _ = shutdown_tx.send(true);

    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("scheduler did not drain in time")
        .unwrap()
        .unwrap();

    let _ = std::fs::remove_file(&activity_file);

    // The in-flight match set (one synthetic position, two games) ran to
    // completion; nothing further was spawned once shutdown was observed.
    let recent = persistence.get_recent_games(24).await.unwrap();
    assert_eq!(recent.len(), 2, "expected exactly one match set's worth of games");
}
