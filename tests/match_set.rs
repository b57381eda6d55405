//! End-to-end coverage driving the real `mock-engine` child process
//! through the full match-set runner / Elo updater path, rather than
//! asserting on the pieces in isolation. Spawns the crate's own
//! `mock-engine` binary under test, with two cooperating instances
//! talking UGI to each other.

use ugi_arena::elo::{apply_match_set_result, DEFAULT_K_FACTOR};
use ugi_arena::game::{Color, GameOutcome, MatchSet, StartingPosition, TimeControl};
use ugi_arena::matchset::run_match_set;
use ugi_arena::persistence::memory::MemoryPersistence;
use ugi_arena::persistence::PersistenceAdapter;
use ugi_arena::testing::mock_session_config;

fn one_position_match_set(name: &str) -> MatchSet {
    MatchSet {
        name: name.to_string(),
        description: None,
        positions: vec![StartingPosition {
            name: "startpos".to_string(),
            description: None,
            moves: Vec::new(),
            alternative_initial_state: None,
        }],
        games_per_position: 2,
    }
}

fn two_position_match_set(name: &str) -> MatchSet {
    MatchSet {
        name: name.to_string(),
        description: None,
        positions: vec![
            StartingPosition {
                name: "startpos".to_string(),
                description: None,
                moves: Vec::new(),
                alternative_initial_state: None,
            },
            StartingPosition {
                name: "second".to_string(),
                description: None,
                moves: Vec::new(),
                alternative_initial_state: None,
            },
        ],
        games_per_position: 2,
    }
}

/// Equal-rated engines, one win and one loss each (a draw sweep would
/// also zero out, so this scripts an actual result split via
/// `MOCK_ENGINE_P1_RESULT=win`, which always favors player 1 — over two
/// games with swapped colors, engine1 wins once and loses once).
#[tokio::test]
async fn equal_rated_pair_splits_evenly_and_ratings_hold() {
    let store = MemoryPersistence::new();
    let id1 = store.add_engine("alpha", 1500, None).await.unwrap();
    let id2 = store.add_engine("beta", 1500, None).await.unwrap();
    let engines = store.get_engines_for_scheduling().await.unwrap();
    let e1 = engines.iter().find(|e| e.id == id1).unwrap().clone();
    let e2 = engines.iter().find(|e| e.id == id2).unwrap().clone();

    let config1 = mock_session_config("alpha", 4, "win");
    let config2 = mock_session_config("beta", 4, "win");
    let match_set = one_position_match_set("s1");
    let time_control = TimeControl::parse("5+0").unwrap();

    let result = run_match_set(e1, e2, &config1, &config2, &match_set, time_control, None).await;

    assert!(result.completed, "no game should error: {:?}", result.games);
    assert_eq!(result.games.len(), 2);
    assert_eq!(result.engine1_score, 1.0);
    assert_eq!(result.engine2_score, 1.0);

    let white_games = result.games.iter().filter(|g| g.engine1_color == Color::White).count();
    let black_games = result.games.iter().filter(|g| g.engine1_color == Color::Black).count();
    assert_eq!(white_games, 1);
    assert_eq!(black_games, 1);

    apply_match_set_result(&store, &result, DEFAULT_K_FACTOR).await.unwrap();

    let engines = store.get_engines_for_scheduling().await.unwrap();
    let alpha = engines.iter().find(|e| e.id == id1).unwrap();
    let beta = engines.iter().find(|e| e.id == id2).unwrap();
    assert_eq!(alpha.rating, 1500);
    assert_eq!(beta.rating, 1500);
    assert_eq!(alpha.games_played, 2);
    assert_eq!(beta.games_played, 2);
}

/// A draw sweep leaves both ratings untouched but still records every
/// game.
#[tokio::test]
async fn draw_sweep_leaves_ratings_unchanged() {
    let store = MemoryPersistence::new();
    let id1 = store.add_engine("alpha", 1500, None).await.unwrap();
    let id2 = store.add_engine("beta", 1500, None).await.unwrap();
    let engines = store.get_engines_for_scheduling().await.unwrap();
    let e1 = engines.iter().find(|e| e.id == id1).unwrap().clone();
    let e2 = engines.iter().find(|e| e.id == id2).unwrap().clone();

    let config1 = mock_session_config("alpha", 4, "draw");
    let config2 = mock_session_config("beta", 4, "draw");
    let match_set = one_position_match_set("s3");
    let time_control = TimeControl::parse("5+0").unwrap();

    let result = run_match_set(e1, e2, &config1, &config2, &match_set, time_control, None).await;
    assert!(result.completed);
    assert!(result.games.iter().all(|g| g.outcome == GameOutcome::Draw));
    assert_eq!(result.engine1_score, 1.0);
    assert_eq!(result.engine2_score, 1.0);

    apply_match_set_result(&store, &result, DEFAULT_K_FACTOR).await.unwrap();

    let engines = store.get_engines_for_scheduling().await.unwrap();
    let alpha = engines.iter().find(|e| e.id == id1).unwrap();
    let beta = engines.iter().find(|e| e.id == id2).unwrap();
    assert_eq!(alpha.rating, 1500);
    assert_eq!(beta.rating, 1500);
}

/// An upset where the lower-rated engine wins both games pulls rating
/// from the higher-rated one, with the two deltas summing to within 1
/// (Elo rating transfer is a zero-sum exchange up to rounding). The
/// mock engine scripts results by seat (whichever side is queried as
/// "player 1"), so it cannot script "engine1 wins regardless of color"
/// on its own; this builds the `MatchSetResult` directly to exercise
/// the Elo updater against real persistence instead of through a live
/// process.
#[tokio::test]
async fn upset_moves_rating_toward_the_winner() {
    use ugi_arena::game::GameResult;
    use ugi_arena::persistence::EngineRecord;

    let store = MemoryPersistence::new();
    let id1 = store.add_engine("underdog", 1400, None).await.unwrap();
    let id2 = store.add_engine("favorite", 1600, None).await.unwrap();
    let engines = store.get_engines_for_scheduling().await.unwrap();
    let e1: EngineRecord = engines.iter().find(|e| e.id == id1).unwrap().clone();
    let e2: EngineRecord = engines.iter().find(|e| e.id == id2).unwrap().clone();

    let make_win = |c1: Color| GameResult {
        starting_position: "startpos".to_string(),
        match_set: "s2".to_string(),
        engine1_color: c1,
        engine2_color: c1.opposite(),
        outcome: GameOutcome::Win,
        moves: vec!["m1".to_string()],
        duration: std::time::Duration::from_millis(10),
        final_status: Default::default(),
        error: None,
    };

    let result = ugi_arena::matchset::MatchSetResult {
        engine1: e1,
        engine2: e2,
        match_set_name: "s2".to_string(),
        games: vec![make_win(Color::White), make_win(Color::Black)],
        engine1_score: 2.0,
        engine2_score: 0.0,
        total_games: 2,
        completed: true,
    };

    apply_match_set_result(&store, &result, DEFAULT_K_FACTOR).await.unwrap();

    let engines = store.get_engines_for_scheduling().await.unwrap();
    let underdog = engines.iter().find(|e| e.id == id1).unwrap();
    let favorite = engines.iter().find(|e| e.id == id2).unwrap();
    assert!(underdog.rating > 1400);
    assert!(favorite.rating < 1600);
    let delta1 = underdog.rating - 1400;
    let delta2 = favorite.rating - 1600;
    assert!((delta1 + delta2).abs() <= 1);

    let recent = store.get_recent_games(24).await.unwrap();
    assert_eq!(recent.len(), 2);
}

/// An engine that exits without speaking the protocol partway through a
/// match set still leaves the set `completed = false`, but the rating
/// update is computed from the remaining N=3 good games, excluding the
/// one the crashed engine ruined.
#[tokio::test]
async fn engine_crash_mid_set_excludes_the_error_game_from_the_update() {
    let store = MemoryPersistence::new();
    let id1 = store.add_engine("alpha", 1500, None).await.unwrap();
    let id2 = store.add_engine("beta", 1500, None).await.unwrap();
    let engines = store.get_engines_for_scheduling().await.unwrap();
    let e1 = engines.iter().find(|e| e.id == id1).unwrap().clone();
    let e2 = engines.iter().find(|e| e.id == id2).unwrap().clone();

    let config1 = mock_session_config("alpha", 4, "win");
    let mut config2 = mock_session_config("beta", 4, "win");

    let counter_file = std::env::temp_dir().join(format!(
        "ugi-arena-test-crash-counter-{}-{}",
        std::process::id(),
        "mid-set"
    ));
    let _ = std::fs::remove_file(&counter_file);
    config2.env.insert(
        "MOCK_ENGINE_COUNTER_FILE".to_string(),
        counter_file.to_string_lossy().into_owned(),
    );
    config2
        .env
        .insert("MOCK_ENGINE_CRASH_ON_INVOCATION".to_string(), "2".to_string());

    let match_set = two_position_match_set("s4");
    let time_control = TimeControl::parse("5+0").unwrap();

    let result = run_match_set(e1, e2, &config1, &config2, &match_set, time_control, None).await;
    let _ = std::fs::remove_file(&counter_file);

    assert!(!result.completed, "one game should have errored");
    assert_eq!(result.games.len(), 4);
    let errored: Vec<_> = result.games.iter().filter(|g| g.outcome == GameOutcome::Error).collect();
    assert_eq!(errored.len(), 1);

    apply_match_set_result(&store, &result, DEFAULT_K_FACTOR).await.unwrap();

    let engines = store.get_engines_for_scheduling().await.unwrap();
    let alpha = engines.iter().find(|e| e.id == id1).unwrap();
    let beta = engines.iter().find(|e| e.id == id2).unwrap();
    assert_eq!(alpha.games_played, 3);
    assert_eq!(beta.games_played, 3);

    let recent = store.get_recent_games(24).await.unwrap();
    assert_eq!(recent.len(), 4, "every game is recorded, including the errored one");
}
