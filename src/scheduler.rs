//! Pairing scheduler: fills a fixed-size working set of in-flight match
//! sets, picking the next pair by weighted sampling each time a slot
//! frees up.
//!
//! The working set is a `FuturesUnordered` refilled one slot at a time as
//! tasks complete, rather than run in chunked batches — a new match set
//! starts the instant any one finishes instead of waiting for the whole
//! batch to drain.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use rand::distributions::{Distribution, WeightedIndex};
use rand::thread_rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::elo::apply_match_set_result;
use crate::error::Result;
use crate::game::{MatchSet, TimeControl};
use crate::matchset::run_match_set;
use crate::persistence::{EngineRecord, GameRow, PairKey, PersistenceAdapter};
use crate::ugi::SessionConfig;

/// No-candidate backoff before retrying pair selection.
const RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct SchedulerConfig {
    pub concurrency: usize,
    pub time_control: TimeControl,
    pub move_cap: Option<u32>,
    pub k_factor: f64,
    pub match_sets: Vec<MatchSet>,
    pub default_match_set: Option<String>,
    /// Engine name -> launch parameters, built from `EngineConfig` plus
    /// any per-match-set option overrides.
    pub session_configs: HashMap<String, SessionConfig>,
}

impl SchedulerConfig {
    fn pick_match_set(&self) -> MatchSet {
        if let Some(name) = &self.default_match_set {
            if let Some(found) = self.match_sets.iter().find(|m| &m.name == name) {
                return found.clone();
            }
        }
        if let Some(first) = self.match_sets.first() {
            return first.clone();
        }
        synthetic_match_set()
    }
}

fn synthetic_match_set() -> MatchSet {
    MatchSet {
        name: "default".to_string(),
        description: None,
        positions: vec![crate::game::StartingPosition {
            name: "startpos".to_string(),
            description: None,
            moves: Vec::new(),
            alternative_initial_state: None,
        }],
        games_per_position: 2,
    }
}

pub struct Scheduler {
    persistence: Arc<dyn PersistenceAdapter>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(persistence: Arc<dyn PersistenceAdapter>, config: SchedulerConfig) -> Self {
        Self { persistence, config }
    }

    /// Runs until `shutdown` reports `true`: stops issuing new match sets
    /// and waits for in-flight ones to drain.
    #[tracing::instrument(skip_all)]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut in_flight: FuturesUnordered<JoinHandle<Result<()>>> = FuturesUnordered::new();

        loop {
            while in_flight.len() < self.config.concurrency && !*shutdown.borrow() {
                match self.spawn_next().await? {
                    Some(handle) => in_flight.push(handle),
                    None => {
                        warn!("no candidate pair with positive weight, backing off");
                        tokio::time::sleep(RETRY_DELAY).await;
                        break;
                    }
                }
            }

            if *shutdown.borrow() && in_flight.is_empty() {
                info!("scheduler drained, shutting down");
                return Ok(());
            }

            if in_flight.is_empty() {
                // Nothing running: either we just backed off with no
                // candidate pair, or a shutdown arrived with the working
                // set already empty. Loop back rather than `select!` on a
                // `FuturesUnordered` with nothing to poll.
                continue;
            }

            tokio::select! {
                Some(result) = in_flight.next() => {
                    if let Err(err) = result {
                        warn!("match set task panicked: {err}");
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
    }

    #[tracing::instrument(skip(self), err)]
    async fn spawn_next(&self) -> Result<Option<JoinHandle<Result<()>>>> {
        let engines = self.persistence.get_engines_for_scheduling().await?;
        let recent_games = self.persistence.get_recent_games(24).await?;
        let pair_counts = self.persistence.get_pair_game_counts().await?;

        let Some((e1, e2)) = select_pair(&engines, &recent_games, &pair_counts) else {
            return Ok(None);
        };

        let Some(config1) = self.config.session_configs.get(&e1.name).cloned() else {
            warn!(engine = %e1.name, "no session config for scheduled engine, skipping");
            return Ok(None);
        };
        let Some(config2) = self.config.session_configs.get(&e2.name).cloned() else {
            warn!(engine = %e2.name, "no session config for scheduled engine, skipping");
            return Ok(None);
        };

        let match_set = self.config.pick_match_set();
        let time_control = self.config.time_control;
        let move_cap = self.config.move_cap;
        let k_factor = self.config.k_factor;
        let persistence = self.persistence.clone();

        info!(engine1 = %e1.name, engine2 = %e2.name, match_set = %match_set.name, "starting match set");

        let handle = tokio::spawn(async move {
            let result = run_match_set(e1, e2, &config1, &config2, &match_set, time_control, move_cap).await;
            apply_match_set_result(persistence.as_ref(), &result, k_factor).await
        });

        Ok(Some(handle))
    }
}

/// Picks the next unordered pair to play via the weight formula: rank
/// all pairs, shortlist the top 5, then weighted-sample one from the
/// shortlist. Returns `None` if every pair has weight <= 0 (all
/// over-played).
fn select_pair(
    engines: &[EngineRecord],
    recent_games: &[GameRow],
    pair_counts: &HashMap<PairKey, u32>,
) -> Option<(EngineRecord, EngineRecord)> {
    let uncertainty = |engine: &EngineRecord| -> f64 {
        let base = (1.0 - engine.games_played as f64 / 100.0).max(0.1);
        let deltas: Vec<f64> = recent_games
            .iter()
            .filter(|g| g.engine1_id == engine.id || g.engine2_id == engine.id)
            .map(|g| {
                let (before, other_before) = if g.engine1_id == engine.id {
                    (g.engine1_rating_before, g.engine2_rating_before)
                } else {
                    (g.engine2_rating_before, g.engine1_rating_before)
                };
                (before - other_before).unsigned_abs() as f64
            })
            .take(10)
            .collect();
        if deltas.len() >= 2 {
            let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
            base + (mean / 100.0).min(0.5)
        } else {
            base
        }
    };

    let mut candidates = Vec::new();
    for i in 0..engines.len() {
        for j in (i + 1)..engines.len() {
            let (a, b) = (&engines[i], &engines[j]);
            let u = (uncertainty(a) + uncertainty(b)) / 2.0;
            let p = 1.0 / (1.0 + (a.rating - b.rating).unsigned_abs() as f64 / 200.0);
            let q = (((a.rating + b.rating) as f64 / 2.0) / 2000.0).min(1.0);
            let games_between = pair_counts.get(&crate::persistence::pair_key(a.id, b.id)).copied().unwrap_or(0);
            let f = (1.0 - games_between as f64 / 50.0).max(0.1);
            let w = 0.4 * u + 0.3 * p + 0.2 * q + 0.1 * f;
            candidates.push((i, j, w));
        }
    }

    candidates.retain(|(_, _, w)| *w > 0.0);
    if candidates.is_empty() {
        return None;
    }

    candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
    let shortlist_len = candidates.len().min(5);
    let shortlist = &candidates[..shortlist_len];

    let weights: Vec<f64> = shortlist.iter().map(|(_, _, w)| *w).collect();
    let index = match WeightedIndex::new(&weights) {
        Ok(dist) => dist.sample(&mut thread_rng()),
        Err(_) => 0,
    };

    let (i, j, _) = shortlist[index];
    Some((engines[i].clone(), engines[j].clone()))
}
