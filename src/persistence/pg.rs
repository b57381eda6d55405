//! Postgres-backed [`PersistenceAdapter`], via `diesel` + `r2d2`.
//!
//! Diesel's `PgConnection` is synchronous; every call here hands the
//! blocking work to `tokio::task::spawn_blocking` rather than holding it
//! on the async executor.

use std::collections::HashMap;

use async_trait::async_trait;
use diesel::connection::Connection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};

use crate::error::Result;

use super::models::{EngineRow, NewEngineRow, NewGameRow};
use super::schema::{engines, games};
use super::{pair_key, EngineRecord, GameRow, PairKey, PersistenceAdapter, RatingDelta, Tx, Winner};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct PgPersistence {
    pool: PgPool,
}

impl PgPersistence {
    pub fn connect(database_url: &str) -> Result<Self> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder().build(manager)?;
        Ok(Self { pool })
    }

    /// Runs the DDL for `engines`/`games` if they don't already exist.
    /// Exposed for the `init-db` CLI command.
    pub async fn init_schema(&self) -> Result<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool.get()?;
            conn.batch_execute(include_str!(
                "../../migrations/2026-01-01-000000_create_core_tables/up.sql"
            ))?;
            Ok(())
        })
        .await??;
        Ok(())
    }
}

fn engine_record(row: EngineRow) -> EngineRecord {
    EngineRecord {
        id: row.id,
        name: row.name,
        rating: row.rating,
        games_played: row.games_played,
    }
}

#[async_trait]
impl PersistenceAdapter for PgPersistence {
    async fn add_engine(&self, name: &str, rating: i32, description: Option<&str>) -> Result<i32> {
        let pool = self.pool.clone();
        let name = name.to_string();
        let description = description.map(|d| d.to_string());
        tokio::task::spawn_blocking(move || -> Result<i32> {
            let mut conn = pool.get()?;
            let new_row = NewEngineRow {
                name: &name,
                description: description.as_deref(),
                rating,
            };
            match diesel::insert_into(engines::table)
                .values(&new_row)
                .returning(engines::id)
                .get_result::<i32>(&mut conn)
            {
                Ok(id) => Ok(id),
                Err(diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                )) => {
                    let id = engines::table
                        .filter(engines::name.eq(&name))
                        .select(engines::id)
                        .first::<i32>(&mut conn)?;
                    Ok(id)
                }
                Err(err) => Err(err.into()),
            }
        })
        .await?
    }

    async fn get_engines_for_scheduling(&self) -> Result<Vec<EngineRecord>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<EngineRecord>> {
            let mut conn = pool.get()?;
            let rows = engines::table.load::<EngineRow>(&mut conn)?;
            Ok(rows.into_iter().map(engine_record).collect())
        })
        .await?
    }

    async fn get_recent_games(&self, hours: i64) -> Result<Vec<GameRow>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<GameRow>> {
            let mut conn = pool.get()?;
            let cutoff = chrono::Utc::now().naive_utc() - chrono::Duration::hours(hours);
            let rows = games::table
                .filter(games::played_at.ge(cutoff))
                .load::<super::models::GameRowRecord>(&mut conn)?;
            Ok(rows.into_iter().map(game_row_from_record).collect())
        })
        .await?
    }

    async fn get_pair_game_counts(&self) -> Result<HashMap<PairKey, u32>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<HashMap<PairKey, u32>> {
            let mut conn = pool.get()?;
            let rows = games::table
                .select((games::engine1_id, games::engine2_id))
                .load::<(i32, i32)>(&mut conn)?;
            let mut counts = HashMap::new();
            for (e1, e2) in rows {
                *counts.entry(pair_key(e1, e2)).or_insert(0) += 1;
            }
            Ok(counts)
        })
        .await?
    }

    async fn begin_tx(&self) -> Result<Box<dyn Tx>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Box<dyn Tx>> {
            let mut conn = pool.get()?;
            conn.batch_execute("BEGIN")?;
            Ok(Box::new(PgTx { conn: Some(conn) }))
        })
        .await?
    }
}

fn game_row_from_record(row: super::models::GameRowRecord) -> GameRow {
    let winner = match row.winner_id {
        Some(id) if id == row.engine1_id => Some(Winner::Engine1),
        Some(id) if id == row.engine2_id => Some(Winner::Engine2),
        _ => None,
    };
    GameRow {
        engine1_id: row.engine1_id,
        engine2_id: row.engine2_id,
        winner,
        is_draw: row.is_draw,
        engine1_rating_before: row.engine1_rating_before,
        engine2_rating_before: row.engine2_rating_before,
        moves_json: row.moves,
        duration_ms: row.duration_ms,
        error: row.error,
        final_status_json: row.final_status,
        starting_position: row.starting_position,
        match_set_name: row.match_set_name,
        engine1_color: color_from_str(&row.engine1_color),
        engine2_color: color_from_str(&row.engine2_color),
        played_at: row.played_at,
    }
}

fn color_from_str(s: &str) -> crate::game::Color {
    if s.eq_ignore_ascii_case("white") {
        crate::game::Color::White
    } else {
        crate::game::Color::Black
    }
}

fn color_str(c: crate::game::Color) -> &'static str {
    match c {
        crate::game::Color::White => "white",
        crate::game::Color::Black => "black",
    }
}

/// Diesel connections don't implement `Send`-friendly async transactions,
/// so a `PgTx` holds a checked-out pooled connection for its lifetime and
/// opens a real SQL transaction around it; `commit`/`rollback` close it
/// out. All calls run on `spawn_blocking`.
type PgPooled = PooledConnection<ConnectionManager<PgConnection>>;

struct PgTx {
    conn: Option<PgPooled>,
}

impl PgTx {
    /// Moves the checked-out connection onto a blocking thread for the
    /// duration of `f`, then takes it back. Each `Tx` call therefore pays
    /// one hop, but the pooled connection never sits on the async
    /// executor while diesel does synchronous I/O.
    async fn with_conn<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| color_eyre::eyre::eyre!("transaction already closed"))?;
        let (result, conn) = tokio::task::spawn_blocking(move || {
            let result = f(&mut conn);
            (result, conn)
        })
        .await?;
        self.conn = Some(conn);
        result
    }
}

#[async_trait]
impl Tx for PgTx {
    async fn read_rating(&mut self, engine_id: i32) -> Result<i32> {
        self.with_conn(move |conn| {
            let rating = engines::table
                .find(engine_id)
                .select(engines::rating)
                .first::<i32>(conn)?;
            Ok(rating)
        })
        .await
    }

    async fn insert_game(&mut self, row: GameRow) -> Result<()> {
        self.with_conn(move |conn| {
            let new_row = NewGameRow {
                engine1_id: row.engine1_id,
                engine2_id: row.engine2_id,
                winner_id: row.winner_engine_id(),
                is_draw: row.is_draw,
                engine1_rating_before: row.engine1_rating_before,
                engine2_rating_before: row.engine2_rating_before,
                moves: &row.moves_json,
                duration_ms: row.duration_ms,
                error: row.error.as_deref(),
                final_status: &row.final_status_json,
                starting_position: &row.starting_position,
                match_set_name: &row.match_set_name,
                engine1_color: color_str(row.engine1_color),
                engine2_color: color_str(row.engine2_color),
            };
            diesel::insert_into(games::table).values(&new_row).execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn update_engine(&mut self, engine_id: i32, new_rating: i32, delta: RatingDelta) -> Result<()> {
        self.with_conn(move |conn| {
            diesel::update(engines::table.find(engine_id))
                .set((
                    engines::rating.eq(new_rating),
                    engines::games_played.eq(engines::games_played + delta.games_played),
                    engines::wins.eq(engines::wins + delta.wins),
                    engines::losses.eq(engines::losses + delta.losses),
                    engines::draws.eq(engines::draws + delta.draws),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.with_conn(|conn| {
            conn.batch_execute("COMMIT")?;
            Ok(())
        })
        .await
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.with_conn(|conn| {
            conn.batch_execute("ROLLBACK")?;
            Ok(())
        })
        .await
    }
}
