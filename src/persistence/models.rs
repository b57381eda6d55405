//! Diesel row types for the `engines` and `games` tables.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use super::schema::{engines, games};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = engines)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EngineRow {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub rating: i32,
    pub games_played: i32,
    pub wins: i32,
    pub losses: i32,
    pub draws: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = engines)]
pub struct NewEngineRow<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub rating: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = games)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GameRowRecord {
    pub id: i32,
    pub engine1_id: i32,
    pub engine2_id: i32,
    pub winner_id: Option<i32>,
    pub is_draw: bool,
    pub engine1_rating_before: i32,
    pub engine2_rating_before: i32,
    pub moves: String,
    pub duration_ms: i32,
    pub error: Option<String>,
    pub final_status: String,
    pub starting_position: String,
    pub match_set_name: String,
    pub engine1_color: String,
    pub engine2_color: String,
    pub played_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = games)]
pub struct NewGameRow<'a> {
    pub engine1_id: i32,
    pub engine2_id: i32,
    pub winner_id: Option<i32>,
    pub is_draw: bool,
    pub engine1_rating_before: i32,
    pub engine2_rating_before: i32,
    pub moves: &'a str,
    pub duration_ms: i32,
    pub error: Option<&'a str>,
    pub final_status: &'a str,
    pub starting_position: &'a str,
    pub match_set_name: &'a str,
    pub engine1_color: &'a str,
    pub engine2_color: &'a str,
}
