// @generated-style schema module. Hand-maintained to mirror the
// `engines`/`games` tables since there is no running database to run
// `diesel print-schema` against in this workspace.

diesel::table! {
    engines (id) {
        id -> Int4,
        name -> Text,
        description -> Nullable<Text>,
        rating -> Int4,
        games_played -> Int4,
        wins -> Int4,
        losses -> Int4,
        draws -> Int4,
        created_at -> Timestamp,
    }
}

diesel::table! {
    games (id) {
        id -> Int4,
        engine1_id -> Int4,
        engine2_id -> Int4,
        winner_id -> Nullable<Int4>,
        is_draw -> Bool,
        engine1_rating_before -> Int4,
        engine2_rating_before -> Int4,
        moves -> Text,
        duration_ms -> Int4,
        error -> Nullable<Text>,
        final_status -> Text,
        starting_position -> Text,
        match_set_name -> Text,
        engine1_color -> Text,
        engine2_color -> Text,
        played_at -> Timestamp,
    }
}

diesel::joinable!(games -> engines (engine1_id));
diesel::allow_tables_to_appear_in_same_query!(engines, games);
