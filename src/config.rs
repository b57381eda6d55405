//! JSON configuration loader: reads the tournament/engine document from
//! disk into a `serde`-derived struct tree.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::game::{MatchSet, TimeControl};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub tournament: TournamentConfig,
    #[serde(default)]
    pub engines: Vec<EngineConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TournamentConfig {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "timeControl")]
    pub time_control: String,
    pub rounds: Option<u32>,
    #[serde(rename = "gamesPerPair")]
    pub games_per_pair: Option<u32>,
    pub concurrency: Option<usize>,
    #[serde(rename = "defaultMatchSet")]
    pub default_match_set: Option<String>,
    #[serde(rename = "matchSets", default)]
    pub match_sets: Vec<MatchSet>,
}

impl TournamentConfig {
    pub fn parsed_time_control(&self) -> Option<TimeControl> {
        TimeControl::parse(&self.time_control)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub name: String,
    pub executable: String,
    #[serde(rename = "workingDirectory")]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(rename = "initialRating", default = "default_initial_rating")]
    pub initial_rating: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub description: Option<String>,
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_initial_rating() -> i32 {
    1500
}

fn default_enabled() -> bool {
    true
}

impl EngineConfig {
    pub fn enabled_engines(engines: &[EngineConfig]) -> impl Iterator<Item = &EngineConfig> {
        engines.iter().filter(|e| e.enabled)
    }

    /// Flattens the option map to the string form the UGI wire protocol
    /// uses for `setoption name <K> value <V>`.
    pub fn string_options(&self) -> HashMap<String, String> {
        self.options
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect()
    }
}

/// Loads configuration from `path`. A missing file is not fatal: the
/// loader logs once and proceeds with no engines. Invalid JSON is
/// fatal — the caller propagates the error. Unknown keys are ignored by
/// serde's default (non-deny_unknown_fields) behavior.
pub fn load(path: &Path) -> Result<Config> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = ?path, "configuration file not found, starting with no engines");
            return Ok(Config {
                tournament: TournamentConfig {
                    name: "unnamed".to_string(),
                    description: None,
                    time_control: "5+0".to_string(),
                    rounds: None,
                    games_per_pair: None,
                    concurrency: None,
                    default_match_set: None,
                    match_sets: Vec::new(),
                },
                engines: Vec::new(),
            });
        }
        Err(err) => return Err(err.into()),
    };

    let config: Config = serde_json::from_str(&contents)?;
    info!(
        path = ?path,
        engines = config.engines.len(),
        match_sets = config.tournament.match_sets.len(),
        "configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document() {
        let json = r#"{
            "tournament": { "name": "nightly", "timeControl": "5+0.1" },
            "engines": [
                { "name": "alpha", "executable": "/bin/alpha", "workingDirectory": null }
            ]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.tournament.name, "nightly");
        assert_eq!(config.engines.len(), 1);
        assert!(config.engines[0].enabled);
        assert_eq!(config.engines[0].initial_rating, 1500);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let json = r#"{
            "tournament": { "name": "x", "timeControl": "5+0", "unknownField": 42 },
            "engines": []
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.tournament.name, "x");
    }

    #[test]
    fn string_options_stringifies_non_string_values() {
        let mut options = HashMap::new();
        options.insert("Hash".to_string(), serde_json::json!(128));
        options.insert("Ponder".to_string(), serde_json::json!(true));
        let engine = EngineConfig {
            name: "x".to_string(),
            executable: "x".to_string(),
            working_directory: None,
            arguments: Vec::new(),
            initial_rating: 1500,
            enabled: true,
            description: None,
            options,
            env: HashMap::new(),
        };
        let flat = engine.string_options();
        assert_eq!(flat.get("Hash").unwrap(), "128");
        assert_eq!(flat.get("Ponder").unwrap(), "true");
    }
}
