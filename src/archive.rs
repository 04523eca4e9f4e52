//! Experiment archive: a JSON document recording a full match, consumed by
//! external plotting and replayable move for move.
//!
//! Layout (keys are stable): `{matchup_info, cpu_and_system_props,
//! gpu_props, games_infos[game].moves_rounds[round]
//! .{black,white}_{best_action_info, performance_info}, stats}`. Game and
//! round keys are 1-based decimal strings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::report::{ActionReportEntry, PerformanceReport};
use crate::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchupInfo {
    pub game: String,
    pub ai_a: String,
    pub ai_b: String,
    pub n_games: usize,
}

/// Host properties recorded for reproducibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemProps {
    pub cpu_logical_cores: usize,
    pub os: String,
    pub arch: String,
}

impl SystemProps {
    pub fn detect() -> SystemProps {
        SystemProps {
            cpu_logical_cores: num_cpus::get(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// Compute-device properties. The search runs on CPU work groups; the pool
/// geometry is recorded under the archive's device key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProps {
    pub name: String,
    pub worker_threads: usize,
}

impl DeviceProps {
    pub fn detect(num_threads: usize) -> DeviceProps {
        DeviceProps {
            name: "cpu thread pool".to_string(),
            worker_threads: if num_threads > 0 {
                num_threads
            } else {
                num_cpus::get()
            },
        }
    }
}

/// Reports of one round of moves (black's move, then white's, either may be
/// missing when a human played or the game ended first).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovesRound {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub black_best_action_info: Option<ActionReportEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub black_performance_info: Option<PerformanceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub white_best_action_info: Option<ActionReportEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub white_performance_info: Option<PerformanceReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameInfo {
    pub black: String,
    pub white: String,
    pub initial_state: String,
    pub moves_rounds: BTreeMap<String, MovesRound>,
    pub outcome: Option<i8>,
    pub outcome_message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchStats {
    pub score_a_total: f64,
    pub score_a_mean: f64,
    pub score_b_total: f64,
    pub score_b_mean: f64,
    pub white_wins_count: u32,
    pub white_wins_freq: f64,
    pub black_wins_count: u32,
    pub black_wins_freq: f64,
}

/// The whole archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentInfo {
    pub matchup_info: MatchupInfo,
    pub cpu_and_system_props: SystemProps,
    pub gpu_props: DeviceProps,
    pub games_infos: BTreeMap<String, GameInfo>,
    pub stats: MatchStats,
}

impl ExperimentInfo {
    pub fn new(matchup: MatchupInfo, num_threads: usize) -> ExperimentInfo {
        ExperimentInfo {
            matchup_info: matchup,
            cpu_and_system_props: SystemProps::detect(),
            gpu_props: DeviceProps::detect(num_threads),
            games_infos: BTreeMap::new(),
            stats: MatchStats::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<ExperimentInfo, EngineError> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Step count recorded for one side of one round, used to force the
    /// same computational budget when reproducing an experiment.
    pub fn recorded_steps(&self, game: usize, round: usize, black: bool) -> Option<u64> {
        let game_info = self.games_infos.get(&game.to_string())?;
        let round_info = game_info.moves_rounds.get(&round.to_string())?;
        let perf = if black {
            round_info.black_performance_info.as_ref()
        } else {
            round_info.white_performance_info.as_ref()
        };
        Some(perf?.steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExperimentInfo {
        let mut info = ExperimentInfo::new(
            MatchupInfo {
                game: "Connect4_6x7".into(),
                ai_a: "parallel_1_inf_4_64_acp_prodigal".into(),
                ai_b: "sequential_1_inf".into(),
                n_games: 1,
            },
            4,
        );
        let mut rounds = BTreeMap::new();
        rounds.insert(
            "1".to_string(),
            MovesRound {
                black_performance_info: Some(PerformanceReport {
                    steps: 123,
                    ..PerformanceReport::default()
                }),
                ..MovesRound::default()
            },
        );
        info.games_infos.insert(
            "1".to_string(),
            GameInfo {
                black: info.matchup_info.ai_a.clone(),
                white: info.matchup_info.ai_b.clone(),
                initial_state: String::new(),
                moves_rounds: rounds,
                outcome: Some(1),
                outcome_message: Some("BLACK WINS".into()),
            },
        );
        info
    }

    #[test]
    fn json_round_trip_keeps_recorded_steps() {
        let info = sample();
        let json = serde_json::to_string(&info).expect("serializes");
        let back: ExperimentInfo = serde_json::from_str(&json).expect("parses");
        assert_eq!(back.recorded_steps(1, 1, true), Some(123));
        assert_eq!(back.recorded_steps(1, 1, false), None);
        assert_eq!(back.recorded_steps(2, 1, true), None);
    }

    #[test]
    fn archive_uses_stable_key_names() {
        let value = serde_json::to_value(sample()).expect("serializes");
        for key in [
            "matchup_info",
            "cpu_and_system_props",
            "gpu_props",
            "games_infos",
            "stats",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        let round = &value["games_infos"]["1"]["moves_rounds"]["1"];
        assert!(round.get("black_performance_info").is_some());
        assert!(round["black_performance_info"].get("times_[ms]").is_some());
    }
}
