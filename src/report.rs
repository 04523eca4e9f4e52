//! Per-call reports: action statistics and performance accounting.
//!
//! Both engines emit the same report shapes, serialized into the experiment
//! archive under the `*_best_action_info` and `*_performance_info` keys.

use serde::{Deserialize, Serialize};

/// Statistics of one root action after a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReportEntry {
    /// Action index in the game's action space.
    pub index: usize,
    /// Human-readable action name (game-specific mapping).
    pub name: String,
    /// Visits of the root the action hangs off (summed over work trees).
    pub n_root: u64,
    /// Proven immediate win for the mover.
    pub win_flag: bool,
    /// Times the action was taken.
    pub n: u64,
    /// Wins backed up for the side taking the action.
    pub n_wins: u64,
    /// Action-value estimate `n_wins / n`; `None` while unvisited.
    pub q: Option<f64>,
    /// UCB1 score at the end of the search; `None` while unvisited.
    pub ucb: Option<f64>,
}

/// All root actions plus the chosen one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionsReport {
    pub entries: Vec<ActionReportEntry>,
    pub best: ActionReportEntry,
}

impl ActionsReport {
    /// Picks the best action with the three-level lexicographic comparator:
    /// a proven win beats everything, then the visit count, then the win
    /// count. Ties keep the earliest (lowest-index) entry. `None` when the
    /// root has no actions.
    pub fn from_entries(entries: Vec<ActionReportEntry>) -> Option<ActionsReport> {
        let mut best: Option<&ActionReportEntry> = None;
        for entry in &entries {
            let better = match best {
                None => true,
                Some(b) => {
                    (entry.win_flag && !b.win_flag)
                        || (entry.win_flag == b.win_flag && entry.n > b.n)
                        || (entry.win_flag == b.win_flag
                            && entry.n == b.n
                            && entry.n_wins > b.n_wins)
                }
            };
            if better {
                best = Some(entry);
            }
        }
        let best = best?.clone();
        Some(ActionsReport { entries, best })
    }
}

/// Complete result of one search call.
#[derive(Debug, Clone)]
pub struct SearchOutput {
    /// Index of the chosen action.
    pub best_action: usize,
    pub actions: ActionsReport,
    pub performance: PerformanceReport,
}

/// Wall times of a search, in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseTimes {
    pub total: f64,
    #[serde(rename = "loop")]
    pub loop_: f64,
    pub reduce_over_actions: f64,
    pub mean_loop: f64,
    pub mean_select: f64,
    pub mean_expand: f64,
    pub mean_playout: f64,
    pub mean_backup: f64,
}

/// Tree shape before and after the search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeShape {
    pub initial_n_root: u64,
    pub initial_mean_depth: f64,
    pub initial_max_depth: u32,
    pub initial_size: u64,
    pub n_root: u64,
    pub mean_depth: f64,
    pub max_depth: u32,
    pub size: u64,
}

/// Performance accounting of one search call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub steps: u64,
    pub steps_per_second: f64,
    /// Completed rollouts (equals the root visit total).
    pub playouts: u64,
    pub playouts_per_second: f64,
    #[serde(rename = "times_[ms]")]
    pub times_ms: PhaseTimes,
    pub tree: TreeShape,
    /// The arena filled up during this search; the result was reduced from
    /// the statistics gathered so far.
    #[serde(default)]
    pub arena_exhausted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: usize, win_flag: bool, n: u64, n_wins: u64) -> ActionReportEntry {
        ActionReportEntry {
            index,
            name: index.to_string(),
            n_root: 100,
            win_flag,
            n,
            n_wins,
            q: (n > 0).then(|| n_wins as f64 / n as f64),
            ucb: None,
        }
    }

    #[test]
    fn comparator_prefers_win_flag_then_visits_then_wins() {
        let report = ActionsReport::from_entries(vec![
            entry(0, false, 90, 80),
            entry(1, true, 3, 3),
            entry(2, false, 90, 85),
        ])
        .unwrap();
        assert_eq!(report.best.index, 1);

        let report = ActionsReport::from_entries(vec![
            entry(0, false, 50, 20),
            entry(1, false, 90, 30),
            entry(2, false, 90, 40),
        ])
        .unwrap();
        assert_eq!(report.best.index, 2);

        // Full tie keeps slot order.
        let report = ActionsReport::from_entries(vec![
            entry(0, false, 10, 5),
            entry(1, false, 10, 5),
        ])
        .unwrap();
        assert_eq!(report.best.index, 0);

        assert!(ActionsReport::from_entries(vec![]).is_none());
    }

    #[test]
    fn reports_serialize_with_original_key_names() {
        let perf = PerformanceReport::default();
        let json = serde_json::to_value(&perf).unwrap();
        assert!(json.get("times_[ms]").is_some());
        assert!(json["times_[ms]"].get("loop").is_some());
        assert!(json.get("steps").is_some());
    }
}
