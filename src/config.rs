//! Search configuration for both engines.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Parallel search regime.
///
/// Two orthogonal axes: how playouts are organized, and how expansion
/// spends memory.
///
/// - The **OCP** family (one coalesced playout fan-out per work group) runs
///   `n_trees` groups, each owning a disjoint tree; every step a group runs
///   one selection/expansion trajectory and then `n_playouts` rollouts from
///   the chosen leaf, backing up the aggregate once. Best when rollouts are
///   cheap and the branching factor is large.
/// - The **ACP** family (all-contended playouts) runs
///   `n_trees * n_playouts` independent workers over one shared tree, each
///   carrying a full select/expand/rollout/backup pipeline; per-node locks
///   arbitrate expansion. Best when selection is cheap and each rollout is
///   expensive.
/// - **Thrifty** expansion creates a single child per visit and defers its
///   board snapshot; preferred when memory is scarce or the tree is wide
///   and shallow.
/// - **Prodigal** expansion materializes every legal child with its board
///   up front; preferred when memory is abundant and selection revisits
///   many siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    OcpThrifty,
    OcpProdigal,
    AcpThrifty,
    AcpProdigal,
}

impl Variant {
    /// True for the coalesced-playout (disjoint work trees) family.
    pub fn is_coalesced(self) -> bool {
        matches!(self, Variant::OcpThrifty | Variant::OcpProdigal)
    }

    /// True for eager all-children expansion.
    pub fn is_prodigal(self) -> bool {
        matches!(self, Variant::OcpProdigal | Variant::AcpProdigal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Variant::OcpThrifty => "ocp_thrifty",
            Variant::OcpProdigal => "ocp_prodigal",
            Variant::AcpThrifty => "acp_thrifty",
            Variant::AcpProdigal => "acp_prodigal",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ocp_thrifty" => Ok(Variant::OcpThrifty),
            "ocp_prodigal" => Ok(Variant::OcpProdigal),
            "acp_thrifty" => Ok(Variant::AcpThrifty),
            "acp_prodigal" => Ok(Variant::AcpProdigal),
            other => Err(format!(
                "unknown variant '{other}' (expected one of ocp_thrifty, \
                 ocp_prodigal, acp_thrifty, acp_prodigal)"
            )),
        }
    }
}

/// Configuration of the parallel engine.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Wall-clock budget per search; `None` means unlimited.
    pub search_time_limit: Option<Duration>,
    /// Hard step-count cap per search; `None` means unlimited.
    pub search_steps_limit: Option<u64>,
    /// Number of coalesced work groups (T).
    pub n_trees: usize,
    /// Rollouts per group per step (m).
    pub n_playouts: usize,
    /// Parallel regime.
    pub variant: Variant,
    /// Discard the previous search tree between moves instead of promoting
    /// the played-through subtree.
    pub vanilla: bool,
    /// UCB1 exploration constant.
    pub ucb_c: f64,
    /// Arena budget in GiB.
    pub device_memory_gib: f64,
    /// Root seed for the deterministic per-worker PRNG streams.
    pub seed: u64,
    /// Thread-pool size; 0 lets rayon pick.
    pub num_threads: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            search_time_limit: Some(Duration::from_secs(5)),
            search_steps_limit: None,
            n_trees: 4,
            n_playouts: 64,
            variant: Variant::AcpProdigal,
            vanilla: true,
            ucb_c: 2.0,
            device_memory_gib: 2.0,
            seed: 0,
            num_threads: 0,
        }
    }
}

impl SearchConfig {
    /// Arena budget in bytes.
    pub fn device_memory_bytes(&self) -> u64 {
        (self.device_memory_gib * (1u64 << 30) as f64) as u64
    }

    /// Compact tag used in logs and the experiment archive, e.g.
    /// `"parallel_5_inf_4_64_acp_prodigal"`.
    pub fn shortname(&self) -> String {
        format!(
            "parallel_{}_{}_{}_{}_{}",
            match self.search_time_limit {
                Some(t) => format!("{}", t.as_secs_f64()),
                None => "inf".to_string(),
            },
            match self.search_steps_limit {
                Some(s) => s.to_string(),
                None => "inf".to_string(),
            },
            self.n_trees,
            self.n_playouts,
            self.variant
        )
    }
}

/// Configuration of the sequential reference engine.
#[derive(Debug, Clone)]
pub struct SequentialConfig {
    pub search_time_limit: Option<Duration>,
    pub search_steps_limit: Option<u64>,
    pub vanilla: bool,
    pub ucb_c: f64,
    pub seed: u64,
}

impl Default for SequentialConfig {
    fn default() -> Self {
        SequentialConfig {
            search_time_limit: Some(Duration::from_secs(5)),
            search_steps_limit: None,
            vanilla: true,
            ucb_c: 2.0,
            seed: 0,
        }
    }
}

impl SequentialConfig {
    /// Compact tag used in logs and the experiment archive.
    pub fn shortname(&self) -> String {
        format!(
            "sequential_{}_{}",
            match self.search_time_limit {
                Some(t) => format!("{}", t.as_secs_f64()),
                None => "inf".to_string(),
            },
            match self.search_steps_limit {
                Some(s) => s.to_string(),
                None => "inf".to_string(),
            },
        )
    }
}

/// Resolved computational budget of one search call.
///
/// A forced step limit (replay of a recorded experiment) overrides both
/// ordinary limits and disables the time check entirely.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Budget {
    deadline: Option<Instant>,
    steps: Option<u64>,
}

impl Budget {
    pub fn new(
        time_limit: Option<Duration>,
        steps_limit: Option<u64>,
        forced_steps: Option<u64>,
        start: Instant,
    ) -> Budget {
        if let Some(forced) = forced_steps {
            return Budget { deadline: None, steps: Some(forced) };
        }
        Budget {
            deadline: time_limit.map(|t| start + t),
            steps: steps_limit,
        }
    }

    /// Polled between steps; an in-flight step always runs to completion.
    pub fn exhausted(&self, steps_done: u64) -> bool {
        if let Some(limit) = self.steps {
            if steps_done >= limit {
                return true;
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return true;
            }
        }
        false
    }
}
