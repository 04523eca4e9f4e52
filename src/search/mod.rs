//! # Parallel Search Driver and Phase Kernels
//!
//! The driver owns the arena, a rayon pool, and per-worker scratch
//! contexts, and sequences the four-phase step (select → expand → playout
//! → backup) in one of two shapes:
//!
//! - **Coalesced (OCP)**: `n_trees` work groups own disjoint trees inside
//!   the shared arena. Each step, every group runs one trajectory and then
//!   fans out into `n_playouts` rollouts from its seed; the phases are
//!   globally ordered by the fork-join barriers between the parallel
//!   regions. No locks are needed — a group is the only writer of its tree.
//! - **Contended (ACP)**: `n_trees * n_playouts` workers each run the full
//!   pipeline once per step against one shared tree: relaxed-atomic
//!   selection, expansion under the node's seat with a double-check, a
//!   lock-free rollout, and fetch-add backup.
//!
//! The budget is polled between steps (an in-flight step always completes;
//! a forced step limit disables the time check). After the loop, a single
//! reduction aggregates per-action statistics over all roots' children and
//! applies the proven-win / visits / wins comparator.
//!
//! Arena exhaustion truncates the step that hit it: the frontier itself
//! seeds the rollouts, the step's results are backed up, a warning lands in
//! the log and the report, and no further steps run.

pub(crate) mod backup;
pub(crate) mod expand;
pub(crate) mod playout;
pub(crate) mod select;

use parking_lot::Mutex;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoroshiro128PlusPlus;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::arena::{SubtreeStats, TreeArena, NO_NODE};
use crate::config::{Budget, SearchConfig};
use crate::report::{
    ActionReportEntry, ActionsReport, PerformanceReport, PhaseTimes, SearchOutput, TreeShape,
};
use crate::{EngineError, GameMechanics, NO_ACTION};

use expand::{expand_leaf, Expanded};

/// Scratch state of one trajectory worker (a coalesced group, or one
/// contended-pipeline worker).
pub(crate) struct GroupCtx {
    pub rng: Xoroshiro128PlusPlus,
    /// Nodes traversed this step, root first, seed last.
    pub path: Vec<u32>,
    /// Frontier reached by selection.
    pub leaf: u32,
    /// Playout seed chosen by expansion.
    pub seed: u32,
    /// Leaf position scratch.
    pub board: Vec<i8>,
    pub extra: Vec<i8>,
    /// Child-construction / rollout scratch.
    pub child_board: Vec<i8>,
    pub child_extra: Vec<i8>,
    pub legal: Vec<u16>,
    pub candidates: Vec<u16>,
}

impl GroupCtx {
    pub(crate) fn new<G: GameMechanics>(stream_seed: u64) -> GroupCtx {
        GroupCtx {
            rng: Xoroshiro128PlusPlus::seed_from_u64(stream_seed),
            path: Vec::with_capacity(64),
            leaf: NO_NODE,
            seed: NO_NODE,
            board: vec![0; G::board_cells()],
            extra: vec![0; G::EXTRA_INFO],
            child_board: vec![0; G::board_cells()],
            child_extra: vec![0; G::EXTRA_INFO],
            legal: Vec::with_capacity(G::MAX_ACTIONS),
            candidates: Vec::with_capacity(G::MAX_ACTIONS),
        }
    }
}

/// Scratch state of one coalesced rollout stream.
struct RolloutCtx {
    rng: Xoroshiro128PlusPlus,
    board: Vec<i8>,
    extra: Vec<i8>,
    legal: Vec<u16>,
}

impl RolloutCtx {
    fn new<G: GameMechanics>(stream_seed: u64) -> RolloutCtx {
        RolloutCtx {
            rng: Xoroshiro128PlusPlus::seed_from_u64(stream_seed),
            board: vec![0; G::board_cells()],
            extra: vec![0; G::EXTRA_INFO],
            legal: Vec::with_capacity(G::MAX_ACTIONS),
        }
    }
}

/// Wall time spent per phase during one step (controller clock for the
/// coalesced shape, summed worker clocks for the contended one).
#[derive(Debug, Default, Clone, Copy)]
struct StepTimes {
    select: Duration,
    expand: Duration,
    playout: Duration,
    backup: Duration,
}

#[derive(Default)]
struct PhaseNanos {
    select: AtomicU64,
    expand: AtomicU64,
    playout: AtomicU64,
    backup: AtomicU64,
}

impl PhaseNanos {
    fn into_times(self) -> StepTimes {
        StepTimes {
            select: Duration::from_nanos(self.select.into_inner()),
            expand: Duration::from_nanos(self.expand.into_inner()),
            playout: Duration::from_nanos(self.playout.into_inner()),
            backup: Duration::from_nanos(self.backup.into_inner()),
        }
    }
}

fn stream_seed(seed: u64, stream: u64) -> u64 {
    seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// The parallel MCTS engine.
pub struct ParallelMcts<G: GameMechanics> {
    cfg: SearchConfig,
    arena: TreeArena,
    pool: ThreadPool,
    /// One root per coalesced group; a single shared root for the
    /// contended family.
    roots: Vec<u32>,
    groups: Vec<Mutex<GroupCtx>>,
    rollouts: Vec<Mutex<RolloutCtx>>,
    _game: PhantomData<G>,
}

impl<G: GameMechanics> ParallelMcts<G> {
    /// Builds an engine, preallocating the arena from the configured memory
    /// budget and seeding one deterministic PRNG stream per worker.
    pub fn new(cfg: SearchConfig) -> ParallelMcts<G> {
        let cfg = SearchConfig {
            n_trees: cfg.n_trees.max(1),
            n_playouts: cfg.n_playouts.max(1),
            ..cfg
        };
        let pool_builder = ThreadPoolBuilder::new();
        let pool = if cfg.num_threads > 0 {
            pool_builder.num_threads(cfg.num_threads).build().unwrap()
        } else {
            pool_builder.build().unwrap()
        };
        let arena = TreeArena::for_game::<G>(cfg.device_memory_bytes());
        let group_count = if cfg.variant.is_coalesced() {
            cfg.n_trees
        } else {
            cfg.n_trees * cfg.n_playouts
        };
        let rollout_count = if cfg.variant.is_coalesced() {
            cfg.n_trees * cfg.n_playouts
        } else {
            0
        };
        let groups = (0..group_count)
            .map(|i| Mutex::new(GroupCtx::new::<G>(stream_seed(cfg.seed, i as u64))))
            .collect();
        let rollouts = (0..rollout_count)
            .map(|i| {
                Mutex::new(RolloutCtx::new::<G>(stream_seed(
                    cfg.seed,
                    (group_count + i) as u64,
                )))
            })
            .collect();
        ParallelMcts {
            cfg,
            arena,
            pool,
            roots: Vec::new(),
            groups,
            rollouts,
            _game: PhantomData,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.cfg
    }

    /// Audits the tree invariants of every root. Test aid; debug builds run
    /// it automatically at the end of each search.
    pub fn validate_tree(&self) {
        for &root in &self.roots {
            self.arena.validate_subtree(root);
        }
    }

    /// Runs one search from the given position and returns the chosen
    /// action with its reports.
    ///
    /// `forced_steps` replays a recorded step count, overriding both the
    /// time and step budgets.
    pub fn run(
        &mut self,
        board: &[i8],
        extra: &[i8],
        turn: i8,
        forced_steps: Option<u64>,
    ) -> Result<SearchOutput, EngineError> {
        if board.len() != G::board_cells() || extra.len() != G::EXTRA_INFO {
            return Err(EngineError::ContractViolation(format!(
                "position buffers {}+{} do not match {}",
                board.len(),
                extra.len(),
                G::NAME
            )));
        }
        let t_total = Instant::now();
        log::info!(
            "search starting [{} | {} | seed {}]",
            G::NAME,
            self.cfg.shortname(),
            self.cfg.seed
        );
        let budget = Budget::new(
            self.cfg.search_time_limit,
            self.cfg.search_steps_limit,
            forced_steps,
            t_total,
        );
        let mut arena_exhausted = self.prepare_roots(board, extra, turn)?;
        let (initial_n_root, initial_shape) = self.tree_shape();

        let mut steps = 0u64;
        let mut phase = StepTimes::default();
        let t_loop = Instant::now();
        while !arena_exhausted && !budget.exhausted(steps) {
            let (times, step_exhausted) = if self.cfg.variant.is_coalesced() {
                self.step_coalesced()
            } else {
                self.step_contended()
            };
            steps += 1;
            phase.select += times.select;
            phase.expand += times.expand;
            phase.playout += times.playout;
            phase.backup += times.backup;
            if step_exhausted {
                arena_exhausted = true;
                log::warn!(
                    "arena exhausted ({} nodes); truncating search after step {}",
                    self.arena.allocated(),
                    steps
                );
            }
        }
        let loop_time = t_loop.elapsed();

        let t_reduce = Instant::now();
        let actions = self.reduce_over_actions()?;
        let reduce_time = t_reduce.elapsed();

        let (n_root, shape) = self.tree_shape();
        #[cfg(debug_assertions)]
        self.validate_tree();

        let total = t_total.elapsed();
        let ms = |d: Duration| d.as_secs_f64() * 1e3;
        let steps_f = steps.max(1) as f64;
        let performance = PerformanceReport {
            steps,
            steps_per_second: steps as f64 / total.as_secs_f64(),
            playouts: n_root,
            playouts_per_second: n_root as f64 / total.as_secs_f64(),
            times_ms: PhaseTimes {
                total: ms(total),
                loop_: ms(loop_time),
                reduce_over_actions: ms(reduce_time),
                mean_loop: ms(loop_time) / steps_f,
                mean_select: ms(phase.select) / steps_f,
                mean_expand: ms(phase.expand) / steps_f,
                mean_playout: ms(phase.playout) / steps_f,
                mean_backup: ms(phase.backup) / steps_f,
            },
            tree: TreeShape {
                initial_n_root,
                initial_mean_depth: initial_shape.mean_depth(),
                initial_max_depth: initial_shape.max_depth,
                initial_size: initial_shape.size,
                n_root,
                mean_depth: shape.mean_depth(),
                max_depth: shape.max_depth,
                size: shape.size,
            },
            arena_exhausted,
        };
        log::info!(
            "search done [best: {} ({}), steps: {}, playouts/s: {:.0}]",
            actions.best.index,
            actions.best.name,
            steps,
            performance.playouts_per_second
        );
        Ok(SearchOutput {
            best_action: actions.best.index,
            actions,
            performance,
        })
    }

    /// Seeds the search roots: promotes the played-through subtree when
    /// reuse is on and the position is found below the previous roots,
    /// otherwise resets the arena and plants fresh, fully expanded roots.
    /// Returns whether seeding itself exhausted the arena.
    fn prepare_roots(&mut self, board: &[i8], extra: &[i8], turn: i8) -> Result<bool, EngineError> {
        let want = if self.cfg.variant.is_coalesced() {
            self.cfg.n_trees
        } else {
            1
        };
        if !self.cfg.vanilla && self.roots.len() == want {
            let promoted: Vec<Option<u32>> = self
                .roots
                .iter()
                .map(|&r| self.arena.find_matching_descendant(r, board, extra, turn, 2))
                .collect();
            if promoted.iter().all(Option::is_some) {
                self.roots = promoted.into_iter().flatten().collect();
                let mut exhausted = false;
                for g in 0..self.roots.len() {
                    self.arena.detach_root(self.roots[g]);
                    exhausted |= self.seed_expand_root(self.roots[g], g);
                }
                log::debug!("promoted {} subtree root(s) from the previous search", want);
                return Ok(exhausted);
            }
        }
        self.arena.reset();
        self.roots.clear();
        let mut exhausted = false;
        for g in 0..want {
            let Some(root) = self.arena.alloc(NO_NODE, NO_ACTION, turn) else {
                return Err(EngineError::ContractViolation(
                    "arena cannot hold a root node".into(),
                ));
            };
            self.arena.write_board(root, board, extra);
            self.arena
                .set_outcome(root, G::terminal(board, extra, turn, NO_ACTION));
            self.roots.push(root);
            exhausted |= self.seed_expand_root(root, g);
        }
        Ok(exhausted)
    }

    /// Fully expands a childless root so the final reduction always has
    /// actions to compare, whatever the step budget.
    fn seed_expand_root(&self, root: u32, g: usize) -> bool {
        if self.arena.outcome(root).is_decided() || self.arena.children_count(root) > 0 {
            return false;
        }
        let mut ctx = self.groups[g % self.groups.len()].lock();
        ctx.path.clear();
        ctx.path.push(root);
        ctx.leaf = root;
        expand_leaf::<G>(&self.arena, &mut ctx, true).exhausted
    }

    /// One coalesced step: barrier-ordered phase kernels over the disjoint
    /// work trees.
    fn step_coalesced(&self) -> (StepTimes, bool) {
        let arena = &self.arena;
        let groups = &self.groups;
        let rollouts = &self.rollouts;
        let roots = &self.roots;
        let ucb_c = self.cfg.ucb_c;
        let m = self.cfg.n_playouts;
        let t_count = roots.len();
        let prodigal = self.cfg.variant.is_prodigal();
        let exhausted = AtomicBool::new(false);
        let mut times = StepTimes::default();

        let t = Instant::now();
        self.pool.install(|| {
            (0..t_count).into_par_iter().for_each(|g| {
                let mut ctx = groups[g].lock();
                let leaf = select::descend(arena, roots[g], ucb_c, &mut ctx.path);
                ctx.leaf = leaf;
            });
        });
        times.select = t.elapsed();

        let t = Instant::now();
        self.pool.install(|| {
            (0..t_count).into_par_iter().for_each(|g| {
                let mut ctx = groups[g].lock();
                let res = expand_leaf::<G>(arena, &mut ctx, prodigal);
                ctx.seed = res.seed;
                if res.exhausted {
                    exhausted.store(true, Ordering::Relaxed);
                }
            });
        });
        times.expand = t.elapsed();
        let seeds: Vec<u32> = groups[..t_count].iter().map(|g| g.lock().seed).collect();

        let t = Instant::now();
        let outcomes: Vec<i8> = self.pool.install(|| {
            (0..t_count * m)
                .into_par_iter()
                .map(|j| {
                    let mut rc = rollouts[j].lock();
                    let rc = &mut *rc;
                    playout::rollout_from::<G, _>(
                        arena,
                        seeds[j / m],
                        &mut rc.board,
                        &mut rc.extra,
                        &mut rc.legal,
                        &mut rc.rng,
                    )
                    .as_byte()
                })
                .collect()
        });
        times.playout = t.elapsed();

        let t = Instant::now();
        self.pool.install(|| {
            (0..t_count).into_par_iter().for_each(|g| {
                let ctx = groups[g].lock();
                let (max_wins, min_wins) = backup::tally(&outcomes[g * m..(g + 1) * m]);
                backup::backup_counts(arena, &ctx.path, max_wins, min_wins, m as u32);
            });
        });
        times.backup = t.elapsed();

        (times, exhausted.load(Ordering::Relaxed))
    }

    /// One contended step: every worker runs the full pipeline once against
    /// the shared tree.
    fn step_contended(&self) -> (StepTimes, bool) {
        let arena = &self.arena;
        let groups = &self.groups;
        let root = self.roots[0];
        let ucb_c = self.cfg.ucb_c;
        let prodigal = self.cfg.variant.is_prodigal();
        let nanos = PhaseNanos::default();
        let exhausted = AtomicBool::new(false);

        self.pool.install(|| {
            (0..groups.len()).into_par_iter().for_each(|w| {
                let mut ctx = groups[w].lock();
                let ctx = &mut *ctx;

                let t = Instant::now();
                ctx.leaf = select::descend(arena, root, ucb_c, &mut ctx.path);
                nanos
                    .select
                    .fetch_add(t.elapsed().as_nanos() as u64, Ordering::Relaxed);

                let t = Instant::now();
                let res = if arena.outcome(ctx.leaf).is_decided() {
                    Expanded { seed: ctx.leaf, exhausted: false }
                } else {
                    // Double-checked under the node's seat: a racing worker
                    // may have expanded first, in which case the kernel
                    // seeds from an existing child.
                    let _seat = arena.expansion_seat(ctx.leaf);
                    expand_leaf::<G>(arena, ctx, prodigal)
                };
                ctx.seed = res.seed;
                if res.exhausted {
                    exhausted.store(true, Ordering::Relaxed);
                }
                nanos
                    .expand
                    .fetch_add(t.elapsed().as_nanos() as u64, Ordering::Relaxed);

                let t = Instant::now();
                let outcome = playout::rollout_from::<G, _>(
                    arena,
                    ctx.seed,
                    &mut ctx.child_board,
                    &mut ctx.child_extra,
                    &mut ctx.legal,
                    &mut ctx.rng,
                );
                nanos
                    .playout
                    .fetch_add(t.elapsed().as_nanos() as u64, Ordering::Relaxed);

                let t = Instant::now();
                backup::backup_single(arena, &ctx.path, outcome);
                nanos
                    .backup
                    .fetch_add(t.elapsed().as_nanos() as u64, Ordering::Relaxed);
            });
        });

        (nanos.into_times(), exhausted.load(Ordering::Relaxed))
    }

    /// Aggregates per-action statistics over all roots' children (visits
    /// and wins summed, proven wins OR-ed) and applies the final
    /// comparator.
    fn reduce_over_actions(&self) -> Result<ActionsReport, EngineError> {
        let n_root_total: u64 = self
            .roots
            .iter()
            .map(|&r| u64::from(self.arena.visits(r)))
            .sum();
        let mut entries = Vec::new();
        for action in 0..G::MAX_ACTIONS {
            let mut n = 0u64;
            let mut n_wins = 0u64;
            let mut win_flag = false;
            let mut present = false;
            for &root in &self.roots {
                if let Some(child) = self.arena.child(root, action) {
                    present = true;
                    n += u64::from(self.arena.visits(child));
                    n_wins += u64::from(self.arena.wins(child));
                    win_flag |= self.arena.win_flag(child);
                }
            }
            if !present {
                continue;
            }
            let q = (n > 0).then(|| n_wins as f64 / n as f64);
            let ucb = match q {
                Some(q) if n_root_total > 0 => {
                    Some(q + self.cfg.ucb_c * ((n_root_total as f64).ln() / n as f64).sqrt())
                }
                _ => None,
            };
            entries.push(ActionReportEntry {
                index: action,
                name: G::action_to_name(action),
                n_root: n_root_total,
                win_flag,
                n,
                n_wins,
                q,
                ucb,
            });
        }
        ActionsReport::from_entries(entries).ok_or_else(|| {
            EngineError::ContractViolation("search root has no actions to reduce over".into())
        })
    }

    fn tree_shape(&self) -> (u64, SubtreeStats) {
        let mut shape = SubtreeStats::default();
        let mut n_root = 0u64;
        for &root in &self.roots {
            shape.merge(self.arena.subtree_stats(root));
            n_root += u64::from(self.arena.visits(root));
        }
        (n_root, shape)
    }
}
