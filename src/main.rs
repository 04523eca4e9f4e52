//! # Match runner for the parallel MCTS engine
//!
//! Plays a match of one or more games between two players on one of the
//! supported boards. Each player is a human, the sequential reference
//! engine, or the parallel engine in one of its four regimes. The two
//! players swap colors every game; per-move reports are gathered into an
//! experiment archive that can be saved and later replayed move for move.
//!
//! ## Usage Examples
//! ```bash
//! # Human (black on odd games) against the default parallel engine
//! cargo run --release -- --game reversi --black human
//!
//! # Engine-vs-engine regression match, archived
//! cargo run --release -- --game connect4 --black parallel --white sequential \
//!     --games 10 --time-limit 1 --save match.json
//!
//! # Reproduce a recorded experiment step for step
//! cargo run --release -- --game connect4 --games 10 --replay match.json
//! ```

use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

use mcts::archive::{ExperimentInfo, MatchupInfo};
use mcts::games::{Connect4, Gomoku, Reversi};
use mcts::runner::{GameRunner, Player};
use mcts::{
    EngineError, GameMechanics, Outcome, ParallelMcts, SearchConfig, SequentialConfig,
    SequentialMcts, Variant,
};

/// Command-line arguments for a match.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Game to play: connect4, gomoku, or reversi.
    #[arg(long, default_value = "connect4")]
    game: String,

    /// Black player: human, sequential, or parallel.
    #[arg(long, default_value = "parallel")]
    black: String,

    /// White player: human, sequential, or parallel.
    #[arg(long, default_value = "parallel")]
    white: String,

    /// Number of games in the match (colors swap every game).
    #[arg(long, default_value_t = 1)]
    games: usize,

    /// Wall-clock budget per search in seconds; 0 means unlimited.
    #[arg(long, default_value_t = 5.0)]
    time_limit: f64,

    /// Step budget per search; 0 means unlimited.
    #[arg(long, default_value_t = 0)]
    steps_limit: u64,

    /// Number of coalesced work groups (T).
    #[arg(long, default_value_t = 4)]
    n_trees: usize,

    /// Rollouts per group per step (m).
    #[arg(long, default_value_t = 64)]
    n_playouts: usize,

    /// Parallel regime: ocp_thrifty, ocp_prodigal, acp_thrifty,
    /// acp_prodigal.
    #[arg(long, default_value = "acp_prodigal")]
    variant: String,

    /// Keep the search tree between moves (promote the played-through
    /// subtree) instead of starting every search cold.
    #[arg(long)]
    reuse_tree: bool,

    /// UCB1 exploration constant.
    #[arg(long, default_value_t = 2.0)]
    ucb_c: f64,

    /// Arena memory budget in GiB.
    #[arg(long, default_value_t = 2.0)]
    device_memory: f64,

    /// Root seed for the deterministic PRNG streams.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Worker threads; 0 lets the pool size itself to the machine.
    #[arg(long, default_value_t = 0)]
    num_threads: usize,

    /// Prior experiment archive to reproduce (forces recorded step
    /// counts; engine budgets are otherwise ignored).
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Where to write the experiment archive.
    #[arg(long)]
    save: Option<PathBuf>,
}

impl Args {
    fn search_config(&self) -> Result<SearchConfig, String> {
        Ok(SearchConfig {
            search_time_limit: (self.time_limit > 0.0)
                .then(|| Duration::from_secs_f64(self.time_limit)),
            search_steps_limit: (self.steps_limit > 0).then_some(self.steps_limit),
            n_trees: self.n_trees,
            n_playouts: self.n_playouts,
            variant: self.variant.parse::<Variant>()?,
            vanilla: !self.reuse_tree,
            ucb_c: self.ucb_c,
            device_memory_gib: self.device_memory,
            seed: self.seed,
            num_threads: self.num_threads,
        })
    }

    fn sequential_config(&self) -> SequentialConfig {
        SequentialConfig {
            search_time_limit: (self.time_limit > 0.0)
                .then(|| Duration::from_secs_f64(self.time_limit)),
            search_steps_limit: (self.steps_limit > 0).then_some(self.steps_limit),
            vanilla: !self.reuse_tree,
            ucb_c: self.ucb_c,
            seed: self.seed,
        }
    }

    fn player<G: GameMechanics>(&self, spec: &str, seed_offset: u64) -> Result<Player<G>, String> {
        match spec {
            "human" => Ok(Player::Human),
            "sequential" => {
                let mut cfg = self.sequential_config();
                cfg.seed = cfg.seed.wrapping_add(seed_offset);
                Ok(Player::Sequential(SequentialMcts::new(cfg)))
            }
            "parallel" => {
                let mut cfg = self.search_config()?;
                cfg.seed = cfg.seed.wrapping_add(seed_offset);
                Ok(Player::Parallel(ParallelMcts::new(cfg)))
            }
            other => Err(format!(
                "unknown player '{other}' (expected human, sequential, or parallel)"
            )),
        }
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let result = match args.game.as_str() {
        "connect4" => play_match::<Connect4>(&args),
        "gomoku" => play_match::<Gomoku>(&args),
        "reversi" => play_match::<Reversi>(&args),
        other => {
            eprintln!("unknown game '{other}' (expected connect4, gomoku, or reversi)");
            std::process::exit(2);
        }
    };
    if let Err(err) = result {
        eprintln!("{} {err}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn play_match<G: GameMechanics>(args: &Args) -> Result<(), EngineError> {
    let mut player_a = args
        .player::<G>(&args.black, 0)
        .map_err(EngineError::ContractViolation)?;
    let mut player_b = args
        .player::<G>(&args.white, 1)
        .map_err(EngineError::ContractViolation)?;
    let replay = match &args.replay {
        Some(path) => Some(ExperimentInfo::load(path)?),
        None => None,
    };

    let matchup = MatchupInfo {
        game: G::NAME.to_string(),
        ai_a: player_a.label(),
        ai_b: player_b.label(),
        n_games: args.games,
    };
    let mut experiment = ExperimentInfo::new(matchup, args.num_threads);
    println!("MATCH-UP: {} vs {} at {} [{} game(s)]",
        experiment.matchup_info.ai_a.bold(),
        experiment.matchup_info.ai_b.bold(),
        G::NAME,
        args.games
    );

    let mut score_a = 0.0;
    let mut score_b = 0.0;
    let mut white_wins = 0u32;
    let mut black_wins = 0u32;
    for game in 1..=args.games {
        println!("\nGAME {game}/{}:", args.games);
        let a_starts = game % 2 == 1;
        let outcome = {
            let (black, white) = if a_starts {
                (&mut player_a, &mut player_b)
            } else {
                (&mut player_b, &mut player_a)
            };
            println!("BLACK: {}", black.label());
            println!("WHITE: {}", white.label());
            let mut runner = GameRunner::new(black, white, game, args.games);
            let (outcome, game_info) = runner.run(replay.as_ref())?;
            experiment.games_infos.insert(game.to_string(), game_info);
            outcome
        };
        match outcome {
            Outcome::MaxWins => black_wins += 1,
            Outcome::MinWins => white_wins += 1,
            _ => {}
        }
        // 0.0 loss, 0.5 draw, 1.0 win from A's perspective.
        let normed = 0.5 * (f64::from(outcome.as_byte()) + 1.0);
        score_a += if a_starts { normed } else { 1.0 - normed };
        score_b += if a_starts { 1.0 - normed } else { normed };
        println!(
            "[score so far -> A: {score_a} ({}), B: {score_b} ({})]",
            player_a.label(),
            player_b.label()
        );
    }

    let n = args.games as f64;
    experiment.stats.score_a_total = score_a;
    experiment.stats.score_a_mean = score_a / n;
    experiment.stats.score_b_total = score_b;
    experiment.stats.score_b_mean = score_b / n;
    experiment.stats.white_wins_count = white_wins;
    experiment.stats.white_wins_freq = f64::from(white_wins) / n;
    experiment.stats.black_wins_count = black_wins;
    experiment.stats.black_wins_freq = f64::from(black_wins) / n;
    println!(
        "\nCOUNTS -> WHITE WINS: {white_wins}, DRAWS: {}, BLACK WINS: {black_wins}",
        args.games as u32 - white_wins - black_wins
    );

    if let Some(path) = &args.save {
        experiment.save(path)?;
        println!("experiment archive written to {}", path.display());
    }
    Ok(())
}
