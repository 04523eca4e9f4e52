//! Game runner: carries out a single game between two players (engines or
//! humans), validating input and collecting per-round reports.
//!
//! The search core never sees an illegal action: human input is parsed by
//! name, mapped to an action index, and checked against the mechanics
//! before it is applied; engine output is trusted but cheaply re-checked.

use colored::Colorize;
use std::io::{self, BufRead, Write};

use crate::archive::{ExperimentInfo, GameInfo, MovesRound};
use crate::report::SearchOutput;
use crate::{EngineError, GameMechanics, Outcome, ParallelMcts, SequentialMcts};

/// Outcome banner, indexed by `outcome + 1`.
pub const OUTCOME_MESSAGES: [&str; 3] = ["WHITE WINS", "DRAW", "BLACK WINS"];

/// One participant of a game.
pub enum Player<G: GameMechanics> {
    /// Moves are read from standard input by action name.
    Human,
    Sequential(SequentialMcts<G>),
    Parallel(ParallelMcts<G>),
}

impl<G: GameMechanics> Player<G> {
    pub fn label(&self) -> String {
        match self {
            Player::Human => "human".to_string(),
            Player::Sequential(engine) => engine.config().shortname(),
            Player::Parallel(engine) => engine.config().shortname(),
        }
    }

    fn choose(
        &mut self,
        board: &[i8],
        extra: &[i8],
        turn: i8,
        forced_steps: Option<u64>,
    ) -> Result<(usize, Option<SearchOutput>), EngineError> {
        match self {
            Player::Human => Ok((read_human_move::<G>(board, extra, turn)?, None)),
            Player::Sequential(engine) => {
                let output = engine.run(board, extra, turn, forced_steps)?;
                Ok((output.best_action, Some(output)))
            }
            Player::Parallel(engine) => {
                let output = engine.run(board, extra, turn, forced_steps)?;
                Ok((output.best_action, Some(output)))
            }
        }
    }
}

fn read_human_move<G: GameMechanics>(
    board: &[i8],
    extra: &[i8],
    turn: i8,
) -> Result<usize, EngineError> {
    let side = if turn == 1 { "BLACK" } else { "WHITE" };
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{side} PLAYER, PICK YOUR MOVE: ");
        let _ = io::stdout().flush();
        let Some(line) = lines.next() else {
            return Err(EngineError::IllegalMove { name: "<end of input>".into() });
        };
        let name = line?.trim().to_string();
        match G::name_to_action(&name) {
            Some(action) if G::is_legal(board, extra, turn, action) => return Ok(action),
            _ => println!("{}", format!("invalid move '{name}', try again").red()),
        }
    }
}

/// Plays one game and collects its archive record.
pub struct GameRunner<'a, G: GameMechanics> {
    black: &'a mut Player<G>,
    white: &'a mut Player<G>,
    game_index: usize,
    n_games: usize,
}

impl<'a, G: GameMechanics> GameRunner<'a, G> {
    pub fn new(
        black: &'a mut Player<G>,
        white: &'a mut Player<G>,
        game_index: usize,
        n_games: usize,
    ) -> GameRunner<'a, G> {
        GameRunner { black, white, game_index, n_games }
    }

    /// Carries out the game. With `replay`, each engine move is forced to
    /// the step count recorded for the same game and round of the prior
    /// experiment.
    pub fn run(&mut self, replay: Option<&ExperimentInfo>) -> Result<(Outcome, GameInfo), EngineError> {
        let mut board = vec![0i8; G::board_cells()];
        let mut extra = vec![0i8; G::EXTRA_INFO];
        G::initial(&mut board, &mut extra);
        let mut turn = 1i8;

        let mut game_info = GameInfo {
            black: self.black.label(),
            white: self.white.label(),
            initial_state: G::render(&board, &extra),
            moves_rounds: Default::default(),
            outcome: None,
            outcome_message: None,
        };
        println!("{}", G::render(&board, &extra));

        let mut round = 0usize;
        let outcome = 'game: loop {
            round += 1;
            println!(
                "\nMOVES ROUND: {round} [game: {}/{}]",
                self.game_index, self.n_games
            );
            let mut round_info = MovesRound::default();
            for black_to_move in [true, false] {
                let mover = if black_to_move { &mut *self.black } else { &mut *self.white };
                let forced = replay
                    .and_then(|e| e.recorded_steps(self.game_index, round, black_to_move));
                let (action, output) = mover.choose(&board, &extra, turn, forced)?;
                if !G::is_legal(&board, &extra, turn, action) {
                    return Err(EngineError::ContractViolation(format!(
                        "engine chose illegal action {action}"
                    )));
                }
                println!("MOVE PLAYED: {}", G::action_to_name(action).bold());
                G::apply(&mut board, &mut extra, turn, action);
                turn = -turn;
                println!("{}", G::render(&board, &extra));
                if let Some(output) = output {
                    if black_to_move {
                        round_info.black_best_action_info = Some(output.actions.best);
                        round_info.black_performance_info = Some(output.performance);
                    } else {
                        round_info.white_best_action_info = Some(output.actions.best);
                        round_info.white_performance_info = Some(output.performance);
                    }
                }
                let outcome = G::terminal(&board, &extra, turn, action as u16);
                if outcome.is_decided() {
                    game_info
                        .moves_rounds
                        .insert(round.to_string(), round_info);
                    break 'game outcome;
                }
            }
            game_info.moves_rounds.insert(round.to_string(), round_info);
        };

        let message = OUTCOME_MESSAGES[(outcome.as_byte() + 1) as usize];
        let banner = match outcome {
            Outcome::MaxWins => message.green().bold(),
            Outcome::MinWins => message.blue().bold(),
            _ => message.yellow().bold(),
        };
        println!("GAME OUTCOME: {banner}");
        game_info.outcome = Some(outcome.as_byte());
        game_info.outcome_message = Some(message.to_string());
        Ok((outcome, game_info))
    }
}
