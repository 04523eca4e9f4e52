//! Playout kernel: randomized self-play from a seed position to a terminal
//! state.
//!
//! Rollouts share only the read side of the seed snapshot; every worker
//! plays on its own scratch buffers with its own PRNG stream, so the kernel
//! is lock-free.

use rand_xoshiro::rand_core::RngCore;

use crate::arena::TreeArena;
use crate::{GameMechanics, Outcome};

/// Uniform draw from `0..n` off a raw 64-bit stream.
pub(crate) fn uniform_below<R: RngCore>(rng: &mut R, n: usize) -> usize {
    (rng.next_u64() % n as u64) as usize
}

/// Plays uniformly random legal actions in place until the game ends and
/// returns the outcome.
///
/// `legal` is a caller-owned scratch list; it is refilled here and then
/// maintained by [`GameMechanics::apply_playout`] compaction, or rebuilt
/// every ply for games that demand it.
pub(crate) fn random_playout<G: GameMechanics, R: RngCore>(
    board: &mut [i8],
    extra: &mut [i8],
    mut turn: i8,
    mut last_action: u16,
    legal: &mut Vec<u16>,
    rng: &mut R,
) -> Outcome {
    let mut outcome = G::terminal(board, extra, turn, last_action);
    if outcome.is_decided() {
        return outcome;
    }
    G::legal_actions(board, extra, turn, legal);
    loop {
        if legal.is_empty() {
            // Unreachable for well-formed mechanics (a moveless position is
            // terminal); scored as a draw rather than spinning.
            return Outcome::Draw;
        }
        let ord = uniform_below(rng, legal.len());
        let action = legal[ord];
        G::apply_playout(board, extra, turn, action, ord, legal);
        turn = -turn;
        last_action = action;
        outcome = G::terminal(board, extra, turn, last_action);
        if outcome.is_decided() {
            return outcome;
        }
        if G::REFRESH_LEGAL_EACH_PLY {
            G::legal_actions(board, extra, turn, legal);
        }
    }
}

/// Runs one rollout from an arena node. Terminal seeds return their cached
/// outcome immediately (every coalesced rollout of such a seed reports the
/// same result).
pub(crate) fn rollout_from<G: GameMechanics, R: RngCore>(
    arena: &TreeArena,
    seed: u32,
    board: &mut [i8],
    extra: &mut [i8],
    legal: &mut Vec<u16>,
    rng: &mut R,
) -> Outcome {
    let cached = arena.outcome(seed);
    if cached.is_decided() {
        return cached;
    }
    arena.read_board(seed, board, extra);
    random_playout::<G, R>(
        board,
        extra,
        arena.turn(seed),
        arena.last_action(seed),
        legal,
        rng,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::{Connect4, Gomoku, Reversi};
    use rand_xoshiro::rand_core::SeedableRng;
    use rand_xoshiro::Xoroshiro128PlusPlus;

    fn finishes<G: GameMechanics>() {
        let mut board = vec![0i8; G::board_cells()];
        let mut extra = vec![0i8; G::EXTRA_INFO];
        G::initial(&mut board, &mut extra);
        let mut legal = Vec::new();
        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(7);
        for _ in 0..20 {
            let mut b = board.clone();
            let mut e = extra.clone();
            let outcome =
                random_playout::<G, _>(&mut b, &mut e, 1, crate::NO_ACTION, &mut legal, &mut rng);
            assert!(outcome.is_decided());
        }
    }

    #[test]
    fn playouts_reach_terminal_states() {
        finishes::<Connect4>();
        finishes::<Gomoku>();
        finishes::<Reversi>();
    }

    #[test]
    fn seeded_playouts_are_reproducible() {
        let mut board = vec![0i8; Connect4::board_cells()];
        let mut extra = vec![0i8; Connect4::EXTRA_INFO];
        Connect4::initial(&mut board, &mut extra);
        let mut legal = Vec::new();
        let run = |seed: u64, board: &[i8], extra: &[i8], legal: &mut Vec<u16>| {
            let mut rng = Xoroshiro128PlusPlus::seed_from_u64(seed);
            let mut b = board.to_vec();
            let mut e = extra.to_vec();
            random_playout::<Connect4, _>(&mut b, &mut e, 1, crate::NO_ACTION, legal, &mut rng)
        };
        assert_eq!(
            run(42, &board, &extra, &mut legal),
            run(42, &board, &extra, &mut legal)
        );
    }

    #[test]
    fn decided_seed_short_circuits() {
        // A position one move after a completed vertical four.
        let mut board = vec![0i8; Connect4::board_cells()];
        let mut extra = vec![0i8; Connect4::EXTRA_INFO];
        Connect4::initial(&mut board, &mut extra);
        let mut turn = 1i8;
        for &c in &[0usize, 1, 0, 2, 0, 3, 0] {
            Connect4::apply(&mut board, &mut extra, turn, c);
            turn = -turn;
        }
        assert_eq!(
            Connect4::terminal(&board, &extra, turn, 0),
            Outcome::MaxWins
        );
        let mut legal = Vec::new();
        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(0);
        let outcome =
            random_playout::<Connect4, _>(&mut board, &mut extra, turn, 0, &mut legal, &mut rng);
        assert_eq!(outcome, Outcome::MaxWins);
    }
}
