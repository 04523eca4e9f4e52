//! Backup kernel: folds rollout results up the traversed path.
//!
//! A node's win counter accumulates the outcomes favorable to the side that
//! moved into it (`turn == -outcome`); draws contribute to visits only.
//! Visits are bumped before wins at every node so the `n_wins <= n_visits`
//! invariant holds under any concurrent read.

use crate::arena::TreeArena;
use crate::Outcome;

/// Applies the aggregate of one trajectory's rollouts to every node on the
/// path (root first, seed last): `total` visits each, and the count of
/// outcomes won by the respective mover.
pub(crate) fn backup_counts(
    arena: &TreeArena,
    path: &[u32],
    max_wins: u32,
    min_wins: u32,
    total: u32,
) {
    for &node in path.iter().rev() {
        arena.add_visits(node, total);
        // turn == +1 benefits from minimizing-player losses and vice versa.
        let wins = if arena.turn(node) == 1 { min_wins } else { max_wins };
        if wins > 0 {
            arena.add_wins(node, wins);
        }
    }
}

/// Single-rollout backup used by the contended pipeline.
pub(crate) fn backup_single(arena: &TreeArena, path: &[u32], outcome: Outcome) {
    let (max_wins, min_wins) = match outcome {
        Outcome::MaxWins => (1, 0),
        Outcome::MinWins => (0, 1),
        _ => (0, 0),
    };
    backup_counts(arena, path, max_wins, min_wins, 1);
}

/// Tallies a batch of rollout outcome bytes into (max wins, min wins).
pub(crate) fn tally(outcomes: &[i8]) -> (u32, u32) {
    let mut max_wins = 0;
    let mut min_wins = 0;
    for &o in outcomes {
        match o {
            1 => max_wins += 1,
            -1 => min_wins += 1,
            _ => {}
        }
    }
    (max_wins, min_wins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::NO_NODE;
    use crate::NO_ACTION;

    #[test]
    fn wins_follow_the_mover() {
        let arena = TreeArena::with_capacity(8, 1, 0, 2);
        let root = arena.alloc(NO_NODE, NO_ACTION, 1).unwrap();
        let child = arena.alloc(root, 0, -1).unwrap();
        arena.publish_child(root, 0, child);
        let grandchild = arena.alloc(child, 1, 1).unwrap();
        arena.publish_child(child, 1, grandchild);

        // 10 rollouts: 6 max wins, 3 min wins, 1 draw.
        backup_counts(&arena, &[root, child, grandchild], 6, 3, 10);

        for node in [root, child, grandchild] {
            assert_eq!(arena.visits(node), 10);
        }
        // root (turn +1) and grandchild (turn +1) credit min-player losses.
        assert_eq!(arena.wins(root), 3);
        assert_eq!(arena.wins(grandchild), 3);
        // child (turn -1) credits max-player wins.
        assert_eq!(arena.wins(child), 6);
        arena.validate_subtree(root);
    }

    #[test]
    fn draws_touch_visits_only() {
        let arena = TreeArena::with_capacity(4, 1, 0, 2);
        let root = arena.alloc(NO_NODE, NO_ACTION, 1).unwrap();
        backup_single(&arena, &[root], Outcome::Draw);
        assert_eq!(arena.visits(root), 1);
        assert_eq!(arena.wins(root), 0);
    }

    #[test]
    fn tally_counts_signed_outcomes() {
        assert_eq!(tally(&[1, 1, -1, 0, 2, 1]), (3, 1));
        assert_eq!(tally(&[]), (0, 0));
    }
}
