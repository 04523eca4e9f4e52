//! Expand kernel: materializes children of a selected frontier and picks
//! the playout seed.
//!
//! Two disciplines share one entry point:
//! - **prodigal** creates every legal child up front (each with its board
//!   snapshot and cached terminal outcome) and draws one at random;
//! - **thrifty** draws one yet-unexpanded legal action and creates only
//!   that child, so the tree grows a single node per trajectory.
//!
//! Terminal frontiers are left alone (the node itself becomes the seed and
//! rollouts report its cached outcome). An allocation failure marks the
//! step arena-exhausted and seeds the rollout from the frontier without a
//! new node.
//!
//! Contended-pipeline callers hold the frontier's expansion seat around
//! this kernel; the children array is re-read here, so a worker that lost
//! the race degrades to seeding from a child the winner created. Coalesced
//! groups own their trees outright and need no seat.

use crate::arena::{TreeArena, LEGAL_UNKNOWN};
use crate::GameMechanics;

use super::playout::uniform_below;
use super::GroupCtx;

pub(crate) struct Expanded {
    pub seed: u32,
    pub exhausted: bool,
}

impl Expanded {
    fn at(seed: u32) -> Expanded {
        Expanded { seed, exhausted: false }
    }
}

/// Expands the frontier recorded in `ctx.leaf` (the end of `ctx.path`) and
/// returns the playout seed, which is also pushed onto the path so backup
/// credits it.
pub(crate) fn expand_leaf<G: GameMechanics>(
    arena: &TreeArena,
    ctx: &mut GroupCtx,
    prodigal: bool,
) -> Expanded {
    let leaf = ctx.leaf;
    if arena.outcome(leaf).is_decided() {
        return Expanded::at(leaf);
    }
    arena.read_board(leaf, &mut ctx.board, &mut ctx.extra);
    let turn = arena.turn(leaf);
    G::legal_actions(&ctx.board, &ctx.extra, turn, &mut ctx.legal);
    debug_assert!(
        !ctx.legal.is_empty(),
        "non-terminal node without legal actions"
    );
    if ctx.legal.is_empty() {
        return Expanded::at(leaf);
    }
    if arena.n_legal(leaf) == LEGAL_UNKNOWN {
        arena.set_n_legal(leaf, ctx.legal.len() as u16);
    }
    if prodigal {
        expand_all::<G>(arena, ctx, leaf, turn)
    } else {
        expand_one::<G>(arena, ctx, leaf, turn)
    }
}

/// Builds one child off the leaf state held in `ctx.board`/`ctx.extra`:
/// applies the action into the child scratch, allocates, snapshots, caches
/// the terminal outcome (latching `win_flag` on a proven win), and only
/// then publishes the index.
fn create_child<G: GameMechanics>(
    arena: &TreeArena,
    ctx: &mut GroupCtx,
    leaf: u32,
    turn: i8,
    action: u16,
) -> Option<u32> {
    ctx.child_board.copy_from_slice(&ctx.board);
    ctx.child_extra.copy_from_slice(&ctx.extra);
    G::apply(&mut ctx.child_board, &mut ctx.child_extra, turn, action as usize);
    let node = arena.alloc(leaf, action, -turn)?;
    arena.write_board(node, &ctx.child_board, &ctx.child_extra);
    arena.set_outcome(
        node,
        G::terminal(&ctx.child_board, &ctx.child_extra, -turn, action),
    );
    arena.publish_child(leaf, action as usize, node);
    Some(node)
}

fn expand_all<G: GameMechanics>(
    arena: &TreeArena,
    ctx: &mut GroupCtx,
    leaf: u32,
    turn: i8,
) -> Expanded {
    if arena.children_count(leaf) == 0 {
        for ord in 0..ctx.legal.len() {
            let action = ctx.legal[ord];
            if create_child::<G>(arena, ctx, leaf, turn, action).is_none() {
                return Expanded { seed: leaf, exhausted: true };
            }
        }
    }
    // Seed uniformly among the existing children (all of them after a full
    // expansion, whatever the race winner built otherwise).
    ctx.candidates.clear();
    for ord in 0..ctx.legal.len() {
        let action = ctx.legal[ord];
        if arena.child(leaf, action as usize).is_some() {
            ctx.candidates.push(action);
        }
    }
    if ctx.candidates.is_empty() {
        return Expanded::at(leaf);
    }
    let pick = uniform_below(&mut ctx.rng, ctx.candidates.len());
    let action = ctx.candidates[pick] as usize;
    match arena.child(leaf, action) {
        Some(seed) => {
            ctx.path.push(seed);
            Expanded::at(seed)
        }
        None => Expanded::at(leaf),
    }
}

fn expand_one<G: GameMechanics>(
    arena: &TreeArena,
    ctx: &mut GroupCtx,
    leaf: u32,
    turn: i8,
) -> Expanded {
    ctx.candidates.clear();
    for ord in 0..ctx.legal.len() {
        let action = ctx.legal[ord];
        if arena.child(leaf, action as usize).is_none() {
            ctx.candidates.push(action);
        }
    }
    if ctx.candidates.is_empty() {
        // Lost the expansion race outright; fall back to an existing child.
        let pick = uniform_below(&mut ctx.rng, ctx.legal.len());
        let action = ctx.legal[pick] as usize;
        return match arena.child(leaf, action) {
            Some(seed) => {
                ctx.path.push(seed);
                Expanded::at(seed)
            }
            None => Expanded::at(leaf),
        };
    }
    let pick = uniform_below(&mut ctx.rng, ctx.candidates.len());
    let action = ctx.candidates[pick];
    match create_child::<G>(arena, ctx, leaf, turn, action) {
        Some(seed) => {
            ctx.path.push(seed);
            Expanded::at(seed)
        }
        None => Expanded { seed: leaf, exhausted: true },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::NO_NODE;
    use crate::games::Connect4;
    use crate::{Outcome, NO_ACTION};

    fn setup(capacity: u32) -> (TreeArena, GroupCtx, u32) {
        let arena = TreeArena::with_capacity(
            capacity,
            Connect4::board_cells(),
            Connect4::EXTRA_INFO,
            Connect4::MAX_ACTIONS,
        );
        let mut board = vec![0i8; Connect4::board_cells()];
        let mut extra = vec![0i8; Connect4::EXTRA_INFO];
        Connect4::initial(&mut board, &mut extra);
        let root = arena.alloc(NO_NODE, NO_ACTION, 1).expect("root fits");
        arena.write_board(root, &board, &extra);
        let mut ctx = GroupCtx::new::<Connect4>(1);
        ctx.path = vec![root];
        ctx.leaf = root;
        (arena, ctx, root)
    }

    #[test]
    fn prodigal_creates_all_children() {
        let (arena, mut ctx, root) = setup(64);
        let res = expand_leaf::<Connect4>(&arena, &mut ctx, true);
        assert!(!res.exhausted);
        assert_eq!(arena.children_count(root), 7);
        assert_eq!(arena.n_legal(root), 7);
        assert!(!arena.is_frontier(root));
        // The seed is one of the children and joined the path.
        assert_eq!(arena.parent(res.seed), root);
        assert_eq!(ctx.path, vec![root, res.seed]);
        for action in 0..7 {
            let child = arena.child(root, action).expect("child created");
            assert_eq!(arena.turn(child), -1);
            assert_eq!(arena.outcome(child), Outcome::Ongoing);
            let (mut b, mut e) = (vec![0i8; 42], vec![0i8; 7]);
            arena.read_board(child, &mut b, &mut e);
            assert_eq!(e[action], 1);
        }
        arena.validate_subtree(root);
    }

    #[test]
    fn thrifty_grows_one_distinct_child_per_call() {
        let (arena, mut ctx, root) = setup(64);
        let mut seen = std::collections::HashSet::new();
        for round in 0..7 {
            ctx.path = vec![root];
            ctx.leaf = root;
            let res = expand_leaf::<Connect4>(&arena, &mut ctx, false);
            assert!(!res.exhausted);
            assert!(seen.insert(arena.last_action(res.seed)), "round {round}");
            assert_eq!(arena.children_count(root), round + 1);
        }
        assert!(!arena.is_frontier(root));
        // Fully expanded: further calls seed from existing children.
        ctx.path = vec![root];
        ctx.leaf = root;
        let res = expand_leaf::<Connect4>(&arena, &mut ctx, false);
        assert!(!res.exhausted);
        assert_eq!(arena.parent(res.seed), root);
        assert_eq!(arena.children_count(root), 7);
        arena.validate_subtree(root);
    }

    #[test]
    fn terminal_leaf_becomes_the_seed() {
        let (arena, mut ctx, root) = setup(64);
        arena.set_outcome(root, Outcome::Draw);
        let res = expand_leaf::<Connect4>(&arena, &mut ctx, true);
        assert_eq!(res.seed, root);
        assert_eq!(arena.children_count(root), 0);
    }

    #[test]
    fn exhausted_arena_seeds_from_the_frontier() {
        // Capacity 3: root plus two children, the third allocation fails.
        let (arena, mut ctx, root) = setup(3);
        let res = expand_leaf::<Connect4>(&arena, &mut ctx, true);
        assert!(res.exhausted);
        assert_eq!(res.seed, root);
        assert_eq!(arena.children_count(root), 2);
    }

    #[test]
    fn proven_win_latches_at_expansion() {
        // Black has three discs stacked in column 0; expanding the position
        // discovers the immediate vertical four.
        let (arena, mut ctx, root) = setup(64);
        let mut board = vec![0i8; 42];
        let mut extra = vec![0i8; 7];
        Connect4::initial(&mut board, &mut extra);
        let mut turn = 1i8;
        for &c in &[0usize, 1, 0, 2, 0, 3] {
            Connect4::apply(&mut board, &mut extra, turn, c);
            turn = -turn;
        }
        arena.write_board(root, &board, &extra);
        let res = expand_leaf::<Connect4>(&arena, &mut ctx, true);
        assert!(!res.exhausted);
        let winner = arena.child(root, 0).expect("winning child");
        assert_eq!(arena.outcome(winner), Outcome::MaxWins);
        assert!(arena.win_flag(winner));
        assert!(!arena.win_flag(arena.child(root, 5).unwrap()));
    }
}
