//! # Connect 4 Game Implementation
//!
//! Players alternate dropping discs into columns of a 6x7 grid; discs fall
//! to the lowest free cell. The first player to line up four discs
//! (horizontally, vertically, or diagonally) wins; a full board without a
//! line is a draw.
//!
//! The extra-info buffer carries the per-column fill counts, so legality is
//! an O(1) lookup and the landing row of a drop is known without scanning.

use crate::{GameMechanics, Outcome, NO_ACTION};
use std::fmt::Write;

/// Connect 4 on the standard 6x7 board.
pub struct Connect4;

const M: usize = 6;
const N: usize = 7;

/// Length of the contiguous run through cell `(i, j)` along `(di, dj)` and
/// its opposite, not counting the cell itself.
fn run_through(board: &[i8], i: usize, j: usize, di: isize, dj: isize, token: i8) -> usize {
    let mut total = 0;
    for dir in [(di, dj), (-di, -dj)] {
        let (mut r, mut c) = (i as isize + dir.0, j as isize + dir.1);
        while r >= 0 && r < M as isize && c >= 0 && c < N as isize {
            if board[r as usize * N + c as usize] != token {
                break;
            }
            total += 1;
            r += dir.0;
            c += dir.1;
        }
    }
    total
}

impl GameMechanics for Connect4 {
    const ROWS: usize = M;
    const COLS: usize = N;
    const MAX_ACTIONS: usize = N;
    const EXTRA_INFO: usize = N;
    const NAME: &'static str = "Connect4_6x7";

    fn initial(board: &mut [i8], extra: &mut [i8]) {
        board.fill(0);
        extra.fill(0);
    }

    fn is_legal(_board: &[i8], extra: &[i8], _turn: i8, action: usize) -> bool {
        action < N && (extra[action] as usize) < M
    }

    fn apply(board: &mut [i8], extra: &mut [i8], turn: i8, action: usize) {
        let i = M - 1 - extra[action] as usize;
        board[i * N + action] = turn;
        extra[action] += 1;
    }

    fn legal_actions(_board: &[i8], extra: &[i8], _turn: i8, out: &mut Vec<u16>) {
        out.clear();
        for j in 0..N {
            if (extra[j] as usize) < M {
                out.push(j as u16);
            }
        }
    }

    fn apply_playout(
        board: &mut [i8],
        extra: &mut [i8],
        turn: i8,
        action: u16,
        ord: usize,
        legal: &mut Vec<u16>,
    ) {
        Self::apply(board, extra, turn, action as usize);
        // A filled column leaves the legal set for the rest of the rollout.
        if extra[action as usize] as usize == M {
            legal.swap_remove(ord);
        }
    }

    fn terminal(board: &[i8], extra: &[i8], turn: i8, last_action: u16) -> Outcome {
        if last_action == NO_ACTION {
            return Outcome::Ongoing;
        }
        let j = last_action as usize;
        let i = M - extra[j] as usize;
        let token = -turn; // the disc just dropped belongs to the previous mover
        for (di, dj) in [(1, 0), (0, 1), (1, 1), (1, -1)] {
            if run_through(board, i, j, di, dj, token) >= 3 {
                return Outcome::win_for(token);
            }
        }
        if extra.iter().all(|&f| f as usize == M) {
            return Outcome::Draw;
        }
        Outcome::Ongoing
    }

    fn action_to_name(action: usize) -> String {
        action.to_string()
    }

    fn name_to_action(name: &str) -> Option<usize> {
        name.trim().parse::<usize>().ok().filter(|&j| j < N)
    }

    fn render(board: &[i8], _extra: &[i8]) -> String {
        let mut s = String::new();
        for i in 0..M {
            s.push('|');
            for j in 0..N {
                s.push(match board[i * N + j] {
                    1 => 'X',
                    -1 => 'O',
                    _ => '.',
                });
                s.push('|');
            }
            s.push('\n');
        }
        s.push(' ');
        for j in 0..N {
            let _ = write!(s, "{} ", j);
        }
        s
    }
}
