//! Connect-4 state machine.
//!
//! # Board layout
//!
//! The board is stored row-major with row 0 at the top — the same
//! orientation the 42-character wire string uses:
//!
//! ```text
//! Row 0: . . . . . . .   <- top (a column is full when this is set)
//! Row 1: . . . . . . .
//! Row 2: . . . . . . .
//! Row 3: . . . . . . .
//! Row 4: . . . . . . .
//! Row 5: . . . . . . .   <- bottom (pieces land here first)
//!        0 1 2 3 4 5 6
//! ```
//!
//! Gravity invariant: a non-empty cell implies every cell below it in
//! the same column is non-empty.

use shadowplay_protocol::GameDoc;

/// Board height.
pub const ROWS: usize = 6;
/// Board width.
pub const COLS: usize = 7;

/// Lifecycle phase of a match, as encoded on the wire.
///
/// Discriminants are fixed: the devices branch on the raw integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// 0 — reserved, never produced.
    Reserved,
    /// 1 — no match running (also the freshly-reset state).
    GameOver,
    /// 2 — a match is in progress.
    Playing,
}

impl Phase {
    /// The wire discriminant.
    pub fn as_wire(self) -> u8 {
        match self {
            Self::Reserved => 0,
            Self::GameOver => 1,
            Self::Playing => 2,
        }
    }
}

/// A game of Connect-4.
///
/// All mutation goes through [`reset`](Self::reset),
/// [`set_phase`](Self::set_phase) and [`apply_move`](Self::apply_move);
/// everything else is read-only.
#[derive(Debug, Clone)]
pub struct Connect4 {
    /// 0 = empty, 1 = player 1, 2 = player 2.
    board: [[u8; COLS]; ROWS],
    /// 1 or 2.
    turn: u8,
    /// 0 = undecided, 1 or 2 = that player, -1 = tie.
    winner: i8,
    phase: Phase,
}

impl Default for Connect4 {
    fn default() -> Self {
        Self::new()
    }
}

impl Connect4 {
    /// Creates a fresh game in the not-yet-started state.
    pub fn new() -> Self {
        Self {
            board: [[0; COLS]; ROWS],
            turn: 1,
            winner: 0,
            phase: Phase::GameOver,
        }
    }

    /// Clears the board for a new match: player 1 to move, no winner,
    /// phase back to [`Phase::GameOver`] (not yet started).
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Direct phase transition. Caller-trusted — the orchestrator owns
    /// the session state machine; the engine does not second-guess it.
    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Returns `true` once a winner (or tie) has been decided.
    pub fn is_over(&self) -> bool {
        self.winner != 0
    }

    /// 0 while undecided, 1 or 2 for a win, -1 for a tie.
    pub fn winner(&self) -> i8 {
        self.winner
    }

    /// Whose turn it is: 1 or 2.
    pub fn current_player(&self) -> u8 {
        self.turn
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Drops the current player's piece into `column` (0-indexed).
    ///
    /// Fails closed — returns `false` without mutating anything — when
    /// the game is already decided, the column is out of range, or the
    /// column is full. Otherwise the piece lands in the lowest empty
    /// row, the turn advances, and the winner is recomputed.
    pub fn apply_move(&mut self, column: usize) -> bool {
        if self.is_over() {
            return false;
        }
        if column >= COLS {
            return false;
        }
        // Top cell occupied means the column is full.
        if self.board[0][column] != 0 {
            return false;
        }
        for row in (0..ROWS).rev() {
            if self.board[row][column] == 0 {
                self.board[row][column] = self.turn;
                self.turn = (self.turn % 2) + 1;
                self.winner = self.check_winner();
                return true;
            }
        }
        false
    }

    /// Renders the state as a wire document, with `ack` echoing the
    /// last-consumed player input.
    pub fn serialize(&self, ack: i32) -> GameDoc {
        let mut board = String::with_capacity(ROWS * COLS);
        for row in &self.board {
            for cell in row {
                board.push((b'0' + cell) as char);
            }
        }
        GameDoc {
            board,
            current_turn: self.turn,
            winner: self.winner,
            player_input: ack,
            game_state: self.phase.as_wire(),
        }
    }

    /// Scans for a decided game in a fixed order: horizontal, vertical,
    /// up-right diagonal, up-left diagonal, then board-full tie.
    ///
    /// If two winning lines ever existed simultaneously the first found
    /// in this order would be reported. Under one-piece-per-move play a
    /// move completes at most one player's lines, so the precedence is
    /// never observable — but it is the documented behavior, not an
    /// accident.
    fn check_winner(&self) -> i8 {
        let hits = [
            self.check_horizontal(),
            self.check_vertical(),
            self.check_diagonal_up_right(),
            self.check_diagonal_up_left(),
        ];
        for hit in hits {
            if hit != 0 {
                return hit as i8;
            }
        }
        if self.is_board_full() { -1 } else { 0 }
    }

    /// The board is full exactly when the top row is — gravity keeps
    /// columns contiguous from the bottom.
    fn is_board_full(&self) -> bool {
        self.board[0].iter().all(|&cell| cell != 0)
    }

    fn check_horizontal(&self) -> u8 {
        for col in 0..COLS - 3 {
            for row in 0..ROWS {
                let v = self.board[row][col];
                if v != 0
                    && v == self.board[row][col + 1]
                    && v == self.board[row][col + 2]
                    && v == self.board[row][col + 3]
                {
                    return v;
                }
            }
        }
        0
    }

    fn check_vertical(&self) -> u8 {
        for row in 0..ROWS - 3 {
            for col in 0..COLS {
                let v = self.board[row][col];
                if v != 0
                    && v == self.board[row + 1][col]
                    && v == self.board[row + 2][col]
                    && v == self.board[row + 3][col]
                {
                    return v;
                }
            }
        }
        0
    }

    /// Runs that climb toward the top-right (row decreasing as the
    /// column increases), anchored at their bottom-left cell.
    fn check_diagonal_up_right(&self) -> u8 {
        for row in 3..ROWS {
            for col in 0..COLS - 3 {
                let v = self.board[row][col];
                if v != 0
                    && v == self.board[row - 1][col + 1]
                    && v == self.board[row - 2][col + 2]
                    && v == self.board[row - 3][col + 3]
                {
                    return v;
                }
            }
        }
        0
    }

    /// Runs that climb toward the top-left, anchored bottom-right.
    fn check_diagonal_up_left(&self) -> u8 {
        for row in 3..ROWS {
            for col in 3..COLS {
                let v = self.board[row][col];
                if v != 0
                    && v == self.board[row - 1][col - 1]
                    && v == self.board[row - 2][col - 2]
                    && v == self.board[row - 3][col - 3]
                {
                    return v;
                }
            }
        }
        0
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Index of (row, col) in the serialized board string.
    fn idx(row: usize, col: usize) -> usize {
        row * COLS + col
    }

    fn board_string(game: &Connect4) -> String {
        game.serialize(0).board
    }

    #[test]
    fn test_new_game_state() {
        let game = Connect4::new();
        assert_eq!(game.current_player(), 1);
        assert_eq!(game.winner(), 0);
        assert!(!game.is_over());
        assert_eq!(game.phase(), Phase::GameOver);
        assert_eq!(board_string(&game), "0".repeat(42));
    }

    #[test]
    fn test_first_move_lands_in_bottom_row() {
        let mut game = Connect4::new();
        assert!(game.apply_move(3));

        let board = board_string(&game);
        assert_eq!(&board[idx(5, 3)..=idx(5, 3)], "1");
        // Everything else untouched.
        assert_eq!(board.matches('1').count(), 1);
        assert_eq!(game.current_player(), 2);
    }

    #[test]
    fn test_turn_alternates_every_move() {
        let mut game = Connect4::new();
        assert!(game.apply_move(0));
        assert_eq!(game.current_player(), 2);
        assert!(game.apply_move(0));
        assert_eq!(game.current_player(), 1);
    }

    #[test]
    fn test_column_fills_bottom_up_contiguously() {
        let mut game = Connect4::new();
        for drop in 0..4 {
            assert!(game.apply_move(2));
            let board = board_string(&game);
            // Occupied cells in column 2 form a contiguous block at
            // the bottom, empty above.
            for row in 0..ROWS {
                let cell = board.as_bytes()[idx(row, 2)];
                if row >= ROWS - 1 - drop {
                    assert_ne!(cell, b'0', "row {row} after {drop} drops");
                } else {
                    assert_eq!(cell, b'0', "row {row} after {drop} drops");
                }
            }
        }
    }

    #[test]
    fn test_out_of_range_column_rejected() {
        let mut game = Connect4::new();
        assert!(!game.apply_move(COLS));
        assert!(!game.apply_move(99));
        assert_eq!(game.current_player(), 1);
        assert_eq!(board_string(&game), "0".repeat(42));
    }

    #[test]
    fn test_full_column_rejected_without_mutation() {
        let mut game = Connect4::new();
        for _ in 0..ROWS {
            assert!(game.apply_move(0));
        }
        let before = game.serialize(0);
        assert!(!game.apply_move(0));
        assert_eq!(game.serialize(0), before);
    }

    #[test]
    fn test_no_moves_after_game_decided() {
        let mut game = Connect4::new();
        // Vertical win: player 1 stacks column 0, player 2 column 6.
        for _ in 0..3 {
            assert!(game.apply_move(0));
            assert!(game.apply_move(6));
        }
        assert!(game.apply_move(0));
        assert_eq!(game.winner(), 1);
        assert!(game.is_over());

        let before = game.serialize(0);
        assert!(!game.apply_move(5));
        assert_eq!(game.serialize(0), before);
    }

    #[test]
    fn test_horizontal_win() {
        let mut game = Connect4::new();
        // Player 1 takes columns 0..3 along the bottom row while
        // player 2 stacks column 6.
        assert!(game.apply_move(0));
        assert!(game.apply_move(6));
        assert!(game.apply_move(1));
        assert!(game.apply_move(6));
        assert!(game.apply_move(2));
        assert!(game.apply_move(6));
        assert_eq!(game.winner(), 0);
        assert!(game.apply_move(3));
        assert_eq!(game.winner(), 1);
    }

    #[test]
    fn test_diagonal_up_right_win() {
        let mut game = Connect4::new();
        // Builds player 1 pieces at heights 1,2,3,4 across columns
        // 0..=3: cells (5,0) (4,1) (3,2) (2,3).
        for col in [0, 1, 1, 2, 2, 3, 2, 3, 3, 6] {
            assert!(game.apply_move(col));
            assert_eq!(game.winner(), 0);
        }
        assert!(game.apply_move(3));
        assert_eq!(game.winner(), 1);
    }

    #[test]
    fn test_diagonal_up_left_win() {
        let mut game = Connect4::new();
        // Mirror image of the up-right case, across columns 6..=3.
        for col in [6, 5, 5, 4, 4, 3, 4, 3, 3, 0] {
            assert!(game.apply_move(col));
            assert_eq!(game.winner(), 0);
        }
        assert!(game.apply_move(3));
        assert_eq!(game.winner(), 1);
    }

    #[test]
    fn test_full_board_with_no_line_is_a_tie() {
        let mut game = Connect4::new();
        // Filling level by level in this column order produces rows of
        // 1122112 / 2211221, which alternate by level. No direction
        // ever accumulates four in a row, so all 42 drops succeed and
        // the final one turns the game into a tie.
        let order = [0, 2, 1, 3, 4, 6, 5];
        for level in 0..ROWS {
            for &col in &order {
                assert_eq!(game.winner(), 0, "level {level} col {col}");
                assert!(game.apply_move(col), "level {level} col {col}");
            }
        }
        assert_eq!(game.winner(), -1);
        assert!(game.is_over());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut game = Connect4::new();
        game.set_phase(Phase::Playing);
        for _ in 0..3 {
            assert!(game.apply_move(0));
            assert!(game.apply_move(6));
        }
        assert!(game.apply_move(0)); // player 1 wins
        game.reset();

        assert_eq!(game.winner(), 0);
        assert_eq!(game.current_player(), 1);
        assert_eq!(game.phase(), Phase::GameOver);
        assert_eq!(board_string(&game), "0".repeat(42));
    }

    #[test]
    fn test_serialize_shape() {
        let mut game = Connect4::new();
        game.set_phase(Phase::Playing);
        assert!(game.apply_move(0));

        let doc = game.serialize(1);
        assert_eq!(doc.board.len(), 42);
        assert_eq!(doc.board.as_bytes()[idx(5, 0)], b'1');
        assert_eq!(doc.current_turn, 2);
        assert_eq!(doc.winner, 0);
        assert_eq!(doc.player_input, 1);
        assert_eq!(doc.game_state, Phase::Playing.as_wire());
    }

    #[test]
    fn test_phase_wire_discriminants() {
        assert_eq!(Phase::Reserved.as_wire(), 0);
        assert_eq!(Phase::GameOver.as_wire(), 1);
        assert_eq!(Phase::Playing.as_wire(), 2);
    }
}
