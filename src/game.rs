use serde::{Deserialize, Serialize};

/// Number of cells on the board.
pub const CELL_COUNT: u8 = 9;

/// The 8 canonical winning lines: 3 rows, 3 columns, 2 diagonals.
pub const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Board contents: each cell holds at most one symbol.
pub type Board = [Option<Symbol>; CELL_COUNT as usize];

/// A player's mark on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Symbol {
    X,
    O,
}

impl Symbol {
    /// The other player's mark.
    pub fn opponent(self) -> Symbol {
        match self {
            Symbol::X => Symbol::O,
            Symbol::O => Symbol::X,
        }
    }
}

impl core::fmt::Display for Symbol {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Symbol::X => write!(f, "X"),
            Symbol::O => write!(f, "O"),
        }
    }
}

/// Which end of the session this peer is. The initiator creates the offer,
/// plays X and moves first; the responder consumes it, plays O and moves
/// second. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    /// The mark this role plays.
    pub fn symbol(self) -> Symbol {
        match self {
            Role::Initiator => Symbol::X,
            Role::Responder => Symbol::O,
        }
    }

    /// Who owns the first move of a fresh game, seen from this role's side.
    pub fn first_turn(self) -> TurnOwner {
        match self {
            Role::Initiator => TurnOwner::Local,
            Role::Responder => TurnOwner::Remote,
        }
    }

    /// The role the other peer runs as.
    pub fn peer(self) -> Role {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}

/// Which side may submit the next move. Role-relative: the same game moment
/// reads `Local` on one peer and `Remote` on the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOwner {
    Local,
    Remote,
}

/// Classification of the current board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    InProgress,
    Win(Symbol),
    Draw,
}

/// Rejection reasons for a local move attempt. These mirror click-guard
/// semantics: callers treat them as a no-op, not as a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IllegalMove {
    #[error("cell index out of range")]
    OutOfRange,
    #[error("not your turn")]
    NotYourTurn,
    #[error("cell is already occupied")]
    CellOccupied,
    #[error("game is over")]
    GameOver,
}

/// One peer's copy of the shared game. Each peer owns its copy exclusively;
/// the two converge through the message protocol, not shared memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    role: Role,
    board: Board,
    turn: TurnOwner,
}

impl GameState {
    /// Fresh game: empty board, first move owned by the initiator.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            board: [None; CELL_COUNT as usize],
            turn: role.first_turn(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Contents of a single cell; `None` for out-of-range indices.
    pub fn cell(&self, idx: u8) -> Option<Symbol> {
        self.board.get(idx as usize).copied().flatten()
    }

    pub fn turn(&self) -> TurnOwner {
        self.turn
    }

    pub fn outcome(&self) -> Outcome {
        outcome(&self.board)
    }

    /// Attempt a move by the local player. Succeeds only when the game is
    /// still running, it is the local side's turn and the cell is empty; on
    /// success the cell is written with this role's symbol, the turn passes
    /// to the peer and the placed symbol is returned for transmission.
    pub fn submit_local(&mut self, idx: u8) -> Result<Symbol, IllegalMove> {
        if idx >= CELL_COUNT {
            return Err(IllegalMove::OutOfRange);
        }
        if self.outcome() != Outcome::InProgress {
            return Err(IllegalMove::GameOver);
        }
        if self.turn != TurnOwner::Local {
            return Err(IllegalMove::NotYourTurn);
        }
        if self.board[idx as usize].is_some() {
            return Err(IllegalMove::CellOccupied);
        }
        let sym = self.role.symbol();
        self.board[idx as usize] = Some(sym);
        self.turn = TurnOwner::Remote;
        Ok(sym)
    }

    /// Apply a move received from the peer. The remote side is trusted: no
    /// turn or occupancy re-validation happens here (a known protocol
    /// limitation; see DESIGN.md). The index was range-checked at decode
    /// time, so the guard below only keeps a bad caller from panicking.
    /// After a remote move the turn is the local side's, unconditionally.
    pub fn apply_remote(&mut self, idx: u8, sym: Symbol) {
        if let Some(cell) = self.board.get_mut(idx as usize) {
            *cell = Some(sym);
            self.turn = TurnOwner::Local;
        }
    }

    /// Reinitialize in place: empty board, first move back to the initiator.
    pub fn reset(&mut self) {
        self.board = [None; CELL_COUNT as usize];
        self.turn = self.role.first_turn();
    }
}

/// Whether `sym` occupies all three cells of any winning line.
pub fn has_winning_line(board: &Board, sym: Symbol) -> bool {
    LINES
        .iter()
        .any(|line| line.iter().all(|&i| board[i] == Some(sym)))
}

/// Classify a board. Pure function of the cell contents: X's lines are
/// checked before O's, then a full board with no winner is a draw.
pub fn outcome(board: &Board) -> Outcome {
    for sym in [Symbol::X, Symbol::O] {
        if has_winning_line(board, sym) {
            return Outcome::Win(sym);
        }
    }
    if board.iter().all(Option::is_some) {
        Outcome::Draw
    } else {
        Outcome::InProgress
    }
}
