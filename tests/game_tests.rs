use p2p_tictactoe::game::{
    has_winning_line, outcome, Board, GameState, IllegalMove, Outcome, Role, Symbol, TurnOwner,
    CELL_COUNT,
};

const X: Option<Symbol> = Some(Symbol::X);
const O: Option<Symbol> = Some(Symbol::O);
const E: Option<Symbol> = None;

#[test]
fn test_role_assignments() {
    assert_eq!(Role::Initiator.symbol(), Symbol::X);
    assert_eq!(Role::Responder.symbol(), Symbol::O);
    assert_eq!(Role::Initiator.first_turn(), TurnOwner::Local);
    assert_eq!(Role::Responder.first_turn(), TurnOwner::Remote);
    assert_eq!(Role::Initiator.peer(), Role::Responder);
    assert_eq!(Role::Responder.peer(), Role::Initiator);
    assert_eq!(Symbol::X.opponent(), Symbol::O);
    assert_eq!(Symbol::O.opponent(), Symbol::X);
}

#[test]
fn test_fresh_game() {
    let game = GameState::new(Role::Initiator);
    assert_eq!(game.role(), Role::Initiator);
    assert_eq!(game.turn(), TurnOwner::Local);
    assert_eq!(game.outcome(), Outcome::InProgress);
    assert!(game.board().iter().all(Option::is_none));

    // The responder sees the same moment from the other side.
    let game = GameState::new(Role::Responder);
    assert_eq!(game.turn(), TurnOwner::Remote);
}

#[test]
fn test_submit_local_success() {
    let mut game = GameState::new(Role::Initiator);
    let sym = game.submit_local(4).unwrap();
    assert_eq!(sym, Symbol::X);
    assert_eq!(game.cell(4), Some(Symbol::X));
    assert_eq!(game.turn(), TurnOwner::Remote);
}

#[test]
fn test_submit_local_guards() {
    // Out of range, regardless of whose turn it is.
    let mut game = GameState::new(Role::Initiator);
    assert_eq!(game.submit_local(CELL_COUNT), Err(IllegalMove::OutOfRange));
    assert_eq!(game.submit_local(255), Err(IllegalMove::OutOfRange));

    // Not this side's turn.
    let mut game = GameState::new(Role::Responder);
    assert_eq!(game.submit_local(0), Err(IllegalMove::NotYourTurn));

    // Cell already taken.
    let mut game = GameState::new(Role::Responder);
    game.apply_remote(4, Symbol::X);
    assert_eq!(game.submit_local(4), Err(IllegalMove::CellOccupied));

    // Game already decided.
    let mut game = GameState::new(Role::Initiator);
    game.submit_local(0).unwrap();
    game.apply_remote(3, Symbol::O);
    game.submit_local(1).unwrap();
    game.apply_remote(4, Symbol::O);
    game.submit_local(2).unwrap();
    assert_eq!(game.outcome(), Outcome::Win(Symbol::X));
    game.apply_remote(5, Symbol::O);
    assert_eq!(game.submit_local(8), Err(IllegalMove::GameOver));
}

#[test]
fn test_rejected_submit_changes_nothing() {
    let mut game = GameState::new(Role::Responder);
    let before = game.clone();
    assert!(game.submit_local(0).is_err());
    assert_eq!(game, before);
}

#[test]
fn test_apply_remote_sets_cell_and_turn() {
    let mut game = GameState::new(Role::Responder);
    game.apply_remote(0, Symbol::X);
    assert_eq!(game.cell(0), Some(Symbol::X));
    assert_eq!(game.turn(), TurnOwner::Local);
}

#[test]
fn test_apply_remote_out_of_range_is_noop() {
    let mut game = GameState::new(Role::Responder);
    let before = game.clone();
    game.apply_remote(CELL_COUNT, Symbol::X);
    game.apply_remote(255, Symbol::O);
    assert_eq!(game, before);
}

#[test]
fn test_winning_lines() {
    // One win per line shape: row, column, each diagonal.
    let row: Board = [X, X, X, O, O, E, E, E, E];
    assert!(has_winning_line(&row, Symbol::X));
    assert!(!has_winning_line(&row, Symbol::O));

    let column: Board = [O, X, E, O, X, E, O, E, E];
    assert_eq!(outcome(&column), Outcome::Win(Symbol::O));

    let diagonal: Board = [X, O, E, O, X, E, E, E, X];
    assert_eq!(outcome(&diagonal), Outcome::Win(Symbol::X));

    let anti_diagonal: Board = [X, X, O, E, O, E, O, E, X];
    assert_eq!(outcome(&anti_diagonal), Outcome::Win(Symbol::O));
}

#[test]
fn test_outcome_prefers_x_when_both_have_lines() {
    // Unreachable through legal play, but classification must still be
    // deterministic: X's lines are checked first.
    let board: Board = [X, X, X, O, O, O, E, E, E];
    assert_eq!(outcome(&board), Outcome::Win(Symbol::X));
}

#[test]
fn test_outcome_draw_and_in_progress() {
    let draw: Board = [X, O, X, X, O, O, O, X, X];
    assert_eq!(outcome(&draw), Outcome::Draw);

    let running: Board = [X, O, E, E, E, E, E, E, E];
    assert_eq!(outcome(&running), Outcome::InProgress);

    let empty: Board = [E; 9];
    assert_eq!(outcome(&empty), Outcome::InProgress);
}

#[test]
fn test_reset_clears_board_and_restores_first_turn() {
    let mut game = GameState::new(Role::Responder);
    game.apply_remote(0, Symbol::X);
    game.submit_local(4).unwrap();
    game.reset();
    assert!(game.board().iter().all(Option::is_none));
    assert_eq!(game.turn(), TurnOwner::Remote);
    assert_eq!(game.outcome(), Outcome::InProgress);

    // The initiator side comes back owning the first move.
    let mut game = GameState::new(Role::Initiator);
    game.submit_local(0).unwrap();
    game.reset();
    assert_eq!(game.turn(), TurnOwner::Local);
    game.submit_local(0).unwrap();
}

#[test]
fn test_mirrored_states_converge() {
    // Drive both peers' copies through a full game, feeding each local
    // move into the other side as a remote one.
    let mut a = GameState::new(Role::Initiator);
    let mut b = GameState::new(Role::Responder);

    let script: [(u8, Role); 5] = [
        (0, Role::Initiator),
        (3, Role::Responder),
        (1, Role::Initiator),
        (4, Role::Responder),
        (2, Role::Initiator),
    ];
    for (idx, mover) in script {
        let (from, to) = match mover {
            Role::Initiator => (&mut a, &mut b),
            Role::Responder => (&mut b, &mut a),
        };
        let sym = from.submit_local(idx).unwrap();
        assert_eq!(sym, mover.symbol());
        to.apply_remote(idx, sym);
        assert_eq!(from.board(), to.board());
    }

    assert_eq!(a.outcome(), Outcome::Win(Symbol::X));
    assert_eq!(b.outcome(), Outcome::Win(Symbol::X));
    assert_eq!(a.submit_local(8), Err(IllegalMove::GameOver));
    assert_eq!(b.submit_local(8), Err(IllegalMove::GameOver));
}
