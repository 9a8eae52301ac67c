use p2p_tictactoe::game::{
    has_winning_line, outcome, Board, GameState, Outcome, Role, Symbol, TurnOwner, CELL_COUNT,
};
use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Drive two mirrored copies through random legal play, pushing each local
/// move into the other side as a remote one. Stops after `cap` moves or
/// when the game ends, whichever comes first.
fn play_random_game(seed: u64, cap: u8) -> (GameState, GameState, u8) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut initiator = GameState::new(Role::Initiator);
    let mut responder = GameState::new(Role::Responder);
    let mut moves = 0;
    while initiator.outcome() == Outcome::InProgress && moves < cap {
        let (mover, watcher) = if initiator.turn() == TurnOwner::Local {
            (&mut initiator, &mut responder)
        } else {
            (&mut responder, &mut initiator)
        };
        let open: Vec<u8> = (0..CELL_COUNT).filter(|&i| mover.cell(i).is_none()).collect();
        let idx = open[rng.random_range(0..open.len())];
        let sym = mover.submit_local(idx).expect("picked a legal move");
        watcher.apply_remote(idx, sym);
        moves += 1;
    }
    (initiator, responder, moves)
}

/// A board with arbitrary cell contents, legal position or not.
fn random_board(seed: u64) -> Board {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut board = [None; CELL_COUNT as usize];
    for cell in board.iter_mut() {
        *cell = match rng.random_range(0..3) {
            0 => None,
            1 => Some(Symbol::X),
            _ => Some(Symbol::O),
        };
    }
    board
}

fn count(board: &Board, sym: Symbol) -> usize {
    board.iter().filter(|&&cell| cell == Some(sym)).count()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Random play always terminates, and both peers' copies agree on
    /// everything observable when it does.
    #[test]
    fn prop_random_games_terminate_and_converge(seed in any::<u64>()) {
        let (initiator, responder, moves) = play_random_game(seed, CELL_COUNT);

        prop_assert!(moves <= CELL_COUNT);
        prop_assert_eq!(initiator.board(), responder.board());
        prop_assert_eq!(initiator.outcome(), responder.outcome());
        prop_assert!(initiator.outcome() != Outcome::InProgress);
        // The sides never agree on whose turn it is, only on the board.
        prop_assert!(initiator.turn() != responder.turn());

        // X opened the game, so it is never behind and at most one ahead.
        let x = count(initiator.board(), Symbol::X);
        let o = count(initiator.board(), Symbol::O);
        prop_assert!(x == o || x == o + 1);
    }

    /// Board classification commits to exactly one verdict and honors the
    /// X-before-O check order.
    #[test]
    fn prop_outcome_classification_is_consistent(seed in any::<u64>()) {
        let board = random_board(seed);
        let full = board.iter().all(Option::is_some);
        match outcome(&board) {
            Outcome::Win(Symbol::X) => prop_assert!(has_winning_line(&board, Symbol::X)),
            Outcome::Win(Symbol::O) => {
                prop_assert!(has_winning_line(&board, Symbol::O));
                // O can only be the verdict when X holds no line.
                prop_assert!(!has_winning_line(&board, Symbol::X));
            }
            Outcome::Draw => {
                prop_assert!(full);
                prop_assert!(!has_winning_line(&board, Symbol::X));
                prop_assert!(!has_winning_line(&board, Symbol::O));
            }
            Outcome::InProgress => {
                prop_assert!(!full);
                prop_assert!(!has_winning_line(&board, Symbol::X));
                prop_assert!(!has_winning_line(&board, Symbol::O));
            }
        }
    }

    /// A rejected submission is a strict no-op; an accepted one was legal
    /// in every respect.
    #[test]
    fn prop_rejected_submissions_change_nothing(
        seed in any::<u64>(),
        depth in 0u8..9,
        idx in any::<u8>(),
    ) {
        let (mut game, _, _) = play_random_game(seed, depth);
        let before = game.clone();
        if game.submit_local(idx).is_err() {
            prop_assert_eq!(game, before);
        } else {
            prop_assert!(idx < CELL_COUNT);
            prop_assert_eq!(before.turn(), TurnOwner::Local);
            prop_assert_eq!(before.cell(idx), None);
            prop_assert_eq!(before.outcome(), Outcome::InProgress);
            prop_assert_eq!(game.cell(idx), Some(Symbol::X));
            prop_assert_eq!(game.turn(), TurnOwner::Remote);
        }
    }

    /// However a remote move lands, the turn comes back to the local side.
    #[test]
    fn prop_remote_moves_hand_the_turn_over(
        seed in any::<u64>(),
        depth in 0u8..9,
        idx in 0u8..9,
    ) {
        let (_, mut game, _) = play_random_game(seed, depth);
        game.apply_remote(idx, Symbol::X);
        prop_assert_eq!(game.turn(), TurnOwner::Local);
        prop_assert_eq!(game.cell(idx), Some(Symbol::X));
    }
}
