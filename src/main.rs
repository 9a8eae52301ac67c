use clap::Parser;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use p2p_tictactoe::{
    init_logging, Board, ConnectionNegotiator, ConnectionStatus, MemoryChannel, NegotiationError,
    NegotiatorConfig, Outcome, Role, Session, SessionEvent, SessionHandle, SessionSnapshot,
    TurnOwner, CELL_COUNT, DEFAULT_REFLECTOR,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
enum Commands {
    /// Host a session: prints an offer blob to send to the other player,
    /// then waits for their answer to be pasted back in.
    Create {
        #[arg(long, default_value = "player")]
        name: String,
        #[arg(long, default_value = "0.0.0.0:0")]
        bind: String,
        #[arg(long, help = "Reflection service used for public-address discovery")]
        reflector: Option<String>,
        #[arg(long, help = "Skip public-address discovery")]
        no_reflector: bool,
    },
    /// Join a session: paste the host's offer blob, then send back the
    /// printed answer.
    Join {
        #[arg(long, default_value = "player")]
        name: String,
        #[arg(long, default_value = "0.0.0.0:0")]
        bind: String,
        #[arg(long, help = "Reflection service used for public-address discovery")]
        reflector: Option<String>,
        #[arg(long, help = "Skip public-address discovery")]
        no_reflector: bool,
    },
    /// Play both sides locally with random moves.
    Local {
        #[arg(long, help = "Fix RNG seed for reproducible games (e.g., --seed 12345)")]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Create {
            name,
            bind,
            reflector,
            no_reflector,
        } => cmd_create(name, negotiator_config(bind, reflector, no_reflector)).await,
        Commands::Join {
            name,
            bind,
            reflector,
            no_reflector,
        } => cmd_join(name, negotiator_config(bind, reflector, no_reflector)).await,
        Commands::Local { seed } => {
            println!("Starting a local session with two random players...");
            if let Some(s) = seed {
                println!("Using fixed seed: {} (game will be reproducible)", s);
            }
            let rng = if let Some(s) = seed {
                SmallRng::seed_from_u64(s)
            } else {
                let mut seed_rng = rand::rng();
                SmallRng::from_rng(&mut seed_rng)
            };
            let (a, b) = MemoryChannel::pair();
            let host = Session::spawn(Box::new(a), Role::Initiator, "alice".to_string());
            let guest = Session::spawn(Box::new(b), Role::Responder, "bob".to_string());
            run_local(rng, host, guest).await
        }
    }
}

fn negotiator_config(bind: String, reflector: Option<String>, no_reflector: bool) -> NegotiatorConfig {
    NegotiatorConfig {
        bind,
        reflector: if no_reflector {
            None
        } else {
            reflector.or_else(|| Some(DEFAULT_REFLECTOR.to_string()))
        },
        ..NegotiatorConfig::default()
    }
}

async fn cmd_create(name: String, config: NegotiatorConfig) -> anyhow::Result<()> {
    let mut negotiator = ConnectionNegotiator::new(config);
    let offer = negotiator.begin_as_initiator().await?;
    println!("Send this offer to the other player:");
    println!();
    println!("{}", offer.to_blob()?);
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let blob = read_blob_line(&mut lines, "Paste their answer here:").await?;
        match negotiator.complete_as_initiator(&blob).await {
            Ok(()) => break,
            Err(NegotiationError::Descriptor(e)) => println!("That answer did not work: {e}"),
            Err(e) => return Err(e.into()),
        }
    }

    println!("[{}]", ConnectionStatus::Negotiating);
    let channel = negotiator.wait_channel().await?;
    let handle = Session::spawn(channel, Role::Initiator, name);
    play(handle, lines).await
}

async fn cmd_join(name: String, config: NegotiatorConfig) -> anyhow::Result<()> {
    let mut negotiator = ConnectionNegotiator::new(config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let answer = loop {
        let blob = read_blob_line(&mut lines, "Paste the host's offer here:").await?;
        match negotiator.begin_as_responder(&blob).await {
            Ok(answer) => break answer,
            Err(NegotiationError::Descriptor(e)) => println!("That offer did not work: {e}"),
            Err(e) => return Err(e.into()),
        }
    };
    println!("Send this answer back to the host:");
    println!();
    println!("{}", answer.to_blob()?);
    println!();

    println!("[{}]", ConnectionStatus::Negotiating);
    let channel = negotiator.wait_channel().await?;
    let handle = Session::spawn(channel, Role::Responder, name);
    play(handle, lines).await
}

/// Prompt until a non-empty line arrives.
async fn read_blob_line(
    lines: &mut Lines<BufReader<Stdin>>,
    prompt: &str,
) -> anyhow::Result<String> {
    loop {
        println!("{prompt}");
        match lines.next_line().await? {
            None => anyhow::bail!("stdin closed"),
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => return Ok(line),
        }
    }
}

/// What one iteration of the interactive loop woke up for.
enum Turn {
    Event(Option<SessionEvent>),
    Input(Option<String>),
}

async fn play(mut handle: SessionHandle, mut lines: Lines<BufReader<Stdin>>) -> anyhow::Result<()> {
    println!(
        "Cells are numbered 1-9, row by row. Type a number to move, \
         'name <you>' to rename, 'r' to reset, 'q' to quit."
    );
    loop {
        let turn = tokio::select! {
            event = handle.next_event() => Turn::Event(event),
            line = lines.next_line() => Turn::Input(line?),
        };
        match turn {
            Turn::Event(None) | Turn::Input(None) => break,
            Turn::Event(Some(event)) => show_event(&handle, event).await?,
            Turn::Input(Some(line)) => match line.trim() {
                "" => {}
                "q" | "quit" => {
                    handle.shutdown().await;
                    break;
                }
                "r" | "reset" => handle.request_reset().await?,
                input => {
                    if let Some(name) = input.strip_prefix("name ") {
                        handle.set_name(name.trim().to_string()).await?;
                        continue;
                    }
                    let cell = input.strip_prefix("move ").unwrap_or(input).trim();
                    match cell.parse::<u8>() {
                        Ok(cell @ 1..=9) => handle.submit_move(cell - 1).await?,
                        _ => println!("Type 1-9 to move, 'r' to reset, 'q' to quit."),
                    }
                }
            },
        }
    }
    Ok(())
}

async fn show_event(handle: &SessionHandle, event: SessionEvent) -> anyhow::Result<()> {
    match event {
        SessionEvent::Status(status) => {
            println!("[{status}]");
            if status == ConnectionStatus::Connected {
                let snapshot = handle.snapshot().await?;
                print_board(&snapshot.board);
                print_turn(&snapshot);
            }
        }
        SessionEvent::IdentityChanged {
            local_name,
            remote_name,
        } => {
            let remote = remote_name.as_deref().unwrap_or("?");
            println!("{local_name} vs {remote}");
        }
        SessionEvent::LocalMoveApplied { .. }
        | SessionEvent::RemoteMoveApplied { .. }
        | SessionEvent::ResetApplied => {
            let snapshot = handle.snapshot().await?;
            print_board(&snapshot.board);
            if snapshot.outcome == Outcome::InProgress {
                print_turn(&snapshot);
            }
        }
        SessionEvent::OutcomeChanged(Outcome::Win(sym)) => println!("{sym} wins!"),
        SessionEvent::OutcomeChanged(Outcome::Draw) => println!("Draw"),
        SessionEvent::OutcomeChanged(Outcome::InProgress) => {}
    }
    Ok(())
}

fn print_turn(snapshot: &SessionSnapshot) {
    match snapshot.turn {
        TurnOwner::Local => println!("Your turn"),
        TurnOwner::Remote => println!("Opponent's turn"),
    }
}

/// Render the board with 1-9 hints in the empty cells.
fn print_board(board: &Board) {
    println!();
    for row in 0..3 {
        let cell = |col: usize| -> String {
            let idx = row * 3 + col;
            match board[idx] {
                Some(sym) => sym.to_string(),
                None => (idx + 1).to_string(),
            }
        };
        println!(" {} | {} | {}", cell(0), cell(1), cell(2));
        if row < 2 {
            println!("---+---+---");
        }
    }
    println!();
}

/// Drive two sessions to a finished game, alternating random legal moves.
async fn run_local(
    mut rng: SmallRng,
    mut host: SessionHandle,
    mut guest: SessionHandle,
) -> anyhow::Result<()> {
    println!("alice plays X, bob plays O.");
    loop {
        let snapshot = host.snapshot().await?;
        print_board(&snapshot.board);
        match snapshot.outcome {
            Outcome::Win(sym) => {
                println!("{sym} wins!");
                break;
            }
            Outcome::Draw => {
                println!("Draw");
                break;
            }
            Outcome::InProgress => {}
        }
        if snapshot.turn == TurnOwner::Local {
            submit_random(&mut rng, &host, &snapshot).await?;
            wait_remote_move(&mut guest).await?;
        } else {
            let guest_snapshot = guest.snapshot().await?;
            submit_random(&mut rng, &guest, &guest_snapshot).await?;
            wait_remote_move(&mut host).await?;
        }
    }
    host.shutdown().await;
    guest.shutdown().await;
    Ok(())
}

/// Submit a uniformly random move among the open cells.
async fn submit_random(
    rng: &mut SmallRng,
    handle: &SessionHandle,
    snapshot: &SessionSnapshot,
) -> anyhow::Result<()> {
    let open: Vec<u8> = (0..CELL_COUNT)
        .filter(|&idx| snapshot.board[idx as usize].is_none())
        .collect();
    anyhow::ensure!(!open.is_empty(), "no open cell to play");
    let idx = open[rng.random_range(0..open.len())];
    println!("{} plays cell {}", snapshot.role.symbol(), idx + 1);
    handle.submit_move(idx).await
}

/// Block until the peer's move lands on this side.
async fn wait_remote_move(handle: &mut SessionHandle) -> anyhow::Result<()> {
    while let Some(event) = handle.next_event().await {
        if matches!(event, SessionEvent::RemoteMoveApplied { .. }) {
            return Ok(());
        }
    }
    anyhow::bail!("Session ended")
}
