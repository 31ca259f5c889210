//! Terminal front-end: renders boards and turns typed lines into commands.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rand::{rngs::StdRng, SeedableRng};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::board::Coord;
use crate::config::{GameConfig, Settings};
use crate::game::{Command, LocalGame, State};
use crate::opponent::Difficulty;
use crate::rules::Conclusion;
use crate::session::{Mode, RemoteSession, SessionOptions, SessionStatus, SessionView};
use crate::store::DocumentStore;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Input {
    Cell(usize),
    NewGame(Option<Difficulty>),
    Quit,
}

/// Accepts `b2`-style coordinates, raw cell indices, `new [easy|hard]` and
/// `quit`.
pub fn parse_input(line: &str, grid_size: usize) -> Option<Input> {
    let line = line.trim();
    match line {
        "q" | "quit" | "exit" => return Some(Input::Quit),
        "new" => return Some(Input::NewGame(None)),
        _ => {}
    }
    if let Some(difficulty) = line.strip_prefix("new ") {
        return Difficulty::from_str(difficulty.trim())
            .ok()
            .map(|d| Input::NewGame(Some(d)));
    }
    if let Ok(idx) = line.parse::<usize>() {
        return (idx < grid_size * grid_size).then_some(Input::Cell(idx));
    }
    Coord::from_str(line)
        .ok()
        .and_then(|coord| coord.to_index(grid_size))
        .map(Input::Cell)
}

pub fn conclusion_text(conclusion: Conclusion) -> String {
    match conclusion {
        Conclusion::Win(player) => format!("Winner is: {player}! Thank you for playing."),
        Conclusion::Draw => "Winner is: no one! Thank you for playing.".to_string(),
    }
}

pub fn status_text(view: &SessionView) -> String {
    match &view.status {
        SessionStatus::Waiting { code } => {
            format!("Your game is waiting for players. Share this join code: {code}")
        }
        SessionStatus::YourTurn if !view.opponent_active => {
            "It is currently your turn. Your opponent seems to have left.".to_string()
        }
        SessionStatus::YourTurn => "It is currently your turn.".to_string(),
        SessionStatus::TheirTurn => "It is currently not your turn.".to_string(),
        SessionStatus::Won => "You win! Thanks for playing.".to_string(),
        SessionStatus::Lost => "You lose! Thanks for playing.".to_string(),
        SessionStatus::Draw => "DRAW! Thanks for playing.".to_string(),
        SessionStatus::Removed => "Game ended or was removed.".to_string(),
    }
}

fn stdin_lines() -> Lines<BufReader<Stdin>> {
    BufReader::new(tokio::io::stdin()).lines()
}

fn render_offline(game: &LocalGame) {
    println!("\n{}\n", game.board());
    match game.state() {
        State::AwaitingHuman => println!("Your turn: X. (difficulty: {})", game.difficulty()),
        State::AwaitingOpponent => println!("Opponent is thinking..."),
        State::Concluded(conclusion) => {
            println!("{}", conclusion_text(conclusion));
            println!("Type `new easy`, `new hard` or `quit`.");
        }
    }
}

/// Plays against the computer until the user quits or stdin closes.
pub async fn play_offline(settings: &Settings, difficulty: Difficulty) -> anyhow::Result<()> {
    let mut game = LocalGame::new(settings.grid_size, difficulty)?;
    let mut rng = StdRng::from_entropy();
    let mut lines = stdin_lines();
    let think = settings.think_delay();

    render_offline(&game);
    loop {
        let line = if game.state() == State::AwaitingOpponent {
            tokio::select! {
                _ = tokio::time::sleep(think) => {
                    game.handle(Command::OpponentReply, &mut rng)?;
                    render_offline(&game);
                    continue;
                }
                line = lines.next_line() => line?,
            }
        } else {
            lines.next_line().await?
        };
        let Some(line) = line else { return Ok(()) };

        let command = match parse_input(&line, game.board().size()) {
            Some(Input::Quit) => return Ok(()),
            Some(Input::NewGame(difficulty)) => {
                Command::NewGame(difficulty.unwrap_or(game.difficulty()))
            }
            Some(Input::Cell(idx)) => Command::ClaimCell(idx),
            None => {
                println!("Invalid input! Try again.");
                continue;
            }
        };

        match game.handle(command, &mut rng) {
            Ok(_) => render_offline(&game),
            Err(err) => println!("{err}. Try again."),
        }
    }
}

/// Plays one online game. Failures to enter the game are printed rather than
/// returned, since they are the user's to act on.
pub async fn play_online(
    store: Arc<dyn DocumentStore>,
    mode: Mode,
    config: GameConfig,
    options: SessionOptions,
) -> anyhow::Result<()> {
    let mut session = match RemoteSession::start(store, mode, &config, options).await {
        Ok(session) => session,
        Err(err) => {
            println!("Could not start game: {err}");
            return Ok(());
        }
    };
    let mut lines = stdin_lines();
    let grid_size = session.view().board.size();

    println!("You are {}.", session.mark());
    println!("\n{}\n\n{}", session.view().board, status_text(session.view()));

    loop {
        tokio::select! {
            update = session.next_update() => match update {
                Some(view) => {
                    println!("\n{}\n\n{}", view.board, status_text(&view));
                    if view.status.is_over() {
                        break;
                    }
                }
                None => {
                    println!("Game ended or was removed.");
                    break;
                }
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_input(&line, grid_size) {
                    Some(Input::Cell(idx)) => match session.attempt_move(idx).await {
                        Ok(receipt) => println!(
                            "Ping: {} ms ({:?})",
                            receipt.latency.as_millis(),
                            receipt.ping
                        ),
                        Err(err) if err.is_recoverable() => {
                            println!("{err}. Did you move out of turn?")
                        }
                        Err(err) => println!("{err}"),
                    },
                    Some(Input::Quit) => break,
                    Some(Input::NewGame(_)) => {
                        println!("Start another online game from the command line.")
                    }
                    None => println!("Invalid input! Try again."),
                }
            }
        }
    }

    // give the inactive-marker a moment before the process exits
    let _ = tokio::time::timeout(Duration::from_secs(1), session.teardown()).await;
    Ok(())
}
