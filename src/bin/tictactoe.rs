//! Tic-Tac-Toe terminal client
//!
//! Creates or joins a room on the relay and plays from stdin.

use std::io::BufRead;

use anyhow::{bail, Result};
use pico_args::Arguments;
use tokio::sync::mpsc;

use tictactoe::{
    config::ClientConfig,
    game::{Outcome, Role},
    logging,
    network::{join_room, DriverExit, LocalInput, RoomToken, SessionView},
};

const HELP: &str = "\
Play tic-tac-toe against another terminal through a relay

USAGE:
  tictactoe --create
  tictactoe --room TOKEN
  tictactoe --join TOKEN

OPTIONS:
  --create            Create a room with a random token (you play X)
  --room    TOKEN     Create a room with the given token (you play X)
  --join    TOKEN     Join an existing room (you play O)
  --relay   URL       Relay endpoint  [default: env TICTACTOE_RELAY_URL or ws://127.0.0.1:8080/ws]

FLAGS:
  -h, --help          Print help information

INPUT:
  0-8                 Claim a cell (row-major, top left is 0)
  r                   Start a new round once the current one is over
  q                   Leave the room
";

fn parse_line(line: &str) -> Option<LocalInput> {
    match line.trim() {
        "r" | "R" => Some(LocalInput::Restart),
        other => other.parse().ok().map(LocalInput::Move),
    }
}

fn render(view: &SessionView) {
    println!();
    println!("{}", view.board);
    if let Some(line) = view.board.winning_line() {
        println!("Line: {:?}", line);
    }
    println!("{}", view.status);
    if view.phase.is_live() && view.outcome == Outcome::InProgress {
        println!("{}", view.turn);
    }
    if view.can_restart {
        println!("Type r to play again.");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }

    let create = pargs.contains("--create");
    let room: Option<RoomToken> = pargs.opt_value_from_str("--room")?;
    let join: Option<RoomToken> = pargs.opt_value_from_str("--join")?;
    let relay: Option<String> = pargs.opt_value_from_str("--relay")?;

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        bail!("unexpected arguments: {:?}", remaining);
    }

    let (room, role) = match (create, room, join) {
        (true, None, None) => (RoomToken::random(), Role::First),
        (false, Some(room), None) => (room, Role::First),
        (false, None, Some(room)) => (room, Role::Second),
        _ => bail!("pass exactly one of --create, --room or --join (see --help)"),
    };

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = relay {
        config = config.with_relay_url(url)?;
    }

    logging::init("warn");

    if role == Role::First {
        println!("Room {}: share this token with your opponent.", room);
    }

    // Blocking stdin reader; dropping the sender ends the session.
    let (input_tx, inputs) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().eq_ignore_ascii_case("q") {
                break;
            }
            match parse_line(&line) {
                Some(input) => {
                    if input_tx.blocking_send(input).is_err() {
                        break;
                    }
                }
                None => eprintln!("Enter 0-8, r or q"),
            }
        }
    });

    let mut observer = |view: &SessionView| render(view);
    let (exit, view) = join_room(&config, room, role, inputs, &mut observer).await;

    match exit {
        DriverExit::Terminal => println!("{}", view.status),
        DriverExit::UserLeft => println!("Left the room."),
        DriverExit::ChannelEnded => println!("Connection ended."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("4\n"), Some(LocalInput::Move(4)));
        assert_eq!(parse_line(" r "), Some(LocalInput::Restart));
        assert_eq!(parse_line("12"), Some(LocalInput::Move(12)));
        assert_eq!(parse_line("x"), None);
    }
}
