use std::fmt::Write as _;
use std::time::Duration;

use thiserror::Error;

use crate::error::DisplayPolicy;
use crate::model::{VoteButton, VoteButtonState, VoteKind};
use crate::operations::PollOperations;
use crate::ranking::RankedView;
use crate::util::{unescape_markup, votes_label};

pub const HELP: &str = "Commands:
  add <name>      add a lunch place
  vote <n|id>     vote for the place at position n, or by id
  list            show the current ranking
  json            print the current ranking as JSON
  connect         retry the database connection
  help            show this message
  quit            leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(String),
    Vote(String),
    List,
    Json,
    Reconnect,
    Help,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("")]
    Empty,

    #[error("Unknown command {0:?}, type `help` for the list")]
    UnknownCommand(String),

    #[error("Usage: {0}")]
    MissingArgument(&'static str),
}

pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_lowercase().as_str() {
        "" => Err(ParseError::Empty),
        "add" | "a" if rest.is_empty() => Err(ParseError::MissingArgument("add <name>")),
        "add" | "a" => Ok(Command::Add(rest.to_owned())),
        "vote" | "v" if rest.is_empty() => Err(ParseError::MissingArgument("vote <n|id>")),
        "vote" | "v" => Ok(Command::Vote(rest.to_owned())),
        "list" | "ls" | "l" => Ok(Command::List),
        "json" => Ok(Command::Json),
        "connect" | "reconnect" => Ok(Command::Reconnect),
        "help" | "h" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        _ => Err(ParseError::UnknownCommand(word.to_owned())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Info(String),
    Error { message: String, policy: DisplayPolicy },
}

impl Reply {
    fn error(message: String, policy: DisplayPolicy) -> Option<Reply> {
        match policy {
            DisplayPolicy::Silent => {
                debug!("Suppressed: {}", message);
                None
            }
            policy => Some(Reply::Error { message, policy }),
        }
    }
}

/// Maps a vote argument to a place id: a 1-based position in the current
/// ranking, otherwise the argument itself.
fn resolve_target(view: &RankedView, target: &str) -> String {
    match target.parse::<usize>() {
        Ok(n) if n >= 1 && n <= view.places.len() => view.places[n - 1].id.clone(),
        _ => target.to_owned(),
    }
}

/// Runs one command against the poll. `Quit` and `Reconnect` are left to
/// the caller and produce no reply.
pub async fn execute<O>(ops: &O, command: Command, error_window: Duration) -> Option<Reply>
where
    O: PollOperations + ?Sized,
{
    match command {
        Command::Add(name) => match ops.add_place(&name).await {
            Ok(_) => Some(Reply::Info(format!("Successfully added: {}", name.trim()))),
            Err(e) => Reply::error(e.to_string(), e.kind().display_policy(error_window)),
        },
        Command::Vote(target) => {
            let place_id = resolve_target(&ops.ranked_view(), &target);
            match ops.vote(&place_id).await {
                Ok(outcome) => {
                    let name = unescape_markup(&outcome.place_name);
                    let text = match outcome.kind {
                        VoteKind::FirstVote => format!("Voted for: {}", name),
                        VoteKind::ChangedVote => format!("Changed to: {}", name),
                    };
                    Some(Reply::Info(text))
                }
                Err(e) => Reply::error(e.to_string(), e.kind().display_policy(error_window)),
            }
        }
        Command::List => Some(Reply::Info(render_view(ops, &ops.ranked_view()))),
        Command::Json => match serde_json::to_string_pretty(&ops.ranked_view()) {
            Ok(json) => Some(Reply::Info(json)),
            Err(e) => {
                error!("Failed to serialize ranked view: {}", e);
                None
            }
        },
        Command::Help => Some(Reply::Info(HELP.to_owned())),
        Command::Reconnect | Command::Quit => None,
    }
}

fn button_label(state: VoteButtonState) -> &'static str {
    if state.in_progress {
        return "Voting...";
    }
    match state.button {
        VoteButton::Voted => "✓ Your Vote",
        VoteButton::ChangeVote => "Change Vote",
        VoteButton::Vote => "Vote",
    }
}

pub fn render_view<O>(ops: &O, view: &RankedView) -> String
where
    O: PollOperations + ?Sized,
{
    if view.is_empty() {
        return "No lunch places yet. Add one with `add <name>`.".to_owned();
    }

    let mut out = String::new();
    if let (Some(headline), Some(stats)) = (view.leadership.headline(), view.leadership.stats()) {
        let _ = writeln!(out, "🏆 {}", unescape_markup(&headline));
        let _ = writeln!(out, "   {}", stats);
    }
    for (i, place) in view.places.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>2}. {} ({}) [{}]",
            i + 1,
            unescape_markup(&place.name),
            votes_label(place.vote_count),
            button_label(ops.button_state(&place.id)),
        );
    }
    out.trim_end().to_owned()
}
