use anyhow::Result;
use std::io::{self, Write};

use crate::sync::{Conflict, Decision, Resolution};

/// Ask a yes/no question on stderr.
pub(super) fn confirm(question: &str) -> Result<bool> {
    eprint!("{} [y/N] ", question);
    io::stderr().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}

/// Ask how to resolve one sync conflict, until the answer is understood.
pub(super) fn resolve(conflict: &Conflict<'_>) -> Result<Decision> {
    eprintln!(
        "problem {} changed on both sides: local `{}`, remote `{}`",
        conflict.letter, conflict.local.problem.display_name, conflict.remote.problem.display_name
    );
    loop {
        eprint!("keep [l]ocal, take [r]emote, or [L]/[R] for all remaining: ");
        io::stderr().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // stdin closed
            return Ok(Decision::once(Resolution::KeepLocal));
        }
        if let Some(decision) = parse_resolution(&input) {
            return Ok(decision);
        }
    }
}

fn parse_resolution(input: &str) -> Option<Decision> {
    match input.trim() {
        "" | "l" | "local" => Some(Decision::once(Resolution::KeepLocal)),
        "r" | "remote" => Some(Decision::once(Resolution::TakeRemote)),
        "L" => Some(Decision::always(Resolution::KeepLocal)),
        "R" => Some(Decision::always(Resolution::TakeRemote)),
        _ => None,
    }
}
