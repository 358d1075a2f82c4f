//! Stdin prompts for one-shot commands.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;

pub(crate) fn line(label: &str) -> Result<String> {
    eprint!("{label}");
    io::stderr().flush().ok();
    let mut input = String::new();
    io::stdin()
        .lock()
        .read_line(&mut input)
        .context("read from stdin")?;
    Ok(input.trim().to_string())
}

/// Ask before a destructive call. `assume_yes` skips the prompt.
pub(crate) fn confirm(question: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    if !io::stdin().is_terminal() {
        anyhow::bail!("refusing to prompt without a terminal; pass --yes to confirm");
    }
    let answer = line(&format!("{question} [y/N] "))?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Read a line without echo when stdin is a terminal.
pub(crate) fn password(label: &str) -> Result<String> {
    if !io::stdin().is_terminal() {
        return line(label);
    }
    eprint!("{label}");
    io::stderr().flush().ok();
    terminal::enable_raw_mode().context("enable raw mode")?;
    let result = read_hidden();
    terminal::disable_raw_mode().ok();
    eprintln!();
    result
}

fn read_hidden() -> Result<String> {
    let mut out = String::new();
    loop {
        let Event::Key(key) = event::read().context("read key")? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(out),
            KeyCode::Backspace => {
                out.pop();
            }
            KeyCode::Esc => anyhow::bail!("login cancelled"),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                anyhow::bail!("login cancelled")
            }
            KeyCode::Char(c) => out.push(c),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("yep"));
    }

    #[test]
    fn assume_yes_skips_prompt() {
        assert!(confirm("delete everything?", true).unwrap());
    }
}
