//! Line-based prompts for the interactive config flows.

use std::io::{self, BufRead, IsTerminal, Write};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

pub fn is_interactive() -> bool {
    io::stdin().is_terminal() && io::stdout().is_terminal()
}

fn read_line() -> io::Result<String> {
    let mut input = String::new();
    let read = io::stdin().lock().read_line(&mut input)?;
    if read == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "input closed",
        ));
    }
    Ok(input.trim().to_string())
}

/// Asks for a value; an empty answer yields `default` (or an empty string).
pub fn ask(question: &str, default: Option<&str>) -> io::Result<String> {
    match default {
        Some(d) if !d.is_empty() => print!("{question} [{d}]: "),
        _ => print!("{question}: "),
    }
    io::stdout().flush()?;

    let answer = read_line()?;
    if answer.is_empty() {
        Ok(default.unwrap_or_default().to_string())
    } else {
        Ok(answer)
    }
}

pub fn confirm(question: &str, default: bool) -> io::Result<bool> {
    let hint = if default { "Y/n" } else { "y/N" };
    print!("{question} [{hint}] ");
    io::stdout().flush()?;

    Ok(parse_yes_no(&read_line()?).unwrap_or(default))
}

fn parse_yes_no(answer: &str) -> Option<bool> {
    match answer.to_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Numbered menu. Returns the zero-based choice, or `None` on an empty answer.
pub fn choose(question: &str, options: &[String]) -> io::Result<Option<usize>> {
    for (i, option) in options.iter().enumerate() {
        println!("  {}) {option}", i + 1);
    }
    loop {
        let answer = ask(question, None)?;
        if answer.is_empty() {
            return Ok(None);
        }
        match parse_choice(&answer, options.len()) {
            Some(index) => return Ok(Some(index)),
            None => println!("Enter a number between 1 and {}.", options.len()),
        }
    }
}

fn parse_choice(answer: &str, count: usize) -> Option<usize> {
    answer
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=count).contains(n))
        .map(|n| n - 1)
}

/// Reads a value without echoing it. Ctrl+C or Esc aborts.
pub fn ask_secret(question: &str) -> io::Result<String> {
    print!("{question}: ");
    io::stdout().flush()?;

    enable_raw_mode()?;
    let result = read_hidden();
    disable_raw_mode()?;
    println!();
    result
}

fn read_hidden() -> io::Result<String> {
    let mut secret = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(secret),
            KeyCode::Esc => return Err(io::Error::new(io::ErrorKind::Interrupted, "cancelled")),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "cancelled"));
            }
            KeyCode::Backspace => {
                secret.pop();
            }
            KeyCode::Char(c) => secret.push(c),
            _ => {}
        }
    }
}
