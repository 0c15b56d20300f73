//! Terminal prompts
//!
//! Questions are written to the output and answered on the input, one line
//! per answer. Invalid answers are asked again at most [`MAX_ATTEMPTS`]
//! times, after which the question counts as declined.

use rust_decimal::Decimal;
use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::warn;

use domain_billing::{Confirmation, NewUser, NewUserSource, PreparedUsers, Question};

/// Attempts allowed per question
pub const MAX_ATTEMPTS: usize = 3;

struct Terminal<R, W> {
    input: R,
    output: W,
}

/// Line-based prompt over any reader and writer
pub struct Prompt<R, W> {
    terminal: Mutex<Terminal<R, W>>,
}

impl Prompt<BufReader<Stdin>, Stdout> {
    /// Prompts on the process terminal
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            terminal: Mutex::new(Terminal { input, output }),
        }
    }

    /// Asks until `parse` accepts the answer
    ///
    /// Returns `None` on end of input or after [`MAX_ATTEMPTS`] rejected
    /// answers.
    pub fn ask<T>(&self, text: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let mut terminal = self.terminal.lock().ok()?;
        for _ in 0..MAX_ATTEMPTS {
            let answer = terminal.read_answer(text).ok()??;
            if let Some(value) = parse(answer.trim()) {
                return Some(value);
            }
            let _ = writeln!(terminal.output, "Unrecognised answer '{}'", answer.trim());
        }
        warn!(question = %text, "No valid answer given");
        None
    }
}

impl<R: BufRead, W: Write> Terminal<R, W> {
    /// One answer line, or `None` at end of input
    fn read_answer(&mut self, text: &str) -> io::Result<Option<String>> {
        write!(self.output, "{} ", text)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

fn yes_no(answer: &str) -> Option<bool> {
    match answer.to_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

fn non_empty(answer: &str) -> Option<String> {
    (!answer.is_empty()).then(|| answer.to_string())
}

fn fraction(answer: &str) -> Option<Decimal> {
    Decimal::from_str(answer)
        .ok()
        .filter(|d| *d >= Decimal::ZERO && *d <= Decimal::ONE)
}

impl<R, W> Confirmation for Prompt<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn confirm(&self, question: &Question) -> bool {
        self.ask(&format!("{} [y/n]:", question.text), yes_no)
            .unwrap_or(false)
    }
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    /// Asks for the details of a new user
    pub fn new_user(&self, last_name: Option<&str>) -> Option<NewUser> {
        let last_name = match last_name {
            Some(name) => name.to_string(),
            None => self.ask("Last name of the user:", non_empty)?,
        };
        Some(NewUser {
            first_name: self.ask(&format!("First name of {}:", last_name), non_empty)?,
            email: self.ask(&format!("Email of {}:", last_name), non_empty)?,
            staff_subsidy_fraction: self.ask(
                "Subsidy on staff hour charges (between 0 and 1; 0.5 = 50%):",
                fraction,
            )?,
            consumable_subsidy_fraction: self.ask(
                "Subsidy on consumable charges (between 0 and 1; 0.5 = 50%):",
                fraction,
            )?,
            last_name,
        })
    }
}

/// User details from the usage file, then from the operator
pub struct PromptedUsers<R, W> {
    prepared: PreparedUsers,
    prompt: Arc<Prompt<R, W>>,
}

impl<R, W> PromptedUsers<R, W> {
    pub fn new(prepared: PreparedUsers, prompt: Arc<Prompt<R, W>>) -> Self {
        Self { prepared, prompt }
    }
}

impl<R, W> NewUserSource for PromptedUsers<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn details_for(&self, last_name: &str) -> Option<NewUser> {
        self.prepared
            .details_for(last_name)
            .or_else(|| self.prompt.new_user(Some(last_name)))
    }
}
