//! Interactive decisions.
//!
//! The orchestrator never reads the terminal itself. It asks a `Prompter`,
//! so the CLI can wire in stdin/stdout while tests and unattended runs
//! supply answers up front.

use crate::error::EngineError;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// Source of yes/no decisions and free-text answers.
pub trait Prompter {
    /// Ask a yes/no question. Implementations keep asking until they get a
    /// recognized answer.
    fn confirm(&mut self, question: &str) -> Result<bool, EngineError>;

    /// Ask for a line of text, returned without surrounding whitespace.
    fn ask(&mut self, question: &str) -> Result<String, EngineError>;
}

/// Interpret a yes/no answer. `None` means "ask again".
pub fn parse_yes_no(answer: &str) -> Option<bool> {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Prompter reading answers line by line from `input` and writing
/// questions to `output`.
pub struct TerminalPrompter<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompter<io::StdinLock<'static>, io::Stdout> {
    /// Prompter on the process's stdin and stdout.
    pub fn stdio() -> Self {
        TerminalPrompter::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        TerminalPrompter { input, output }
    }

    /// Give back the output sink, e.g. to inspect what was printed.
    pub fn into_output(self) -> W {
        self.output
    }

    fn say(&mut self, text: &str) -> Result<(), EngineError> {
        writeln!(self.output, "{}", text)
            .and_then(|_| self.output.flush())
            .map_err(|e| EngineError::PromptFailed {
                reason: e.to_string(),
            })
    }

    fn read_answer(&mut self) -> Result<String, EngineError> {
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .map_err(|e| EngineError::PromptFailed {
                reason: e.to_string(),
            })?;
        if read == 0 {
            return Err(EngineError::PromptFailed {
                reason: "input closed before an answer was given".to_string(),
            });
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead, W: Write> Prompter for TerminalPrompter<R, W> {
    fn confirm(&mut self, question: &str) -> Result<bool, EngineError> {
        self.say(question)?;
        loop {
            let answer = self.read_answer()?;
            match parse_yes_no(&answer) {
                Some(decision) => return Ok(decision),
                None => self.say("Incorrect input. Please enter Y or N")?,
            }
        }
    }

    fn ask(&mut self, question: &str) -> Result<String, EngineError> {
        self.say(question)?;
        self.read_answer()
    }
}

/// Prompter replaying canned answers in order.
///
/// Every question asked is recorded. Unrecognized yes/no answers are consumed
/// and the next one is tried, exactly as a person re-typing would. Running out
/// of answers is a `PromptFailed` error.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    questions: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedPrompter {
            answers: answers.into_iter().map(Into::into).collect(),
            questions: Vec::new(),
        }
    }

    /// Questions asked so far, in order.
    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    fn next_answer(&mut self, question: &str) -> Result<String, EngineError> {
        self.answers.pop_front().ok_or_else(|| EngineError::PromptFailed {
            reason: format!("no scripted answer for: {}", question),
        })
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&mut self, question: &str) -> Result<bool, EngineError> {
        self.questions.push(question.to_string());
        loop {
            let answer = self.next_answer(question)?;
            if let Some(decision) = parse_yes_no(&answer) {
                return Ok(decision);
            }
        }
    }

    fn ask(&mut self, question: &str) -> Result<String, EngineError> {
        self.questions.push(question.to_string());
        Ok(self.next_answer(question)?.trim().to_string())
    }
}
