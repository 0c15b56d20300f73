//! Operator confirmation port
//!
//! The engine never creates users or projects, nor overwrites documents,
//! without a yes from the operator. Some questions guard against input
//! mistakes that only a human can judge and are never answered
//! automatically.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::info;

/// A yes/no question put to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub text: String,
    /// Whether an auto-confirm mode may answer yes on the operator's behalf
    pub may_auto_answer: bool,
}

impl Question {
    /// A question auto-confirm mode may answer
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            may_auto_answer: true,
        }
    }

    /// A question that always needs a human answer
    pub fn always_ask(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            may_auto_answer: false,
        }
    }
}

/// Source of yes/no answers
pub trait Confirmation: Send + Sync {
    /// Returns true for yes
    fn confirm(&self, question: &Question) -> bool;
}

impl<T: Confirmation + ?Sized> Confirmation for Arc<T> {
    fn confirm(&self, question: &Question) -> bool {
        (**self).confirm(question)
    }
}

/// Answers yes to every question that allows it; delegates the rest
#[derive(Debug, Default)]
pub struct AutoConfirm<F = AlwaysDecline> {
    fallback: F,
}

impl<F: Confirmation> AutoConfirm<F> {
    /// Auto-confirm with a fallback for questions that must be asked
    pub fn new(fallback: F) -> Self {
        Self { fallback }
    }
}

impl<F: Confirmation> Confirmation for AutoConfirm<F> {
    fn confirm(&self, question: &Question) -> bool {
        if question.may_auto_answer {
            info!(question = %question.text, "Answering yes automatically");
            true
        } else {
            self.fallback.confirm(question)
        }
    }
}

/// Answers no to everything
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysDecline;

impl Confirmation for AlwaysDecline {
    fn confirm(&self, _question: &Question) -> bool {
        false
    }
}

/// Replays a fixed list of answers and records the questions asked
///
/// Once the script runs out every further question is declined.
#[derive(Debug, Default)]
pub struct ScriptedConfirmation {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<Question>>,
}

impl ScriptedConfirmation {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Questions asked so far, in order
    pub fn asked(&self) -> Vec<Question> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl Confirmation for ScriptedConfirmation {
    fn confirm(&self, question: &Question) -> bool {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(question.clone());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front())
            .unwrap_or(false)
    }
}
