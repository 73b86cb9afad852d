use std::collections::VecDeque;
use crate::models::{Completion, Prompt};

pub const USER_LABEL: &str = "You";
pub const ASSISTANT_LABEL: &str = "Alice";
pub const DEFAULT_MAX_LINES: usize = 500;

// Conversation log holding the last `max_lines` lines; every push returns the line to display
#[derive(Debug)]
pub struct Transcript {
    lines: VecDeque<String>,
    max_lines: usize,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::with_max_lines(DEFAULT_MAX_LINES)
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_lines(max_lines: usize) -> Self {
        let max_lines = max_lines.max(1);
        Self {
            lines: VecDeque::with_capacity(max_lines.min(64)),
            max_lines,
        }
    }

    pub fn push_prompt(&mut self, prompt: &Prompt) -> &str {
        self.push(format!("{}: {}", USER_LABEL, prompt))
    }

    pub fn push_completion(&mut self, completion: &Completion) -> &str {
        self.push(format!("{}: {}", ASSISTANT_LABEL, completion.response))
    }

    pub fn push_info(&mut self, message: &str) -> &str {
        self.push(format!("[Info] {}", message))
    }

    // The last `n` lines, oldest first
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &str> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn push(&mut self, line: String) -> &str {
        if self.lines.len() == self.max_lines {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        // just pushed, never empty
        self.lines.back().map(String::as_str).unwrap_or_default()
    }
}
