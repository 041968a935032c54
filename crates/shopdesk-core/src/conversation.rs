//! Bounded conversation history.
//!
//! A [`ConversationWindow`] keeps the most recent completed turns of one
//! session, oldest first. When full, pushing a new turn evicts the oldest.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Number of completed turns retained per session when not configured.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// One completed user question and the final answer given for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// FIFO window over the last `capacity` turns.
#[derive(Debug, Clone)]
pub struct ConversationWindow {
    turns: VecDeque<Turn>,
    capacity: usize,
}

impl ConversationWindow {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a completed turn, evicting the oldest if the window is full.
    pub fn push(&mut self, turn: Turn) {
        if self.turns.len() == self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Turns oldest first.
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

impl Default for ConversationWindow {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = ConversationWindow::default();
        for i in 1..=11 {
            window.push(Turn::new(format!("q{}", i), format!("a{}", i)));
        }
        assert_eq!(window.len(), 10);
        let first = window.turns().next().unwrap();
        assert_eq!(first.question, "q2");
        let last = window.turns().last().unwrap();
        assert_eq!(last.answer, "a11");
    }

    #[test]
    fn test_window_preserves_order() {
        let mut window = ConversationWindow::new(3);
        window.push(Turn::new("a", "1"));
        window.push(Turn::new("b", "2"));
        let qs: Vec<&str> = window.turns().map(|t| t.question.as_str()).collect();
        assert_eq!(qs, vec!["a", "b"]);
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut window = ConversationWindow::new(0);
        window.push(Turn::new("a", "1"));
        window.push(Turn::new("b", "2"));
        assert_eq!(window.len(), 1);
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.turns().next().unwrap().question, "b");
    }
}
