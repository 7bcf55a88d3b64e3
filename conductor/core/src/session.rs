//! Conversation Context
//!
//! The ordered history of turns the conductor sends along with each request.
//!
//! # Design Philosophy
//!
//! The context is owned by the conductor, not by any provider. Providers that
//! keep their own chat session compare it against this history and rebuild it
//! when the two diverge. Eviction is oldest-first and counted in turns: one turn
//! is a user/assistant pair, so `max_turns` turns keep `2 * max_turns` messages.

use crate::messages::Message;

/// Conversation history with turn-based eviction
#[derive(Clone, Debug, Default)]
pub struct ConversationContext {
    messages: Vec<Message>,
    /// Maximum number of turns to keep (0 = unlimited)
    max_turns: usize,
}

impl ConversationContext {
    /// Create an empty context keeping at most `max_turns` turns
    #[must_use]
    pub fn new(max_turns: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_turns,
        }
    }

    /// Messages in turn order
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages held
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether no messages are held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Configured turn limit
    #[must_use]
    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Change the turn limit, evicting immediately if needed
    pub fn set_max_turns(&mut self, max_turns: usize) {
        self.max_turns = max_turns;
        self.evict();
    }

    /// Append a single message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.evict();
    }

    /// Append a completed user/assistant exchange
    pub fn push_exchange(&mut self, user: Message, assistant: Message) {
        self.messages.push(user);
        self.messages.push(assistant);
        self.evict();
    }

    /// Drop all history
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn evict(&mut self) {
        if self.max_turns == 0 {
            return;
        }
        let limit = self.max_turns * 2;
        if self.messages.len() > limit {
            let excess = self.messages.len() - limit;
            self.messages.drain(..excess);
            tracing::debug!(evicted = excess, "Evicted oldest context messages");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageRole;

    #[test]
    fn test_push_exchange_keeps_order() {
        let mut ctx = ConversationContext::new(10);
        ctx.push_exchange(Message::user("q1"), Message::assistant("a1"));
        ctx.push_exchange(Message::user("q2"), Message::assistant("a2"));

        let contents: Vec<_> = ctx.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2", "a2"]);
    }

    #[test]
    fn test_eviction_is_oldest_first() {
        let mut ctx = ConversationContext::new(2);
        for i in 0..3 {
            ctx.push_exchange(
                Message::user(format!("q{i}")),
                Message::assistant(format!("a{i}")),
            );
        }

        assert_eq!(ctx.len(), 4);
        assert_eq!(ctx.messages()[0].content, "q1");
        assert_eq!(ctx.messages()[0].role, MessageRole::User);
        assert_eq!(ctx.messages()[3].content, "a2");
    }

    #[test]
    fn test_unlimited_context() {
        let mut ctx = ConversationContext::new(0);
        for i in 0..50 {
            ctx.push(Message::user(format!("m{i}")));
        }
        assert_eq!(ctx.len(), 50);
    }

    #[test]
    fn test_shrinking_limit_evicts() {
        let mut ctx = ConversationContext::new(5);
        for i in 0..5 {
            ctx.push_exchange(Message::user(format!("q{i}")), Message::assistant("a"));
        }
        ctx.set_max_turns(1);
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.messages()[0].content, "q4");
    }

    #[test]
    fn test_clear() {
        let mut ctx = ConversationContext::new(3);
        ctx.push_exchange(Message::user("q"), Message::assistant("a"));
        ctx.clear();
        assert!(ctx.is_empty());
    }
}
