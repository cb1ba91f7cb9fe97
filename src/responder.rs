//! Pattern-triggered one-shot responders

use crate::bot::Bot;
use crate::error::{BotError, Result};
use crate::types::MessageEvent;
use futures::future::BoxFuture;
use regex::Regex;
use std::future::Future;
use std::sync::Arc;

/// Handler invoked when a responder's pattern matches
pub type ResponderHandler = Arc<dyn Fn(Bot, MessageEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// A pattern plus the handler to run on match
///
/// Whether a responder is direct (only messages addressed to the bot) or
/// indirect (every visible message) is decided by which list it is
/// registered in on the `BotBuilder`.
#[derive(Clone)]
pub struct Responder {
    pattern: Regex,
    usage: String,
    handler: ResponderHandler,
}

impl Responder {
    /// Create a responder from a pattern string
    ///
    /// Fails with `BotError::Config` if the pattern does not compile.
    pub fn new<F, Fut>(pattern: &str, usage: impl Into<String>, handler: F) -> Result<Self>
    where
        F: Fn(Bot, MessageEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let pattern = compile_pattern(pattern)?;
        Ok(Self::with_regex(pattern, usage, handler))
    }

    /// Create a responder from an already compiled regex
    pub fn with_regex<F, Fut>(pattern: Regex, usage: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Bot, MessageEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            pattern,
            usage: usage.into(),
            handler: Arc::new(move |bot, ev| Box::pin(handler(bot, ev))),
        }
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn usage(&self) -> &str {
        &self.usage
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Run the handler to completion
    pub async fn invoke(&self, bot: Bot, event: MessageEvent) {
        (self.handler)(bot, event).await
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("pattern", &self.pattern.as_str())
            .field("usage", &self.usage)
            .finish()
    }
}

/// Compile a trigger pattern, mapping failures to configuration errors
pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| BotError::Config(format!("invalid pattern '{}': {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches() {
        let r = Responder::new(r"^(?i)(hello|hi)", "say hi", |_bot, _ev| async {}).unwrap();
        assert!(r.matches("Hello there"));
        assert!(r.matches("hi"));
        assert!(!r.matches("oh hi"));
        assert_eq!(r.usage(), "say hi");
    }

    #[test]
    fn test_invalid_pattern() {
        let result = Responder::new(r"(unclosed", "", |_bot, _ev| async {});
        assert!(matches!(result, Err(BotError::Config(_))));
    }

    #[test]
    fn test_debug_hides_handler() {
        let r = Responder::new("^ping", "ping", |_bot, _ev| async {}).unwrap();
        let dbg = format!("{:?}", r);
        assert!(dbg.contains("^ping"));
    }
}
