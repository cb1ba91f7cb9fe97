//! # a3s-bot
//!
//! Event-driven chat bot runtime for the A3S ecosystem.
//!
//! ## Overview
//!
//! `a3s-bot` consumes a stream of inbound chat messages from a pluggable
//! transport and routes each message to one of:
//!
//! - **indirect responders**: run on every visible message whose text matches
//! - **exchanges**: multi-step conversations carried out in a thread
//! - **direct responders**: run on the first match among messages addressed to the bot
//! - the **fallback message** when nothing matched
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_bot::{Bot, BotIdentity, ExchangeTemplate, MemoryTransport, MessageOutcome, Responder, Step};
//! use std::sync::Arc;
//!
//! # async fn example() -> a3s_bot::Result<()> {
//! let transport = Arc::new(MemoryTransport::new(BotIdentity {
//!     id: "B1".to_string(),
//!     name: "bee".to_string(),
//! }));
//!
//! let color = ExchangeTemplate::new(r"^start exchange", "start exchange - pick a color")?
//!     .then(Step::message("ask", "What is your favorite color?"))
//!     .then(Step::message_handler("store", |ex, ev| {
//!         Box::pin(async move {
//!             ex.store.put("color", &ev.text)?;
//!             Ok(MessageOutcome::Advance)
//!         })
//!     }))
//!     .then(Step::handler("answer", |ex| {
//!         Box::pin(async move {
//!             let color: String = ex.store.get("color")?;
//!             ex.reply(&format!("{} is a great color!", color)).await?;
//!             Ok(())
//!         })
//!     }));
//!
//! let bot = Bot::builder(transport)
//!     .direct(Responder::new(r"^(?i)(hello|hi)", "hello - say hi", |bot, ev| async move {
//!         let _ = bot.reply(&ev.channel, "Hi! I'm a rad bot").await;
//!     })?)
//!     .exchange(color)
//!     .circuit_breaker(30, 10)
//!     .build()?;
//!
//! bot.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Transports
//!
//! - **memory**: In-memory transport for testing and single-process use
//!
//! ## Architecture
//!
//! - **Transport** trait: core abstraction all chat backends implement
//! - **Bot**: dispatch engine, outbound gate, and lifecycle
//! - **Exchange**: step interpreter for one threaded conversation
//! - **ExchangeRegistry**: at most one active exchange per thread
//! - **CircuitBreaker**: fail-stop guard against runaway sends
//! - **Scheduler**: cron-style tasks started alongside the bot

pub mod bot;
pub mod breaker;
pub mod config;
pub mod error;
pub mod exchange;
pub mod responder;
pub mod scheduler;
pub mod store;
pub mod transport;
pub mod types;

// Re-export core types
pub use bot::{Bot, BotBuilder, TerminateHook, BREAKER_EXIT_CODE};
pub use breaker::{BreakerDecision, CircuitBreaker};
pub use config::{BotConfig, CircuitBreakerConfig, DEFAULT_FALLBACK_MESSAGE};
pub use error::{BotError, Result};
pub use exchange::{
    Exchange, ExchangeHandle, ExchangeRegistry, ExchangeState, ExchangeTemplate, MessageOutcome,
    Step, StepAction, FIRST_STEP,
};
pub use responder::Responder;
pub use scheduler::{CronExpression, ScheduledTask, Scheduler};
pub use store::{SimpleStore, Store, StoreFactory};
pub use transport::{EventStream, Transport};
pub use types::{
    Attachment, AttachmentField, BotIdentity, ChannelInfo, MessageEvent, OutgoingMessage,
    PostedMessage, Resolved, TransportEvent, UserInfo,
};

// Re-export transports for convenience
pub use transport::memory::{MemoryTransport, SentMessage};
