//! The bot runtime
//!
//! `Bot` is a cheap, cloneable handle shared by the receive loop, every
//! responder and exchange handler, and the scheduled tasks. All outbound
//! messages go through the circuit breaker gate before reaching the
//! transport.

use crate::breaker::{tripped_message, BreakerDecision, CircuitBreaker};
use crate::config::{BotConfig, CircuitBreakerConfig};
use crate::error::{BotError, Result};
use crate::exchange::{Exchange, ExchangeRegistry, ExchangeTemplate};
use crate::responder::Responder;
use crate::scheduler::Scheduler;
use crate::store::{simple_store_factory, Store, StoreFactory};
use crate::transport::{EventStream, Transport};
use crate::types::{
    BotIdentity, MessageEvent, OutgoingMessage, PostedMessage, Resolved, TransportEvent,
};
use std::fmt::Write as _;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Called with an exit code when the circuit breaker trips
pub type TerminateHook = Arc<dyn Fn(i32) + Send + Sync>;

/// Exit code used when the circuit breaker trips
pub const BREAKER_EXIT_CODE: i32 = 1;

struct BotInner {
    transport: Arc<dyn Transport>,
    config: BotConfig,
    direct: Vec<Responder>,
    indirect: Vec<Responder>,
    exchanges: Vec<ExchangeTemplate>,
    scheduler: Scheduler,
    registry: ExchangeRegistry,
    breaker: Option<CircuitBreaker>,
    identity: RwLock<Option<BotIdentity>>,
    debug_channel: RwLock<Option<String>>,
    store_factory: StoreFactory,
    terminate: TerminateHook,
}

/// Handle to a configured bot
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

impl Bot {
    /// Start configuring a bot on top of a transport
    pub fn builder(transport: Arc<dyn Transport>) -> BotBuilder {
        BotBuilder::new(transport)
    }

    pub fn config(&self) -> &BotConfig {
        &self.inner.config
    }

    /// The underlying transport, for calls the bot does not wrap
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// The bot's own identity, known once `initialize` succeeded
    pub fn identity(&self) -> Option<BotIdentity> {
        self.inner.identity.read().ok().and_then(|i| i.clone())
    }

    /// Resolved id of the debug channel, if one is configured and was found
    pub fn debug_channel(&self) -> Option<String> {
        self.inner.debug_channel.read().ok().and_then(|c| c.clone())
    }

    pub(crate) fn registry(&self) -> &ExchangeRegistry {
        &self.inner.registry
    }

    /// Threads with an active exchange
    pub fn active_exchanges(&self) -> Vec<String> {
        self.inner.registry.threads()
    }

    pub fn is_exchange_active(&self, thread: &str) -> bool {
        self.inner.registry.contains(thread)
    }

    /// Terminate the exchange running on `thread`
    ///
    /// Waits for a step in progress to finish. A step handler must not
    /// call this for its own thread; it should use `Exchange::terminate`.
    pub async fn terminate_exchange(&self, thread: &str) -> bool {
        let Some(handle) = self.inner.registry.terminate(thread) else {
            return false;
        };
        let mut exchange = handle.lock().await;
        if exchange.is_active() {
            exchange.terminate().await;
        }
        true
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Send a message to a channel
    pub async fn reply(&self, channel: &str, text: &str) -> Result<PostedMessage> {
        self.reply_with_options(channel, OutgoingMessage::text(text))
            .await
    }

    /// Send a message into a thread
    pub async fn reply_in_thread(
        &self,
        channel: &str,
        thread: &str,
        text: &str,
    ) -> Result<PostedMessage> {
        self.reply_with_options(channel, OutgoingMessage::text(text).in_thread(thread))
            .await
    }

    /// Send a message with attachments or other options
    ///
    /// Failures are reported to the debug sink and returned; nothing is retried.
    pub async fn reply_with_options(
        &self,
        channel: &str,
        message: OutgoingMessage,
    ) -> Result<PostedMessage> {
        match self.post(channel, message).await {
            Ok(posted) => Ok(posted),
            Err(e) => {
                self.log_debug(&format!("failure sending message to {} with - {}", channel, e))
                    .await;
                Err(e)
            }
        }
    }

    /// Log a message and mirror it to the debug channel, if any
    pub async fn log_debug(&self, message: &str) {
        tracing::info!("{}", message);

        let Some(channel) = self.debug_channel() else {
            return;
        };
        if let Err(e) = self.post(&channel, OutgoingMessage::text(message)).await {
            tracing::warn!(
                channel = %channel,
                error = %e,
                "Failed to send message to debug channel"
            );
        }
    }

    async fn post(&self, channel: &str, mut message: OutgoingMessage) -> Result<PostedMessage> {
        self.check_breaker(channel).await?;
        message.as_user = true;
        self.inner.transport.post_message(channel, message).await
    }

    async fn check_breaker(&self, channel: &str) -> Result<()> {
        let Some(breaker) = &self.inner.breaker else {
            return Ok(());
        };

        match breaker.check() {
            BreakerDecision::Pass => Ok(()),
            BreakerDecision::Open => Err(BotError::CircuitOpen),
            BreakerDecision::Tripped => {
                tracing::error!(
                    channel = %channel,
                    max_messages = breaker.max_messages(),
                    window_secs = breaker.window().as_secs(),
                    "Circuit breaker tripped, terminating"
                );
                let notice = OutgoingMessage {
                    as_user: true,
                    ..OutgoingMessage::text(tripped_message(
                        breaker.max_messages(),
                        breaker.window(),
                    ))
                };
                if let Err(e) = self.inner.transport.post_message(channel, notice).await {
                    tracing::warn!(channel = %channel, error = %e, "Failed to send circuit breaker notice");
                }
                (self.inner.terminate)(BREAKER_EXIT_CODE);
                Err(BotError::CircuitOpen)
            }
        }
    }

    /// Reply with the usage of every direct responder and exchange
    pub async fn send_help(
        &self,
        channel: &str,
        thread: Option<&str>,
        preamble: Option<&str>,
    ) -> Result<PostedMessage> {
        let mut text = String::new();
        if let Some(preamble) = preamble.filter(|p| !p.is_empty()) {
            text.push_str(preamble);
            text.push('\n');
        }
        let usages = self
            .inner
            .direct
            .iter()
            .map(Responder::usage)
            .chain(self.inner.exchanges.iter().map(ExchangeTemplate::usage));
        for usage in usages.filter(|u| !u.is_empty()) {
            text.push_str(usage);
            text.push('\n');
        }

        let mut message = OutgoingMessage::text(text);
        if let Some(thread) = thread.filter(|t| !t.is_empty()) {
            message = message.in_thread(thread);
        }
        self.reply_with_options(channel, message).await
    }

    /// Resolve a channel or user name (`#name`, `@name`, real name, or id)
    ///
    /// Channels are tried first, then users. Transport errors are returned
    /// as-is rather than treated as a miss.
    pub async fn resolve_identifier(&self, identifier: &str) -> Result<Resolved> {
        if let Some(channel) = self.inner.transport.channel_info(identifier).await? {
            return Ok(Resolved::Channel(channel));
        }
        if let Some(user) = self.inner.transport.user_info(identifier).await? {
            return Ok(Resolved::User(user));
        }
        Ok(Resolved::NotFound)
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Route one inbound message
    pub async fn handle_message(&self, event: MessageEvent) {
        for responder in &self.inner.indirect {
            if responder.matches(&event.text) {
                responder.invoke(self.clone(), event.clone()).await;
            }
        }

        let identity = self.identity();
        let prefix = identity.as_ref().map(BotIdentity::mention_prefix);
        let mentioned = prefix
            .as_deref()
            .is_some_and(|p| event.text.starts_with(p));
        let active = self.inner.registry.get(event.thread_key());

        let from_self = identity.as_ref().is_some_and(|i| i.id == event.user);
        if event.user.is_empty() || from_self || event.text.is_empty() {
            return;
        }
        if !(event.direct || mentioned || active.is_some()) {
            return;
        }

        let mut event = event;
        let text = match prefix.as_deref() {
            Some(p) => event.text.strip_prefix(p).unwrap_or(&event.text),
            None => event.text.as_str(),
        };
        event.text = text.trim().to_string();

        if let Some(handle) = active {
            let mut exchange = handle.lock().await;
            if exchange.is_active() {
                let state = exchange.resume(Some(&event)).await;
                tracing::debug!(
                    channel = %event.channel,
                    thread = %event.thread_key(),
                    state = ?state,
                    "Exchange continued"
                );
            }
            return;
        }

        if let Some(template) = self.inner.exchanges.iter().find(|t| t.matches(&event.text)) {
            self.start_exchange(template, &event).await;
            return;
        }

        if let Some(responder) = self.inner.direct.iter().find(|r| r.matches(&event.text)) {
            responder.invoke(self.clone(), event).await;
            return;
        }

        if event.thread.is_none() {
            if let Err(e) = self
                .reply(&event.channel, &self.inner.config.fallback_message)
                .await
            {
                tracing::debug!(channel = %event.channel, error = %e, "Fallback reply failed");
            }
        }
    }

    async fn start_exchange(&self, template: &ExchangeTemplate, trigger: &MessageEvent) {
        let store: Box<dyn Store> = (self.inner.store_factory)();
        let exchange = Exchange::start(template, self.clone(), trigger, store);
        let exchange_id = exchange.id().to_string();
        let handle = Arc::new(tokio::sync::Mutex::new(exchange));

        // Hold the exchange before it becomes visible so no message on the
        // new thread can run ahead of the leading steps
        let mut guard = Arc::clone(&handle).lock_owned().await;
        if let Err(e) = self
            .inner
            .registry
            .register(&trigger.timestamp, &exchange_id, handle)
        {
            tracing::warn!(
                channel = %trigger.channel,
                thread = %trigger.timestamp,
                error = %e,
                "Exchange not started"
            );
            return;
        }

        tracing::info!(
            exchange = %exchange_id,
            channel = %trigger.channel,
            thread = %trigger.timestamp,
            user = %trigger.user,
            pattern = %template.pattern().as_str(),
            "Exchange started"
        );
        guard.resume(None).await;
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Fetch the bot identity and resolve the debug channel
    ///
    /// `run` calls this after connecting; it is public for callers that
    /// drive `handle_message` themselves.
    pub async fn initialize(&self) -> Result<()> {
        let identity = self.fetch_identity().await?;
        tracing::info!(id = %identity.id, name = %identity.name, "Bot identity fetched");
        if let Ok(mut current) = self.inner.identity.write() {
            *current = Some(identity);
        }

        if let Some(configured) = &self.inner.config.debug_channel {
            let resolved = match self.resolve_identifier(configured).await? {
                Resolved::NotFound => {
                    tracing::warn!(
                        debug_channel = %configured,
                        "Debug channel not found, debug output stays local"
                    );
                    None
                }
                found => found.id().map(str::to_string),
            };
            if let Ok(mut current) = self.inner.debug_channel.write() {
                *current = resolved;
            }
        }
        Ok(())
    }

    async fn fetch_identity(&self) -> Result<BotIdentity> {
        let retries = self.inner.config.connect_retries;
        let delay = self.inner.config.connect_retry_delay();

        for attempt in 1..=retries {
            match self.inner.transport.identity().await {
                Ok(Some(identity)) => return Ok(identity),
                Ok(None) => {
                    tracing::debug!(attempt, retries, "Bot identity not available yet");
                }
                Err(e) => {
                    tracing::warn!(attempt, retries, error = %e, "Failed to fetch bot identity");
                }
            }
            if attempt < retries {
                tokio::time::sleep(delay).await;
            }
        }

        Err(BotError::Connection(format!(
            "unable to fetch bot identity from {} transport after {} attempts",
            self.inner.transport.name(),
            retries
        )))
    }

    /// Summary of the configuration, posted when the bot starts
    pub fn starting_message(&self) -> String {
        let inner = &self.inner;
        let mut msg = String::from("```Starting bot with:\n");
        let _ = writeln!(msg, "- {} Direct Responders", inner.direct.len());
        let _ = writeln!(msg, "- {} Indirect Responders", inner.indirect.len());
        let _ = writeln!(msg, "- {} Exchanges", inner.exchanges.len());
        let _ = writeln!(msg, "- {} Scheduled Tasks", inner.scheduler.len());
        if let Some(channel) = self.debug_channel() {
            let _ = writeln!(msg, "- Debug Channel: {}", channel);
        }
        if !inner.config.fallback_message.is_empty() {
            let _ = writeln!(msg, "- Fallback Message: \"{}\"", inner.config.fallback_message);
        }
        if let Some(breaker) = &inner.breaker {
            msg.push_str("- Circuit Breaker Enabled with:\n");
            let _ = writeln!(msg, "\t- max messages: {}", breaker.max_messages());
            let _ = writeln!(msg, "\t- interval: {}s", breaker.window().as_secs());
        }
        if let Some(timeout) = inner.config.exchange_timeout() {
            let _ = writeln!(msg, "- Exchange Timeout: {}s", timeout.as_secs());
        }
        msg.push_str("```");
        msg
    }

    /// Connect, start scheduled tasks and serve events until the stream ends
    ///
    /// Returns `Err(InvalidCredentials)` if the transport rejects the
    /// credentials.
    pub async fn run(&self) -> Result<()> {
        let mut stream = self.inner.transport.connect().await?;
        self.initialize().await?;

        self.inner.scheduler.start(self);
        let sweeper = self
            .inner
            .config
            .exchange_timeout()
            .map(|timeout| self.spawn_sweeper(timeout));

        self.log_debug(&self.starting_message()).await;
        let result = self.listen(stream.as_mut()).await;

        self.inner.scheduler.stop();
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        result
    }

    async fn listen(&self, stream: &mut dyn EventStream) -> Result<()> {
        while let Some(event) = stream.next().await {
            match event {
                TransportEvent::Connected { connection_count } => {
                    tracing::info!(connection_count, "Transport connected");
                }
                TransportEvent::Message(message) => {
                    let bot = self.clone();
                    tokio::spawn(async move {
                        bot.handle_message(message).await;
                    });
                }
                TransportEvent::Error(error) => {
                    tracing::warn!(error = %error, "Transport error");
                }
                TransportEvent::InvalidCredentials => {
                    tracing::error!(
                        transport = %self.inner.transport.name(),
                        "Invalid credentials, stopping"
                    );
                    return Err(BotError::InvalidCredentials);
                }
            }
        }

        tracing::info!("Event stream closed");
        Ok(())
    }

    fn spawn_sweeper(&self, timeout: Duration) -> JoinHandle<()> {
        let bot = self.clone();
        let period = (timeout / 4).clamp(Duration::from_millis(100), Duration::from_secs(60));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                for thread in bot.inner.registry.sweep_idle(timeout, Instant::now()) {
                    bot.log_debug(&format!(
                        "exchange {} expired after {}s without activity",
                        thread,
                        timeout.as_secs()
                    ))
                    .await;
                }
            }
        })
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("transport", &self.inner.transport.name())
            .field("direct", &self.inner.direct.len())
            .field("indirect", &self.inner.indirect.len())
            .field("exchanges", &self.inner.exchanges.len())
            .field("active_exchanges", &self.inner.registry.len())
            .finish()
    }
}

/// Collects responders, exchanges and tasks, then validates them in `build`
pub struct BotBuilder {
    transport: Arc<dyn Transport>,
    config: BotConfig,
    direct: Vec<Responder>,
    indirect: Vec<Responder>,
    exchanges: Vec<ExchangeTemplate>,
    scheduler: Scheduler,
    errors: Vec<BotError>,
    store_factory: StoreFactory,
    terminate: TerminateHook,
}

impl BotBuilder {
    fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: BotConfig::default(),
            direct: Vec::new(),
            indirect: Vec::new(),
            exchanges: Vec::new(),
            scheduler: Scheduler::new(),
            errors: Vec::new(),
            store_factory: simple_store_factory(),
            terminate: Arc::new(|code: i32| {
                std::process::exit(code);
            }),
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: BotConfig) -> Self {
        self.config = config;
        self
    }

    pub fn fallback_message(mut self, message: impl Into<String>) -> Self {
        self.config.fallback_message = message.into();
        self
    }

    pub fn debug_channel(mut self, channel: impl Into<String>) -> Self {
        self.config.debug_channel = Some(channel.into());
        self
    }

    pub fn circuit_breaker(mut self, max_messages: u32, window_secs: u64) -> Self {
        self.config.circuit_breaker = Some(CircuitBreakerConfig {
            max_messages,
            window_secs,
        });
        self
    }

    pub fn exchange_timeout(mut self, secs: u64) -> Self {
        self.config.exchange_timeout_secs = Some(secs);
        self
    }

    /// Responder for messages addressed to the bot
    pub fn direct(mut self, responder: Responder) -> Self {
        self.direct.push(responder);
        self
    }

    /// Responder for every message the bot can see
    pub fn indirect(mut self, responder: Responder) -> Self {
        self.indirect.push(responder);
        self
    }

    pub fn exchange(mut self, template: ExchangeTemplate) -> Self {
        self.exchanges.push(template);
        self
    }

    /// Run `task` on a cron schedule; a malformed expression fails `build`
    pub fn schedule<F, Fut>(mut self, expression: &str, task: F) -> Self
    where
        F: Fn(Bot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Err(e) = self.scheduler.schedule(expression, task) {
            self.errors.push(e);
        }
        self
    }

    /// Storage backend handed to each new exchange
    pub fn store_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Store> + Send + Sync + 'static,
    {
        self.store_factory = Arc::new(factory);
        self
    }

    /// Replace process exit on a circuit breaker trip
    pub fn on_terminate<F>(mut self, hook: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.terminate = Arc::new(hook);
        self
    }

    /// Validate everything and build the bot
    pub fn build(self) -> Result<Bot> {
        self.config.validate()?;
        if let Some(e) = self.errors.into_iter().next() {
            return Err(e);
        }
        for template in &self.exchanges {
            template.validate()?;
        }

        let breaker = self
            .config
            .circuit_breaker
            .as_ref()
            .map(CircuitBreaker::from_config);

        Ok(Bot {
            inner: Arc::new(BotInner {
                transport: self.transport,
                config: self.config,
                direct: self.direct,
                indirect: self.indirect,
                exchanges: self.exchanges,
                scheduler: self.scheduler,
                registry: ExchangeRegistry::new(),
                breaker,
                identity: RwLock::new(None),
                debug_channel: RwLock::new(None),
                store_factory: self.store_factory,
                terminate: self.terminate,
            }),
        })
    }
}
