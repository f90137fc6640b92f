//! The chain listener
//!
//! Watches each configured chain's challenge registry for
//! `ChallengeUpdated` and `StateProgressed` logs, decodes them into
//! typed events, and fans them out through a broadcast channel plus
//! explicitly registered callbacks. Historical ranges replay in bounded
//! chunks so no single RPC call grows with the range. Listener errors
//! are logged and surfaced on the event channels; they never crash the
//! process.

use crate::error::WatcherError;
use crate::events::{decode_log, ChainEvent, EventTag};
use crate::provider::ChainReader;
use alloy_primitives::{Address, B256};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default maximum number of blocks fetched per `eth_getLogs` call.
pub const DEFAULT_CHUNK_SIZE: u64 = 30;

/// One chain the listener watches.
#[derive(Clone)]
pub struct ChainConfig {
    /// Chain id, carried on every emitted event.
    pub chain_id: u64,
    /// Challenge registry whose logs are parsed.
    pub challenge_registry: Address,
    /// Chain reader for this chain.
    pub reader: Arc<dyn ChainReader>,
}

/// Listener tunables.
#[derive(Clone, Debug)]
pub struct ListenerConfig {
    /// Maximum block span per log fetch.
    pub chunk_size: u64,
    /// Poll cadence of the live subscription.
    pub poll_interval: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: Duration::from_secs(15),
        }
    }
}

/// Cancellation handle for an attached listener registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ctx(u64);

type Callback = Arc<dyn Fn(&ChainEvent) + Send + Sync>;

struct Subscription {
    tag: Option<EventTag>,
    identity_hash: Option<B256>,
    once: bool,
    callback: Callback,
}

impl Subscription {
    fn matches(&self, event: &ChainEvent) -> bool {
        self.tag.map_or(true, |t| t == event.kind.tag())
            && self
                .identity_hash
                .map_or(true, |h| h == event.kind.identity_hash())
    }
}

/// The chain listener.
pub struct ChainListener {
    config: ListenerConfig,
    chains: Vec<ChainConfig>,
    events_tx: broadcast::Sender<ChainEvent>,
    subscriptions: Mutex<HashMap<Ctx, Subscription>>,
    next_ctx: AtomicU64,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    cursors: Mutex<HashMap<u64, u64>>,
}

impl ChainListener {
    /// Build a listener over the given chains.
    pub fn new(config: ListenerConfig, chains: Vec<ChainConfig>) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            config,
            chains,
            events_tx,
            subscriptions: Mutex::new(HashMap::new()),
            next_ctx: AtomicU64::new(1),
            poll_task: Mutex::new(None),
            cursors: Mutex::new(HashMap::new()),
        })
    }

    /// Subscribe to the raw event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events_tx.subscribe()
    }

    /// Register a callback; `None` filters match everything.
    pub fn attach(
        &self,
        tag: Option<EventTag>,
        identity_hash: Option<B256>,
        callback: Callback,
    ) -> Ctx {
        self.attach_inner(tag, identity_hash, false, callback)
    }

    /// Register a callback detached automatically after its first match.
    pub fn attach_once(
        &self,
        tag: Option<EventTag>,
        identity_hash: Option<B256>,
        callback: Callback,
    ) -> Ctx {
        self.attach_inner(tag, identity_hash, true, callback)
    }

    fn attach_inner(
        &self,
        tag: Option<EventTag>,
        identity_hash: Option<B256>,
        once: bool,
        callback: Callback,
    ) -> Ctx {
        let ctx = Ctx(self.next_ctx.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.lock().insert(
            ctx,
            Subscription {
                tag,
                identity_hash,
                once,
                callback,
            },
        );
        ctx
    }

    /// Remove a registration. Returns whether it was still attached.
    pub fn detach(&self, ctx: Ctx) -> bool {
        self.subscriptions.lock().remove(&ctx).is_some()
    }

    /// Wait for the next event matching the filters, bounded by `timeout`.
    pub async fn wait_for(
        &self,
        tag: EventTag,
        timeout: Duration,
        identity_hash: Option<B256>,
    ) -> Result<ChainEvent, WatcherError> {
        let mut rx = self.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(WatcherError::WaitTimeout(timeout));
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(event)) => {
                    if event.kind.tag() == tag
                        && identity_hash.map_or(true, |h| h == event.kind.identity_hash())
                    {
                        return Ok(event);
                    }
                }
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!(skipped, "listener subscriber lagged");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => {
                    return Err(WatcherError::WaitTimeout(timeout));
                }
            }
        }
    }

    fn dispatch(&self, event: ChainEvent) {
        let _ = self.events_tx.send(event.clone());
        let matched: Vec<(Ctx, Callback, bool)> = {
            let subs = self.subscriptions.lock();
            subs.iter()
                .filter(|(_, s)| s.matches(&event))
                .map(|(ctx, s)| (*ctx, s.callback.clone(), s.once))
                .collect()
        };
        for (ctx, callback, once) in matched {
            callback(&event);
            if once {
                self.subscriptions.lock().remove(&ctx);
            }
        }
    }

    async fn walk_range(
        &self,
        chain: &ChainConfig,
        from: u64,
        to: u64,
    ) -> Result<usize, WatcherError> {
        let mut parsed = 0;
        let mut cursor = from;
        while cursor <= to {
            let upper = to.min(cursor + self.config.chunk_size - 1);
            let logs = chain
                .reader
                .logs(chain.challenge_registry, cursor, upper)
                .await?;
            for log in logs {
                match decode_log(&log) {
                    Ok(Some(kind)) => {
                        parsed += 1;
                        self.dispatch(ChainEvent {
                            chain_id: chain.chain_id,
                            block_number: log.block_number,
                            kind,
                        });
                    }
                    Ok(None) => {}
                    Err(e) => warn!(chain_id = chain.chain_id, error = %e, "undecodable registry log"),
                }
            }
            cursor = upper + 1;
        }
        Ok(parsed)
    }

    /// Replay every registry log from `starting_block` up to each
    /// chain's head, in chunks of at most the configured size, emitting
    /// typed events. Fails without emitting anything if the starting
    /// block is past any chain's head.
    pub async fn parse_logs_from(&self, starting_block: u64) -> Result<usize, WatcherError> {
        let mut heads = Vec::with_capacity(self.chains.len());
        for chain in &self.chains {
            let head = chain.reader.block_number().await?;
            if starting_block > head {
                return Err(WatcherError::StartBeyondHead {
                    starting_block,
                    head,
                });
            }
            heads.push(head);
        }
        let mut parsed = 0;
        for (chain, head) in self.chains.iter().zip(heads) {
            parsed += self.walk_range(chain, starting_block, head).await?;
            debug!(chain_id = chain.chain_id, head, "historical replay complete");
        }
        Ok(parsed)
    }

    /// Start the live polling task. Idempotent.
    pub fn enable(self: &Arc<Self>) {
        let mut task = self.poll_task.lock();
        if task.is_some() {
            return;
        }
        let listener = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            loop {
                for chain in &listener.chains {
                    if let Err(e) = listener.poll_chain(chain).await {
                        warn!(chain_id = chain.chain_id, error = %e, "poll failed");
                    }
                }
                tokio::time::sleep(listener.config.poll_interval).await;
            }
        }));
    }

    /// Stop the live polling task. Idempotent.
    pub fn disable(&self) {
        if let Some(task) = self.poll_task.lock().take() {
            task.abort();
        }
    }

    async fn poll_chain(&self, chain: &ChainConfig) -> Result<(), WatcherError> {
        let head = chain.reader.block_number().await?;
        let from = {
            let mut cursors = self.cursors.lock();
            *cursors.entry(chain.chain_id).or_insert(head)
        };
        if from > head {
            return Ok(());
        }
        self.walk_range(chain, from, head).await?;
        self.cursors.lock().insert(chain.chain_id, head + 1);
        Ok(())
    }
}

impl Drop for ChainListener {
    fn drop(&mut self) {
        self.disable();
    }
}
