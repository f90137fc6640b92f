//! Chain listener for the offchan engine
//!
//! Subscribes to the challenge registry's dispute events on every
//! configured chain, replays historical ranges in bounded chunks, and
//! fans typed events out to the engine and to explicitly registered
//! listeners with cancellation contexts.

pub mod error;
pub mod events;
pub mod listener;
pub mod provider;

pub use error::WatcherError;
pub use events::{ChainEvent, ChainEventKind, EventTag};
pub use listener::{ChainConfig, ChainListener, Ctx, ListenerConfig, DEFAULT_CHUNK_SIZE};
pub use provider::{ChainReader, RawLog};
