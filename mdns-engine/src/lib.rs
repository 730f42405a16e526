//! Multicast DNS and DNS-SD engine.
//!
//! Every component runs as its own task on the current tokio runtime and talks
//! to the network through a [`Server`]. Handles own their task: dropping one
//! cancels the task together with its subscriptions and timers.

pub mod browser;
pub mod cache;
pub mod cache_manager;
pub mod dns;
pub mod error;
pub mod hostname;
pub mod prober;
pub mod provider;
pub mod resolver;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

pub use browser::{Browser, BrowserEvent};
pub use cache::CacheEvent;
pub use cache_manager::CacheHandle;
pub use dns::{Bitmap, Message, Query, Record};
pub use error::WireError;
pub use hostname::Hostname;
pub use prober::Prober;
pub use provider::{Provider, ProviderEvent};
pub use resolver::Resolver;
pub use server::{Server, ServerEvent};
