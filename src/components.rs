//! Registry of message-component handlers.
//!
//! Handlers are keyed by `(message_id, custom_id)` and live until their
//! interaction-relative deadline. Expiry is checked lazily on every lookup:
//! a late activation removes the entry and fires its `on_expire` callback
//! instead of running the handler. [`ComponentRegistry::spawn_sweeper`]
//! optionally evicts entries nobody activates again.
//!
//! The map is a [`DashMap`]; each insert, lookup, expire-check and delete
//! is a single sharded-lock operation and no lock is held while a handler
//! or callback runs.

use std::future::Future;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_lite::future::Boxed;
use futures_lite::FutureExt;
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::context::ComponentContext;
use crate::error::HandlerResult;

pub type ComponentHandler = Arc<dyn Fn(ComponentContext) -> Boxed<HandlerResult> + Send + Sync>;

/// Runs once when a registration is found past its deadline.
pub type OnExpire = Box<dyn FnOnce() + Send + Sync>;

type Key = (String, String);

/// Shortest interval [`ComponentRegistry::spawn_sweeper`] will tick at.
pub const MIN_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);

struct Registration {
    handler: ComponentHandler,
    expires_at: DateTime<Utc>,
    on_expire: Option<OnExpire>,
}

/// Box an async closure into a [`ComponentHandler`].
pub fn component_handler<F, Fut>(f: F) -> ComponentHandler
where
    F: Fn(ComponentContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |ctx: ComponentContext| f(ctx).boxed())
}

/// What a lookup found for a key.
pub enum Lookup {
    Missing,
    /// The entry was past its deadline; it has been removed and its
    /// `on_expire` has run.
    Expired,
    Found(ComponentHandler),
}

#[derive(Debug)]
pub enum DispatchOutcome {
    /// Nothing registered under the key; the activation is dropped.
    Missing,
    Expired,
    Handled(HandlerResult),
}

/// Shared handle to one router's component registrations. Clones share the
/// same map.
#[derive(Clone)]
pub struct ComponentRegistry {
    entries: Arc<DashMap<Key, Registration>>,
    clock: Arc<dyn Clock>,
}

impl ComponentRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Insert or replace the handler for `(message_id, custom_id)`.
    pub fn register(
        &self,
        message_id: impl Into<String>,
        custom_id: impl Into<String>,
        handler: ComponentHandler,
        expires_at: DateTime<Utc>,
        on_expire: Option<OnExpire>,
    ) {
        let key = (message_id.into(), custom_id.into());
        debug!(message_id = %key.0, custom_id = %key.1, %expires_at, "registering component");
        let previous = self.entries.insert(
            key,
            Registration {
                handler,
                expires_at,
                on_expire,
            },
        );
        if previous.is_some() {
            trace!("replaced an existing component registration");
        }
    }

    /// Remove a registration. Returns whether one existed.
    pub fn unregister(&self, message_id: &str, custom_id: &str) -> bool {
        self.entries
            .remove(&(message_id.to_string(), custom_id.to_string()))
            .is_some()
    }

    pub fn contains(&self, message_id: &str, custom_id: &str) -> bool {
        self.entries
            .contains_key(&(message_id.to_string(), custom_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a key, evicting it if it has expired.
    pub fn lookup(&self, message_id: &str, custom_id: &str) -> Lookup {
        let key = (message_id.to_string(), custom_id.to_string());
        let now = self.clock.now();

        if let Some((_, expired)) = self.entries.remove_if(&key, |_, reg| now > reg.expires_at) {
            debug!(message_id, custom_id, "component registration expired");
            if let Some(on_expire) = expired.on_expire {
                on_expire();
            }
            return Lookup::Expired;
        }

        match self.entries.get(&key) {
            Some(reg) => Lookup::Found(Arc::clone(&reg.handler)),
            None => Lookup::Missing,
        }
    }

    /// Run the handler registered for the context's `(message_id, custom_id)`.
    pub async fn dispatch(&self, ctx: ComponentContext) -> DispatchOutcome {
        match self.lookup(&ctx.message.id, &ctx.custom_id) {
            Lookup::Missing => {
                debug!(
                    message_id = %ctx.message.id,
                    custom_id = %ctx.custom_id,
                    "no handler for component"
                );
                DispatchOutcome::Missing
            }
            Lookup::Expired => DispatchOutcome::Expired,
            Lookup::Found(handler) => DispatchOutcome::Handled(handler(ctx).await),
        }
    }

    /// Evict every expired registration, firing their callbacks. Returns the
    /// number evicted.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut callbacks = Vec::new();
        self.entries.retain(|_, reg| {
            if now > reg.expires_at {
                callbacks.push(reg.on_expire.take());
                false
            } else {
                true
            }
        });
        let evicted = callbacks.len();
        for on_expire in callbacks.into_iter().flatten() {
            on_expire();
        }
        evicted
    }

    /// Sweep on a fixed interval until every clone of this registry is
    /// dropped. Intervals below [`MIN_SWEEP_INTERVAL`] are raised to it.
    pub fn spawn_sweeper(&self, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let every = every.max(MIN_SWEEP_INTERVAL);
        let entries: Weak<DashMap<Key, Registration>> = Arc::downgrade(&self.entries);
        let clock = Arc::clone(&self.clock);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(entries) = entries.upgrade() else {
                    break;
                };
                let evicted = ComponentRegistry { entries, clock: Arc::clone(&clock) }.sweep();
                if evicted > 0 {
                    debug!(evicted, "swept expired components");
                }
            }
        })
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("len", &self.entries.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
