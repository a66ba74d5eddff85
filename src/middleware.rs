//! Ordered interceptors that run before every command handler.
//!
//! Each step receives the command context by value and either hands it on,
//! possibly with new extensions attached, or halts. A halting step owns the
//! response: the engine emits nothing on its behalf, so a step that halts
//! without sending leaves the interaction unanswered.

use std::future::Future;
use std::sync::Arc;

use futures_lite::future::Boxed;
use futures_lite::FutureExt;
use tracing::debug;

use crate::context::CommandContext;

/// Result of one middleware step.
pub enum Next {
    Continue(CommandContext),
    Halt,
}

pub type Middleware = Arc<dyn Fn(CommandContext) -> Boxed<Next> + Send + Sync>;

#[derive(Clone, Default)]
pub struct MiddlewareChain {
    steps: Vec<Middleware>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step; steps run in the order they were pushed.
    pub fn push<F, Fut>(&mut self, step: F)
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Next> + Send + 'static,
    {
        self.steps
            .push(Arc::new(move |ctx: CommandContext| step(ctx).boxed()));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Thread `ctx` through every step. `None` means a step halted.
    pub async fn run(&self, mut ctx: CommandContext) -> Option<CommandContext> {
        for (index, step) in self.steps.iter().enumerate() {
            match step(ctx).await {
                Next::Continue(next) => ctx = next,
                Next::Halt => {
                    debug!(step = index, "middleware halted");
                    return None;
                }
            }
        }
        Some(ctx)
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("steps", &self.steps.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::context::testing::Harness;

    #[derive(Clone, Debug, PartialEq)]
    struct Trail(Vec<&'static str>);

    fn mark(label: &'static str) -> impl Fn(CommandContext) -> Boxed<Next> + Send + Sync {
        move |mut ctx: CommandContext| {
            let mut trail = ctx.extension::<Trail>().cloned().unwrap_or(Trail(Vec::new()));
            trail.0.push(label);
            ctx.extensions_mut().insert(trail);
            async move { Next::Continue(ctx) }.boxed()
        }
    }

    #[tokio::test]
    async fn steps_run_in_order_and_see_earlier_extensions() {
        let h = Harness::new();
        let (ctx, _rx) = h.command("ping");
        let mut chain = MiddlewareChain::new();
        chain.push(mark("first"));
        chain.push(mark("second"));

        let ctx = chain.run(ctx).await.unwrap();
        assert_eq!(ctx.extension::<Trail>(), Some(&Trail(vec!["first", "second"])));
    }

    #[tokio::test]
    async fn halt_stops_the_chain() {
        let h = Harness::new();
        let (ctx, rx) = h.command("ping");
        let reached = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&reached);

        let mut chain = MiddlewareChain::new();
        chain.push(|_ctx| async { Next::Halt });
        chain.push(move |ctx| {
            *flag.lock().unwrap() = true;
            async move { Next::Continue(ctx) }
        });

        assert!(chain.run(ctx).await.is_none());
        assert!(!*reached.lock().unwrap());
        // Nothing was emitted on the halted interaction's behalf.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn halting_step_may_respond_itself() {
        let h = Harness::new();
        let (ctx, rx) = h.command("ping");
        let mut chain = MiddlewareChain::new();
        chain.push(|mut ctx: CommandContext| async move {
            let _ = ctx.send("not allowed here", true).await;
            Next::Halt
        });

        assert!(chain.run(ctx).await.is_none());
        let response = rx.try_recv().unwrap();
        assert_eq!(
            response.data.and_then(|d| d.content).as_deref(),
            Some("not allowed here")
        );
    }

    #[tokio::test]
    async fn empty_chain_passes_through() {
        let h = Harness::new();
        let (ctx, _rx) = h.command("ping");
        let chain = MiddlewareChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.run(ctx).await.map(|c| c.name.clone()), Some("ping".to_string()));
    }
}
