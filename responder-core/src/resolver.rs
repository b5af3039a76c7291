//! Ordered provider fallback.
//!
//! A [`FallbackChain`] walks its adapters strictly in preference order, one at
//! a time, each gated by the shared [`RateLimiter`]. Failures are logged and
//! swallowed; the caller only learns whether some provider answered.

use std::{fmt, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    provider::{Adapter, Capability, ProviderId},
    rate_limit::RateLimiter,
};

/// Result of walking a chain for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    Resolved { provider: ProviderId, value: T },
    /// No adapter was enabled or every adapter failed. The two cases are
    /// deliberately not distinguished.
    Exhausted,
}

impl<T> Resolution<T> {
    pub fn into_value(self) -> Option<T> {
        match self {
            Resolution::Resolved { value, .. } => Some(value),
            Resolution::Exhausted => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainState {
    Trying(usize),
    Exhausted,
}

pub struct FallbackChain<Req, Out>
where
    Req: Sync + 'static,
    Out: Send + 'static,
{
    capability: Capability,
    adapters: Vec<Arc<dyn Adapter<Req, Out>>>,
}

impl<Req, Out> FallbackChain<Req, Out>
where
    Req: Sync + 'static,
    Out: Send + 'static,
{
    /// Adapters must already be filtered to enabled providers, in preference order.
    pub fn new(capability: Capability, adapters: Vec<Arc<dyn Adapter<Req, Out>>>) -> Self {
        if adapters.is_empty() {
            info!(%capability, "no provider configured, results will be simulated");
        }
        Self { capability, adapters }
    }

    /// Chain with no adapters: every request is exhausted immediately.
    pub fn empty(capability: Capability) -> Self {
        Self { capability, adapters: Vec::new() }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        self.adapters.iter().map(|a| a.provider()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Try each adapter in order until one succeeds.
    pub async fn resolve(&self, limiter: &RateLimiter, request: &Req) -> Resolution<Out> {
        let mut state = ChainState::Trying(0);

        loop {
            state = match state {
                ChainState::Trying(i) => match self.adapters.get(i) {
                    None => {
                        if !self.adapters.is_empty() {
                            warn!(
                                capability = %self.capability,
                                attempts = self.adapters.len(),
                                "all providers failed, falling back to simulation"
                            );
                        }
                        ChainState::Exhausted
                    }
                    Some(adapter) => {
                        let provider = adapter.provider();
                        limiter.acquire(provider.as_str()).await;
                        debug!(capability = %self.capability, %provider, "trying provider");

                        match adapter.resolve(request).await {
                            Ok(value) => return Resolution::Resolved { provider, value },
                            Err(err) => {
                                warn!(
                                    capability = %self.capability,
                                    %provider,
                                    kind = err.kind(),
                                    error = %err,
                                    "provider failed, trying next"
                                );
                                ChainState::Trying(i + 1)
                            }
                        }
                    }
                },
                ChainState::Exhausted => return Resolution::Exhausted,
            };
        }
    }
}

impl<Req, Out> fmt::Debug for FallbackChain<Req, Out>
where
    Req: Sync + 'static,
    Out: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackChain")
            .field("capability", &self.capability)
            .field("providers", &self.providers())
            .finish()
    }
}
