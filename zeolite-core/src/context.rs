use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{BlockError, Result};

/// Per-operation options carried through every router and backend call.
///
/// Holds the optional cancellation signal. The router forwards the context
/// verbatim to whichever backend it dispatches to; backends honor it with
/// [`ensure_active`](OpContext::ensure_active) and [`run`](OpContext::run).
/// Cancellation never rolls back work that already completed durably.
#[derive(Clone, Debug, Default)]
pub struct OpContext {
    token: Option<CancellationToken>,
}

impl OpContext {
    /// A context with no cancellation signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that observes the given cancellation token.
    pub fn with_token(token: CancellationToken) -> Self {
        OpContext { token: Some(token) }
    }

    pub fn token(&self) -> Option<&CancellationToken> {
        self.token.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Fails with `Cancelled` if the signal has already fired.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(BlockError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Races a backend future against the cancellation signal.
    ///
    /// The signal is checked first, so a pre-fired token deterministically
    /// yields `Cancelled` without polling the future.
    pub async fn run<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match &self.token {
            None => fut.await,
            Some(token) => {
                self.ensure_active()?;
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(BlockError::Cancelled),
                    res = fut => res,
                }
            }
        }
    }
}
