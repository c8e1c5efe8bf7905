//! Retry policies for transient RPC failures.

use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::time::Duration;

use crate::errors::InvocationError;

/// Controls how the client reacts when an RPC attempt fails.
pub trait RetryPolicy: Send + Sync + 'static {
    fn should_retry(&self, ctx: &RetryContext) -> ControlFlow<(), Duration>;
}

/// Context passed to [`RetryPolicy::should_retry`] on each failure.
pub struct RetryContext {
    pub fail_count:   NonZeroU32,
    pub slept_so_far: Duration,
    pub error:        InvocationError,
}

/// Never retry.
pub struct NoRetries;
impl RetryPolicy for NoRetries {
    fn should_retry(&self, _: &RetryContext) -> ControlFlow<(), Duration> {
        ControlFlow::Break(())
    }
}

/// Exponential backoff over transient failures only.
///
/// The n-th retry sleeps `base_interval * multiplier^(n-1)`; fatal errors
/// break out immediately regardless of the remaining budget. `max_tries = 1`
/// disables retrying altogether.
pub struct Backoff {
    pub base_interval: Duration,
    pub multiplier:    f64,
    pub max_tries:     u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(1),
            multiplier:    2.0,
            max_tries:     5,
        }
    }
}

impl RetryPolicy for Backoff {
    fn should_retry(&self, ctx: &RetryContext) -> ControlFlow<(), Duration> {
        if !ctx.error.is_transient() {
            return ControlFlow::Break(());
        }
        if ctx.fail_count.get() >= self.max_tries {
            return ControlFlow::Break(());
        }
        let exp = ctx.fail_count.get() as i32 - 1;
        let delay = self.base_interval.mul_f64(self.multiplier.powi(exp));
        tracing::debug!(
            "transient failure #{} ({}) — sleeping {:?} before retry",
            ctx.fail_count,
            ctx.error,
            delay,
        );
        ControlFlow::Continue(delay)
    }
}
