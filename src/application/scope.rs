use crate::domain::ports::{BillingService, BillingServiceBox, BillingServiceFactory};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Lifetime boundary for everything resolved while handling one message.
///
/// Each scope owns its own billing service instance, so two messages handled
/// concurrently never share per-call state. The instance is released when the
/// scope is dropped, whichever way the handler exits.
pub struct ExecutionScope {
    id: u64,
    billing: BillingServiceBox,
    opened_at: Instant,
    span: tracing::Span,
}

impl ExecutionScope {
    pub fn open(factory: &BillingServiceFactory) -> Self {
        let id = NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed);
        let span = tracing::debug_span!("message_scope", scope_id = id);
        let billing = span.in_scope(|| factory());

        Self {
            id,
            billing,
            opened_at: Instant::now(),
            span,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn billing(&self) -> &dyn BillingService {
        self.billing.as_ref()
    }

    /// Span for instrumenting the handler future running inside this scope.
    pub fn span(&self) -> tracing::Span {
        self.span.clone()
    }
}

impl Drop for ExecutionScope {
    fn drop(&mut self) {
        tracing::debug!(
            parent: &self.span,
            elapsed_ms = u64::try_from(self.opened_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            "scope released"
        );
    }
}
