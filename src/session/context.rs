//! Owned session handle. Starting a context reconciles with the stored token in
//! the background; dropping it cancels that reconciliation so its result never
//! lands on a session that no longer exists.

use crate::session::{
    exchange::CredentialExchange, navigator::Navigator, reconciler::SessionReconciler,
    store::TokenStore,
};
use std::{ops::Deref, sync::Arc};
use tokio::task::JoinHandle;
use tracing::debug;

pub struct SessionContext<E, S, N>
where
    E: CredentialExchange + 'static,
    S: TokenStore + 'static,
    N: Navigator + 'static,
{
    reconciler: Arc<SessionReconciler<E, S, N>>,
    hydration: Option<JoinHandle<()>>,
}

impl<E, S, N> SessionContext<E, S, N>
where
    E: CredentialExchange + 'static,
    S: TokenStore + 'static,
    N: Navigator + 'static,
{
    /// Spawns `initialize` on the current tokio runtime.
    #[must_use]
    pub fn start(reconciler: SessionReconciler<E, S, N>) -> Self {
        let reconciler = Arc::new(reconciler);
        let hydrating = reconciler.clone();
        let hydration = tokio::spawn(async move { hydrating.initialize().await });

        Self {
            reconciler,
            hydration: Some(hydration),
        }
    }

    /// Waits for the startup reconciliation to finish.
    pub async fn ready(&mut self) {
        if let Some(hydration) = self.hydration.take()
            && let Err(err) = hydration.await
        {
            debug!("Session hydration did not complete: {err}");
        }
    }
}

impl<E, S, N> Deref for SessionContext<E, S, N>
where
    E: CredentialExchange + 'static,
    S: TokenStore + 'static,
    N: Navigator + 'static,
{
    type Target = SessionReconciler<E, S, N>;

    fn deref(&self) -> &Self::Target {
        &self.reconciler
    }
}

impl<E, S, N> Drop for SessionContext<E, S, N>
where
    E: CredentialExchange + 'static,
    S: TokenStore + 'static,
    N: Navigator + 'static,
{
    fn drop(&mut self) {
        self.reconciler.teardown();
        if let Some(hydration) = self.hydration.take() {
            hydration.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{
        identity::Identity,
        reconciler::tests::{FakeExchange, RecordingNavigator},
        store::MemoryTokenStore,
    };
    use serde_json::json;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn start_hydrates_from_store() {
        let exchange = FakeExchange::default().with_session("abc", json!({"id": 1, "name": "ana"}));
        let mut context = SessionContext::start(SessionReconciler::new(
            exchange,
            MemoryTokenStore::with_token("abc"),
            RecordingNavigator::default(),
        ));

        context.ready().await;

        assert!(context.identity().is_authenticated());
    }

    #[tokio::test]
    async fn drop_cancels_pending_hydration() {
        let exchange = Arc::new(FakeExchange::default().with_session("abc", json!({"id": 1})));
        let gate = exchange.gate("abc");
        let context = SessionContext::start(SessionReconciler::new(
            exchange.clone(),
            MemoryTokenStore::with_token("abc"),
            RecordingNavigator::default(),
        ));
        let updates = context.subscribe();

        while exchange.lookup_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        drop(context);
        gate.notify_one();
        tokio::task::yield_now().await;

        assert_eq!(*updates.borrow(), Identity::Unauthenticated);
    }
}
