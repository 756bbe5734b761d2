//! Per-visitor auth controllers.
//!
//! Every browser session gets its own [`AuthController`] and login view,
//! keyed by a visitor id kept in the cookie session. Idle visitors are
//! evicted and their controllers shut down.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use moka::notification::RemovalCause;
use tracing::debug;

use crate::views::login::LoginView;

use super::capability::IdentityProvider;
use super::controller::{AuthController, AuthControllerOptions};
use super::resolver::AdminResolver;

masjid_core::define_id!(VisitorId);

impl VisitorId {
    /// A fresh random visitor id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4())
    }
}

/// Builds the identity provider for a new visitor.
pub type IdentityFactory = Arc<dyn Fn() -> Arc<dyn IdentityProvider> + Send + Sync>;

/// Everything auth-related one visitor owns.
#[derive(Debug)]
pub struct VisitorAuth {
    pub controller: AuthController,
    pub login: LoginView,
}

/// Registry of per-visitor controllers.
#[derive(Clone)]
pub struct AuthSessions {
    inner: Arc<AuthSessionsInner>,
}

struct AuthSessionsInner {
    visitors: Cache<VisitorId, Arc<VisitorAuth>>,
    identity_factory: IdentityFactory,
    resolver: AdminResolver,
    options: AuthControllerOptions,
}

impl AuthSessions {
    /// Create a registry evicting visitors idle for `idle`.
    #[must_use]
    pub fn new(
        identity_factory: IdentityFactory,
        resolver: AdminResolver,
        options: AuthControllerOptions,
        idle: Duration,
    ) -> Self {
        let visitors = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(idle)
            .eviction_listener(
                |visitor: Arc<VisitorId>, auth: Arc<VisitorAuth>, cause: RemovalCause| {
                    debug!(visitor = %visitor, ?cause, "Releasing visitor auth controller");
                    auth.controller.close();
                },
            )
            .build();

        Self {
            inner: Arc::new(AuthSessionsInner {
                visitors,
                identity_factory,
                resolver,
                options,
            }),
        }
    }

    /// The visitor's auth, starting a controller on first use.
    pub async fn get_or_start(&self, visitor: VisitorId) -> Arc<VisitorAuth> {
        let inner = &self.inner;
        inner
            .visitors
            .get_with(visitor, async {
                debug!(%visitor, "Starting auth controller for visitor");
                let identity = (inner.identity_factory)();
                Arc::new(VisitorAuth {
                    controller: AuthController::start(
                        identity,
                        inner.resolver.clone(),
                        inner.options.clone(),
                    ),
                    login: LoginView::new(Arc::clone(inner.resolver.security_log())),
                })
            })
            .await
    }

    /// The visitor's auth, if a controller is running for them.
    pub async fn get(&self, visitor: VisitorId) -> Option<Arc<VisitorAuth>> {
        self.inner.visitors.get(&visitor).await
    }

    /// Drop the visitor's controller now.
    pub async fn end(&self, visitor: VisitorId) {
        self.inner.visitors.invalidate(&visitor).await;
        self.inner.visitors.run_pending_tasks().await;
    }

    /// Number of visitors with a running controller.
    pub async fn active(&self) -> u64 {
        self.inner.visitors.run_pending_tasks().await;
        self.inner.visitors.entry_count()
    }
}

impl std::fmt::Debug for AuthSessions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSessions")
            .field("visitors", &self.inner.visitors.entry_count())
            .finish_non_exhaustive()
    }
}
