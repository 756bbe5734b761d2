//! Admin authentication and authorization.
//!
//! Email/password sign-in through the identity provider, admin rights from
//! the admin directory. One [`AuthController`] per visitor owns the state;
//! the route guard and login view only read it.

mod capability;
mod controller;
mod error;
mod registry;
mod resolver;
mod store;

pub use capability::{
    AdminDirectory, AuthChange, AuthEventHub, AuthSubscription, IdentityProvider, ProviderError,
    SecurityLog,
};
pub use controller::{
    AuthController, AuthControllerOptions, DEFAULT_SETTLE_TIMEOUT, MIN_PASSWORD_LENGTH,
};
pub use error::{AuthError, AuthErrorKind};
pub use registry::{AuthSessions, IdentityFactory, VisitorAuth, VisitorId};
pub use resolver::{AdminResolution, AdminResolver, DEFAULT_ADMIN_CHECK_TIMEOUT};
pub use store::{AuthPhase, AuthState, SessionStore};
