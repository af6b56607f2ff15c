//! subsync-runtime
//!
//! The reconciliation engine proper: the coordinator and its session, the
//! change bus, the restart trigger, and the seams (billing client, record
//! store, principal resolver, restart mechanism, analytics sink) it is wired
//! through.

mod analytics;
mod billing;
mod bus;
mod coordinator;
mod error;
mod principal;
mod session;
mod trigger;

pub use analytics::{AnalyticsEvent, AnalyticsSink, NoopAnalytics, TracingAnalytics};
pub use billing::{BillingClient, BillingError};
pub use bus::{EventBus, Subscription};
pub use coordinator::{
    Clock, Coordinator, CoordinatorDeps, CoordinatorSettings, ReconcileOutcome, SystemClock,
    Transition,
};
pub use error::{PersistenceOp, ReconcileError};
pub use principal::{Principal, PrincipalResolver, SessionPrincipal, TrustedPrincipals};
pub use session::{ReconciliationSession, SessionState};
pub use trigger::{
    is_significant, LogOnlyRestart, RestartDecision, RestartError, RestartMechanism,
    RestartTrigger,
};
