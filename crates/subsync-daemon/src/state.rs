//! Shared runtime state for subsync-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The coordinator's
//! in-process change bus is bridged onto a tokio broadcast channel so SSE
//! clients see every `subscriptionChanged` / `cacheCleared` event, plus the
//! restart requests the trigger schedules.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use subsync_config::EngineConfig;
use subsync_db::RecordStore;
use subsync_runtime::{
    BillingClient, Coordinator, CoordinatorDeps, CoordinatorSettings, RestartError,
    RestartMechanism, RestartTrigger, TracingAnalytics, TrustedPrincipals,
};
use subsync_schemas::{BusEvent, CacheCleared, SubscriptionChanged, Topic};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the daemon bus and surfaced as SSE events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    SubscriptionChanged(SubscriptionChanged),
    CacheCleared(CacheCleared),
    /// Clients should reload once this arrives.
    RestartRequested { delay_ms: u64, ts_millis: i64 },
}

impl BusMsg {
    /// SSE `event:` name.
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::SubscriptionChanged(_) => "subscription_changed",
            BusMsg::CacheCleared(_) => "cache_cleared",
            BusMsg::RestartRequested { .. } => "restart_requested",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// BroadcastRestart
// ---------------------------------------------------------------------------

/// Restart mechanism for a headless service: after `delay`, tell every
/// connected client to reload. Unavailable when nobody is listening.
#[derive(Clone, Debug)]
pub struct BroadcastRestart {
    bus: broadcast::Sender<BusMsg>,
}

impl BroadcastRestart {
    pub fn new(bus: broadcast::Sender<BusMsg>) -> Self {
        Self { bus }
    }
}

impl RestartMechanism for BroadcastRestart {
    fn schedule_restart(&self, delay: Duration) -> Result<(), RestartError> {
        if self.bus.receiver_count() == 0 {
            return Err(RestartError("no connected client to restart".to_string()));
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| RestartError("no async runtime to deliver restart".to_string()))?;

        let bus = self.bus.clone();
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = bus.send(BusMsg::RestartRequested {
                delay_ms,
                ts_millis: chrono::Utc::now().timestamp_millis(),
            });
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    /// Static build metadata.
    pub build: BuildInfo,
    pub coordinator: Coordinator,
    /// Expected webhook credential. `None` disables the webhook route.
    pub webhook_secret: Option<String>,
}

impl AppState {
    /// Wire a coordinator over `billing` and `store`.
    ///
    /// The daemon serves every user, so principals are trusted as given.
    pub fn new(
        billing: Arc<dyn BillingClient>,
        store: Arc<dyn RecordStore>,
        cfg: &EngineConfig,
        webhook_secret: Option<String>,
    ) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);

        let trigger = RestartTrigger::new(
            Arc::new(BroadcastRestart::new(bus.clone())),
            cfg.restart_delay,
        );
        let mut deps = CoordinatorDeps::new(billing, store, Arc::new(TrustedPrincipals), trigger);
        deps.analytics = Arc::new(TracingAnalytics);

        let coordinator = Coordinator::new(deps, CoordinatorSettings::from_engine_config(cfg));
        bridge_change_bus(&coordinator, &bus);

        Self {
            bus,
            build: BuildInfo {
                service: "subsync-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            coordinator,
            webhook_secret,
        }
    }
}

/// Forward change-bus events onto the SSE broadcast channel.
fn bridge_change_bus(coordinator: &Coordinator, bus: &broadcast::Sender<BusMsg>) {
    for topic in [Topic::SubscriptionChanged, Topic::CacheCleared] {
        let tx = bus.clone();
        coordinator.bus().subscribe(topic, move |ev| {
            let msg = match ev {
                BusEvent::SubscriptionChanged(p) => BusMsg::SubscriptionChanged(p.clone()),
                BusEvent::CacheCleared(p) => BusMsg::CacheCleared(p.clone()),
            };
            // no SSE client connected
            let _ = tx.send(msg);
        });
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
