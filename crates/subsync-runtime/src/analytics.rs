use subsync_schemas::SubscriptionStatus;

/// Fire-and-forget product analytics emitted after a committed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsEvent {
    SubscriptionStatusChanged {
        user_id: String,
        old_status: SubscriptionStatus,
        new_status: SubscriptionStatus,
    },
    ProUpgrade {
        user_id: String,
        from_status: SubscriptionStatus,
    },
}

impl AnalyticsEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AnalyticsEvent::SubscriptionStatusChanged { .. } => "subscription_status_changed",
            AnalyticsEvent::ProUpgrade { .. } => "pro_upgrade",
        }
    }

    /// Events for one committed transition, in emission order.
    pub fn for_transition(
        user_id: &str,
        old: SubscriptionStatus,
        new: SubscriptionStatus,
    ) -> Vec<AnalyticsEvent> {
        let mut out = vec![AnalyticsEvent::SubscriptionStatusChanged {
            user_id: user_id.to_string(),
            old_status: old,
            new_status: new,
        }];
        if new == SubscriptionStatus::Pro && old != SubscriptionStatus::Pro {
            out.push(AnalyticsEvent::ProUpgrade {
                user_id: user_id.to_string(),
                from_status: old,
            });
        }
        out
    }
}

pub trait AnalyticsSink: Send + Sync {
    /// Must not block. Failures stay inside the sink.
    fn track(&self, event: &AnalyticsEvent);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAnalytics;

impl AnalyticsSink for NoopAnalytics {
    fn track(&self, _event: &AnalyticsEvent) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn track(&self, event: &AnalyticsEvent) {
        match event {
            AnalyticsEvent::SubscriptionStatusChanged {
                user_id,
                old_status,
                new_status,
            } => tracing::info!(
                event = event.name(),
                user_id = %user_id,
                old_status = %old_status,
                new_status = %new_status,
                "analytics"
            ),
            AnalyticsEvent::ProUpgrade {
                user_id,
                from_status,
            } => tracing::info!(
                event = event.name(),
                user_id = %user_id,
                from_status = %from_status,
                "analytics"
            ),
        }
    }
}
