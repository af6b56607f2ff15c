//! subsync-billing-http
//!
//! [`BillingClient`] over the billing provider's REST API.
//!
//! `GET {base}/v1/subscribers/{id}` returns the subscriber payload, which is
//! normalized through `subsync_classify::snapshot_adapter`. The API key is
//! passed in by the caller (resolved from the env var named in config) and
//! is never logged.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use subsync_classify::snapshot_adapter::{normalize, RawSubscriberResponse};
use subsync_runtime::{BillingClient, BillingError, Clock, SystemClock};
use subsync_schemas::EntitlementSnapshot;

const MAX_ERROR_BODY: usize = 512;

#[derive(Clone)]
pub struct HttpBillingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    /// Billing-side anonymous id to alias onto the app user on link.
    provisional_id: Option<String>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for HttpBillingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBillingClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<REDACTED>")
            .field("provisional_id", &self.provisional_id)
            .finish()
    }
}

#[derive(Serialize)]
struct AliasRequest<'a> {
    new_app_user_id: &'a str,
}

impl HttpBillingClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            provisional_id: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_provisional_id(mut self, id: impl Into<String>) -> Self {
        self.provisional_id = Some(id.into());
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// `{base}/v1/subscribers/{id}[/{suffix}]` with `id` percent-encoded.
    fn subscriber_url(&self, id: &str, suffix: Option<&str>) -> Result<reqwest::Url, BillingError> {
        let mut url = reqwest::Url::parse(self.base_url.trim_end_matches('/'))
            .map_err(|e| BillingError::Unreachable(format!("bad base url: {e}")))?;
        {
            let mut segs = url
                .path_segments_mut()
                .map_err(|_| BillingError::Unreachable("base url cannot hold a path".to_string()))?;
            segs.pop_if_empty().extend(["v1", "subscribers", id]);
            if let Some(s) = suffix {
                segs.push(s);
            }
        }
        Ok(url)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, BillingError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let mut body = resp.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(BillingError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch_raw(&self, user_id: &str) -> Result<RawSubscriberResponse, BillingError> {
        let url = self.subscriber_url(user_id, None)?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| BillingError::Unreachable(e.to_string()))?;
        let resp = Self::check(resp).await?;
        resp.json::<RawSubscriberResponse>()
            .await
            .map_err(|e| BillingError::Malformed(format!("subscriber json decode failed: {e}")))
    }
}

#[async_trait]
impl BillingClient for HttpBillingClient {
    async fn entitlement_snapshot(
        &self,
        user_id: &str,
    ) -> Result<EntitlementSnapshot, BillingError> {
        let raw = self.fetch_raw(user_id).await?;
        let snap = normalize(raw, self.clock.now())
            .map_err(|e| BillingError::Malformed(e.to_string()))?;
        tracing::debug!(
            user_id,
            active = snap.active_entitlements.len(),
            total = snap.all_entitlements.len(),
            "subscriber snapshot fetched"
        );
        Ok(snap)
    }

    async fn link_user(&self, user_id: &str) -> Result<(), BillingError> {
        match self.provisional_id.as_deref() {
            Some(anon) if anon != user_id => {
                let url = self.subscriber_url(anon, Some("alias"))?;
                let resp = self
                    .http
                    .post(url)
                    .bearer_auth(&self.api_key)
                    .json(&AliasRequest {
                        new_app_user_id: user_id,
                    })
                    .send()
                    .await
                    .map_err(|e| BillingError::Unreachable(e.to_string()))?;
                Self::check(resp).await?;
                tracing::info!(user_id, "provisional billing id aliased to app user");
            }
            // Fetching creates the subscriber under the app user id if absent.
            _ => {
                self.fetch_raw(user_id).await?;
            }
        }
        Ok(())
    }
}
