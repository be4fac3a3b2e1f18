//! HTTP subscription portal client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::client::{EligibleTrials, SubscriptionPortal};
use super::error::PortalError;
use crate::local::LocalConfig;
use crate::types::{NamespaceId, TrialType};

const ELIGIBILITY_PATH: &str = "api/v1/gitlab/namespaces/trials/eligibility";

/// Subscription portal over HTTP, authenticated with admin headers.
pub struct HttpPortal {
    client: Client,
    base_url: Url,
    admin_email: String,
    admin_token: SecretString,
}

impl HttpPortal {
    pub fn new(
        base_url: &str,
        admin_email: String,
        admin_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, PortalError> {
        // Trailing slash so `join` appends rather than replacing the last segment.
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
        let client = Client::builder()
            .user_agent(concat!("seatcap/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url,
            admin_email,
            admin_token,
        })
    }

    /// Build a client from local config. Fails if credentials are missing.
    pub fn from_config(config: &LocalConfig) -> Result<Self, PortalError> {
        if !config.has_portal_credentials() {
            return Err(PortalError::MissingCredentials);
        }
        let (Some(email), Some(token)) = (
            config.portal_admin_email.clone(),
            config.portal_admin_token_secret(),
        ) else {
            return Err(PortalError::MissingCredentials);
        };

        Self::new(
            &config.portal_base_url,
            email,
            token,
            config.portal_timeout(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct EligibilityResponse {
    #[serde(default)]
    namespaces: HashMap<String, Vec<String>>,
}

#[async_trait]
impl SubscriptionPortal for HttpPortal {
    async fn namespace_eligible_trials(
        &self,
        namespace_ids: &[NamespaceId],
    ) -> Result<EligibleTrials, PortalError> {
        let mut url = self.base_url.join(ELIGIBILITY_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            for id in namespace_ids {
                query.append_pair("namespace_ids[]", &id.to_string());
            }
        }
        debug!(count = namespace_ids.len(), url = %url, "fetching trial eligibility");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .header("X-Admin-Email", &self.admin_email)
            .header("X-Admin-Token", self.admin_token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortalError::Status { status, body });
        }

        let body: EligibilityResponse = serde_json::from_slice(&response.bytes().await?)?;

        let mut eligible = EligibleTrials::with_capacity(body.namespaces.len());
        for (id, tags) in body.namespaces {
            match id.parse::<NamespaceId>() {
                Ok(id) => {
                    eligible.insert(id, TrialType::parse_tags(&tags));
                }
                Err(_) => warn!(namespace_id = %id, "ignoring non-numeric namespace id from portal"),
            }
        }

        Ok(eligible)
    }
}
