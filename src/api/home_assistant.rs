use std::time::Duration;

use reqwest::{
    Client,
    ClientBuilder,
    Url,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::Deserialize;
use serde_with::serde_as;

use crate::prelude::*;

/// Home Assistant REST API.
pub struct Api {
    client: Client,
    base_url: Url,
}

impl Api {
    pub fn try_new(access_token: &str, base_url: Url) -> Result<Self> {
        let mut authorization = HeaderValue::from_str(&format!("Bearer {access_token}"))
            .context("the access token is not a valid header value")?;
        authorization.set_sensitive(true);
        let client = ClientBuilder::new()
            .default_headers(HeaderMap::from_iter([(AUTHORIZATION, authorization)]))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, base_url })
    }

    #[instrument(skip_all, fields(entity_id = entity_id))]
    pub async fn get_state(&self, entity_id: &str) -> Result<EntityState> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("invalid base URL"))?
            .pop_if_empty()
            .push("states")
            .push(entity_id);
        let state: EntityState = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to request the state of `{entity_id}`"))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("failed to deserialize the state of `{entity_id}`"))?;
        debug!(value = ?state.value, "fetched");
        Ok(state)
    }

    /// Numeric entity state, or `None` when it is unavailable for whatever reason.
    pub async fn get_value(&self, entity_id: &str) -> Option<f64> {
        match self.get_state(entity_id).await {
            Ok(state) => {
                let value = state.value();
                if value.is_none() {
                    warn!(entity_id, "the entity has no numeric state");
                }
                value
            }
            Err(error) => {
                warn!(entity_id, error = format!("{error:#}"), "failed to read the entity");
                None
            }
        }
    }
}

#[must_use]
#[serde_as]
#[derive(Deserialize)]
pub struct EntityState {
    /// `None` for `unknown`, `unavailable`, and anything else that is not a number.
    #[serde_as(as = "serde_with::DefaultOnError<Option<serde_with::DisplayFromStr>>")]
    #[serde(rename = "state", default)]
    value: Option<f64>,
}

impl EntityState {
    pub fn value(&self) -> Option<f64> {
        self.value.filter(|value| value.is_finite())
    }
}
