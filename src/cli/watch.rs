use std::time::Duration;

use chrono::Local;
use clap::Parser;
use reqwest::Url;
use tokio::{
    signal::ctrl_c,
    time::{MissedTickBehavior, interval},
};

use crate::{
    api::home_assistant,
    cli::{Tariff, TariffArgs},
    prelude::*,
    quantity::{power::Kilowatts, rate::KilowattHourRate},
};

#[derive(Parser)]
pub struct WatchArgs {
    #[clap(flatten)]
    tariff: TariffArgs,

    #[clap(long, env = "POLLING_INTERVAL", default_value = "1min")]
    polling_interval: humantime::Duration,

    #[clap(flatten)]
    home_assistant: HomeAssistantArgs,

    /// Instantaneous power sensor, in watts.
    #[clap(long, env = "POWER_ENTITY_ID")]
    power_entity_id: String,

    /// Spot price sensor, kr/kWh including VAT.
    #[clap(long, env = "SPOT_PRICE_ENTITY_ID")]
    spot_price_entity_id: String,

    /// Optional retail price sensor of the electricity supplier, kr/kWh.
    #[clap(long, env = "RETAIL_PRICE_ENTITY_ID")]
    retail_price_entity_id: Option<String>,
}

#[derive(Parser)]
pub struct HomeAssistantArgs {
    /// For example, `http://homeassistant.local:8123/api`.
    #[clap(long = "home-assistant-api-base-url", env = "HOME_ASSISTANT_API_BASE_URL")]
    base_url: Url,

    /// Long-lived access token.
    #[clap(long = "home-assistant-access-token", env = "HOME_ASSISTANT_ACCESS_TOKEN")]
    access_token: String,
}

impl WatchArgs {
    pub async fn run(self) -> Result {
        let api = home_assistant::Api::try_new(
            &self.home_assistant.access_token,
            self.home_assistant.base_url.clone(),
        )?;
        let mut tariff = self.tariff.open().await?;

        let period: Duration = self.polling_interval.into();
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                result = ctrl_c() => {
                    result?;
                    info!("interrupted");
                    break;
                }
            }
            self.tick(&api, &mut tariff).await;
        }

        Ok(())
    }

    /// Read the sensors and price the reading, never failing the loop.
    #[instrument(skip_all)]
    async fn tick(&self, api: &home_assistant::Api, tariff: &mut Tariff<'_>) {
        let now = Local::now().naive_local();
        let (power, spot_price, retail_price) = tokio::join!(
            api.get_value(&self.power_entity_id),
            api.get_value(&self.spot_price_entity_id),
            async {
                match &self.retail_price_entity_id {
                    Some(entity_id) => api.get_value(entity_id).await,
                    None => None,
                }
            },
        );
        let power = power.map_or(Kilowatts::ZERO, Kilowatts::from_watts);

        if let Err(error) = tariff.tick(now, power).await {
            error!(error = format!("{error:#}"), "failed to update the monthly state");
            return;
        }
        let snapshot = tariff
            .pricing(
                now,
                power,
                spot_price.map(KilowattHourRate::from),
                retail_price.map(KilowattHourRate::from),
            )
            .compute();
        info!(
            power = %snapshot.power,
            period = %snapshot.tariff_period,
            total_price = %snapshot.total_price,
            average_peak = %snapshot.average_peak,
            tier = snapshot.tier_number,
            month_total = %snapshot.month.total,
            "priced",
        );
    }
}
