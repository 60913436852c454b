//! On-disk catalog shapes, normalized into [`Catalog`] at load time.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{
    catalog::{Catalog, Migration, Provider, ProviderId},
    levy::TaxZone,
    prelude::*,
    quantity::{cost::Cost, power::Kilowatts, rate::KilowattHourRate},
    tier::{CapacityTier, CapacityTiers},
};

#[derive(Deserialize)]
pub struct RawCatalog {
    #[serde(default)]
    migrations: Vec<Migration>,

    providers: BTreeMap<ProviderId, RawProvider>,
}

impl TryFrom<RawCatalog> for Catalog {
    type Error = Error;

    fn try_from(raw: RawCatalog) -> Result<Self> {
        let providers = raw
            .providers
            .into_iter()
            .map(|(id, provider)| {
                provider.into_provider(id.clone()).with_context(|| format!("provider `{id}`"))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::try_new(providers, raw.migrations)
    }
}

#[derive(Deserialize)]
struct RawProvider {
    name: String,
    price_area: String,
    day_rate: KilowattHourRate,
    night_rate: KilowattHourRate,
    capacity_tiers: Vec<RawTier>,

    #[serde(default)]
    url: Option<String>,

    #[serde(default)]
    tax_zone: Option<TaxZone>,
}

impl RawProvider {
    fn into_provider(self, id: ProviderId) -> Result<Provider> {
        let mut previous_upper = Kilowatts::ZERO;
        let mut tiers = Vec::with_capacity(self.capacity_tiers.len());
        for (index, tier) in self.capacity_tiers.into_iter().enumerate() {
            let tier = match tier {
                RawTier::Threshold { up_to, fee } => CapacityTier { up_to, fee },
                RawTier::Range { from, to, fee } => {
                    ensure!(
                        from == previous_upper,
                        "tier #{} starts at {from} but the previous one ends at {previous_upper}",
                        index + 1,
                    );
                    CapacityTier { up_to: Some(to), fee }
                }
            };
            if let Some(up_to) = tier.up_to {
                previous_upper = up_to;
            }
            tiers.push(tier);
        }
        Ok(Provider {
            id,
            name: self.name,
            price_area: self.price_area,
            day_rate: self.day_rate,
            night_rate: self.night_rate,
            capacity_tiers: CapacityTiers::try_new(tiers)?,
            url: self.url,
            tax_zone: self.tax_zone,
        })
    }
}

/// Either `{ up_to, fee }` or `{ from, to, fee }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTier {
    Range {
        from: Kilowatts,
        to: Kilowatts,
        fee: Cost,
    },

    Threshold {
        #[serde(default)]
        up_to: Option<Kilowatts>,

        fee: Cost,
    },
}
