mod raw;

use std::{collections::BTreeMap, fmt::Debug, fs, path::Path};

use serde::{Deserialize, Serialize};

use self::raw::RawCatalog;
use crate::{
    levy::TaxZone,
    prelude::*,
    quantity::rate::KilowattHourRate,
    tier::CapacityTiers,
};

/// Catalog shipped with the binary.
const EMBEDDED: &str = include_str!("../data/providers.toml");

/// Grid operator key, also used to key the persisted state.
#[derive(
    Clone,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::FromStr,
)]
pub struct ProviderId(String);

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Grid operator (TSO) tariff.
#[must_use]
#[derive(Clone, Debug)]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,

    /// Price area code, `NO1`…`NO5`.
    pub price_area: String,

    pub day_rate: KilowattHourRate,
    pub night_rate: KilowattHourRate,
    pub capacity_tiers: CapacityTiers,

    /// Where the prices come from.
    pub url: Option<String>,

    /// Tax zone declared by the operator, when it differs from the price area default.
    pub tax_zone: Option<TaxZone>,
}

impl Provider {
    pub fn default_tax_zone(&self) -> TaxZone {
        self.tax_zone.unwrap_or_else(|| TaxZone::for_price_area(&self.price_area))
    }
}

/// Merger of a retired operator into its successor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Migration {
    pub from: ProviderId,
    pub to: ProviderId,
}

/// Immutable table of grid operators, validated once at startup.
#[must_use]
pub struct Catalog {
    providers: BTreeMap<ProviderId, Provider>,

    /// Retired key → successor key.
    migrations: BTreeMap<ProviderId, ProviderId>,
}

impl Catalog {
    pub fn embedded() -> Result<Self> {
        Self::from_toml(EMBEDDED).context("the embedded provider catalog is invalid")
    }

    #[instrument(name = "Reading the provider catalog…")]
    pub fn read_from<P: AsRef<Path> + Debug>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("`{}` is invalid", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str::<RawCatalog>(text)?.try_into()
    }

    pub fn try_new(
        providers: impl IntoIterator<Item = Provider>,
        migrations: impl IntoIterator<Item = Migration>,
    ) -> Result<Self> {
        let providers: BTreeMap<_, _> =
            providers.into_iter().map(|provider| (provider.id.clone(), provider)).collect();
        let mut index = BTreeMap::new();
        for Migration { from, to } in migrations {
            ensure!(
                providers.contains_key(&to),
                "migration target `{to}` (from `{from}`) is not in the catalog",
            );
            ensure!(
                !providers.contains_key(&from),
                "retired provider `{from}` is still listed in the catalog",
            );
            ensure!(
                index.insert(from.clone(), to).is_none(),
                "provider `{from}` is migrated more than once",
            );
        }
        Ok(Self { providers, migrations: index })
    }

    pub fn get(&self, id: &ProviderId) -> Result<&Provider> {
        self.providers.get(id).with_context(|| format!("unknown provider `{id}`"))
    }

    /// Successor of a retired provider.
    pub fn successor(&self, id: &ProviderId) -> Option<Migration> {
        self.migrations.get(id).map(|to| Migration { from: id.clone(), to: to.clone() })
    }

    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.providers.values()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }
}
