mod invoice;
mod providers;
mod tick;
mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::{
    accumulator::MonthlyAccumulator,
    calendar::Calendar,
    catalog::{Catalog, Provider, ProviderId},
    cli::{invoice::InvoiceArgs, providers::ProvidersArgs, tick::TickArgs, watch::WatchArgs},
    levy::{SubsidyPolicy, TaxZone},
    prelude::*,
    pricing::Pricing,
    quantity::{power::Kilowatts, rate::KilowattHourRate},
    store::{FileStore, Store, migrate},
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Price a single reading and update the monthly state.
    #[clap(name = "tick")]
    Tick(Box<TickArgs>),

    /// Poll Home Assistant and price every reading until interrupted.
    #[clap(name = "watch")]
    Watch(Box<WatchArgs>),

    /// List the grid operators in the catalog.
    #[clap(name = "providers")]
    Providers(ProvidersArgs),

    /// Show the previous month's grid rent, for checking the invoice.
    #[clap(name = "invoice")]
    Invoice(Box<InvoiceArgs>),
}

impl Command {
    pub async fn run(self) -> Result {
        match self {
            Self::Tick(args) => args.run().await,
            Self::Watch(args) => args.run().await,
            Self::Providers(args) => args.run(),
            Self::Invoice(args) => args.run().await,
        }
    }
}

#[derive(Parser)]
pub struct CatalogArgs {
    /// Provider catalog in TOML, the built-in one is used when omitted.
    #[clap(long = "catalog", env = "CATALOG_PATH")]
    path: Option<PathBuf>,
}

impl CatalogArgs {
    pub fn load(&self) -> Result<Catalog> {
        let catalog = match &self.path {
            Some(path) => Catalog::read_from(path)?,
            None => Catalog::embedded()?,
        };
        debug!(n_providers = catalog.len(), "loaded the catalog");
        Ok(catalog)
    }
}

#[derive(Parser)]
pub struct TariffArgs {
    /// Grid operator ID, see `nettleie providers`.
    #[clap(long, env = "PROVIDER", default_value = "bkk")]
    provider: ProviderId,

    /// Defaults to the provider's zone.
    #[clap(long, env = "TAX_ZONE", value_enum)]
    tax_zone: Option<TaxZone>,

    /// The household has opted in to the national fixed price (norgespris).
    #[clap(long, env = "NATIONAL_FIXED_PRICE")]
    national_fixed_price: bool,

    /// Override the provider's day energy rate, kr/kWh.
    #[clap(long, env = "DAY_RATE")]
    day_rate: Option<KilowattHourRate>,

    /// Override the provider's night energy rate, kr/kWh.
    #[clap(long, env = "NIGHT_RATE")]
    night_rate: Option<KilowattHourRate>,

    /// Spot price including VAT above which the subsidy kicks in, kr/kWh.
    #[clap(long, env = "SUBSIDY_THRESHOLD", default_value = "0.9625")]
    subsidy_threshold: KilowattHourRate,

    /// Covered share of the spot price above the threshold.
    #[clap(long, env = "SUBSIDY_COVERAGE", default_value = "0.9")]
    subsidy_coverage: f64,

    /// Where the monthly state documents live.
    #[clap(long, env = "STORAGE_DIR", default_value = ".storage")]
    storage_dir: PathBuf,

    #[clap(flatten)]
    catalog: CatalogArgs,
}

impl TariffArgs {
    /// Load the catalog, follow a provider merger, and open the state store.
    #[instrument(skip_all, fields(provider = %self.provider))]
    pub async fn open(&self) -> Result<Tariff> {
        let catalog = self.catalog.load()?;
        let store = FileStore::new(&self.storage_dir);
        let provider = resolve_provider(&catalog, &store, &self.provider).await?.clone();
        info!(name = %provider.name, price_area = %provider.price_area, "using the provider");
        let calendar = Calendar::default();
        let today = chrono::Local::now().date_naive();
        if calendar.movable_holidays_until().is_none_or(|until| until < today) {
            warn!("the movable holiday table has run out, holidays will be billed as regular days");
        }
        let accumulator = MonthlyAccumulator::new(store, provider.id.clone(), calendar);
        Ok(Tariff { args: self, provider, accumulator })
    }

    fn subsidy_policy(&self) -> SubsidyPolicy {
        SubsidyPolicy::builder()
            .threshold(self.subsidy_threshold)
            .coverage(self.subsidy_coverage)
            .build()
    }
}

/// Follow a merger of the provider, moving its stored state over to the successor.
async fn resolve_provider<'c>(
    catalog: &'c Catalog,
    store: &impl Store,
    id: &ProviderId,
) -> Result<&'c Provider> {
    let id = match catalog.successor(id) {
        Some(migration) => {
            info!(to = %migration.to, "the provider has been merged into its successor");
            migrate(store, &migration).await?;
            migration.to
        }
        None => id.clone(),
    };
    catalog.get(&id)
}

/// Resolved provider with its monthly state.
pub struct Tariff<'a> {
    args: &'a TariffArgs,
    provider: Provider,
    accumulator: MonthlyAccumulator<FileStore>,
}

impl Tariff<'_> {
    pub async fn tick(&mut self, now: chrono::NaiveDateTime, power: Kilowatts) -> Result {
        self.accumulator.tick(now, power).await
    }

    pub fn pricing(
        &self,
        now: chrono::NaiveDateTime,
        power: Kilowatts,
        spot_price: Option<KilowattHourRate>,
        retail_price: Option<KilowattHourRate>,
    ) -> Pricing<'_> {
        Pricing::builder()
            .now(now)
            .provider(&self.provider)
            .calendar(self.accumulator.calendar())
            .state(self.accumulator.state())
            .maybe_tax_zone(self.args.tax_zone)
            .maybe_day_rate(self.args.day_rate)
            .maybe_night_rate(self.args.night_rate)
            .power(power)
            .spot_price(spot_price.unwrap_or_default())
            .maybe_retail_price(retail_price)
            .subsidy_policy(self.args.subsidy_policy())
            .has_national_fixed_price(self.args.national_fixed_price)
            .build()
    }
}
