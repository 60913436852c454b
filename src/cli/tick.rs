use chrono::{Local, NaiveDateTime};
use clap::Parser;

use crate::{
    cli::TariffArgs,
    prelude::*,
    quantity::{power::Kilowatts, rate::KilowattHourRate},
    tables::{
        MONTH_FIELDS,
        PREVIOUS_MONTH_FIELDS,
        PRICE_FIELDS,
        build_descriptor_table,
        build_peaks_table,
        build_summary_table,
    },
};

#[derive(Parser)]
pub struct TickArgs {
    #[clap(flatten)]
    tariff: TariffArgs,

    /// Instantaneous power draw in watts, treated as zero when omitted.
    #[clap(long)]
    power_watts: Option<f64>,

    /// Spot price including VAT, kr/kWh.
    #[clap(long)]
    spot_price: Option<KilowattHourRate>,

    /// Retail price from the electricity supplier, kr/kWh.
    #[clap(long)]
    retail_price: Option<KilowattHourRate>,

    /// Reading timestamp, defaults to now.
    #[clap(long)]
    at: Option<NaiveDateTime>,

    /// Print the snapshot as JSON instead of tables.
    #[clap(long)]
    json: bool,
}

impl TickArgs {
    pub async fn run(self) -> Result {
        let now = self.at.unwrap_or_else(|| Local::now().naive_local());
        let power = self.power_watts.map_or(Kilowatts::ZERO, Kilowatts::from_watts);

        let mut tariff = self.tariff.open().await?;
        tariff.tick(now, power).await?;
        let snapshot = tariff.pricing(now, power, self.spot_price, self.retail_price).compute();
        info!(total_price = %snapshot.total_price, tier = snapshot.tier_number, "priced");

        if self.json {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        } else {
            println!("{}", build_summary_table(&snapshot));
            println!("{}", build_descriptor_table("Price", PRICE_FIELDS, &snapshot));
            println!("{}", build_descriptor_table("This month", MONTH_FIELDS, &snapshot));
            println!("{}", build_peaks_table(&snapshot.top3_peaks));
            if let Some(name) = &snapshot.previous_month.name {
                println!("{}", build_descriptor_table(name, PREVIOUS_MONTH_FIELDS, &snapshot));
            }
        }
        Ok(())
    }
}
