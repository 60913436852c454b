use chrono::Local;
use clap::Parser;

use crate::{
    cli::TariffArgs,
    prelude::*,
    quantity::power::Kilowatts,
    tables::{PREVIOUS_MONTH_FIELDS, build_descriptor_table, build_peaks_table},
};

#[derive(Parser)]
pub struct InvoiceArgs {
    #[clap(flatten)]
    tariff: TariffArgs,
}

impl InvoiceArgs {
    /// Applies a pending month rollover first, so the figures are those of the month just ended.
    pub async fn run(self) -> Result {
        let now = Local::now().naive_local();
        let mut tariff = self.tariff.open().await?;
        tariff.tick(now, Kilowatts::ZERO).await?;
        let snapshot = tariff.pricing(now, Kilowatts::ZERO, None, None).compute();

        let Some(name) = &snapshot.previous_month.name else {
            warn!("no month has been completed yet");
            return Ok(());
        };
        println!("{}", build_descriptor_table(name, PREVIOUS_MONTH_FIELDS, &snapshot));
        println!("{}", build_peaks_table(&snapshot.previous_month.top3_peaks));
        Ok(())
    }
}
