use bon::Builder;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::{
    accumulator::state::{MonthlyConsumption, StateDocument},
    calendar::{Calendar, TariffPeriod, days_in_month},
    catalog::Provider,
    levy::{SubsidyPolicy, TaxZone, Taxes},
    quantity::{cost::Cost, energy::KilowattHours, power::Kilowatts, rate::KilowattHourRate},
    tier::{CapacityTiers, TierRange},
};

/// Everything needed to price one tick.
#[derive(Builder)]
pub struct Pricing<'a> {
    now: NaiveDateTime,
    provider: &'a Provider,
    calendar: &'a Calendar,
    state: &'a StateDocument,

    /// Falls back to the provider's default zone.
    tax_zone: Option<TaxZone>,

    /// Overrides the provider's day rate.
    day_rate: Option<KilowattHourRate>,

    /// Overrides the provider's night rate.
    night_rate: Option<KilowattHourRate>,

    #[builder(default)]
    power: Kilowatts,

    #[builder(default)]
    spot_price: KilowattHourRate,

    retail_price: Option<KilowattHourRate>,

    #[builder(default)]
    subsidy_policy: SubsidyPolicy,

    /// The household pays the national fixed price (norgespris) instead of the spot price.
    #[builder(default)]
    has_national_fixed_price: bool,
}

impl Pricing<'_> {
    pub fn compute(&self) -> PricedSnapshot {
        let tax_zone = self.tax_zone.unwrap_or_else(|| self.provider.default_tax_zone());
        let taxes = tax_zone.taxes();
        let rates = EnergyRates {
            day: self.day_rate.unwrap_or(self.provider.day_rate),
            night: self.night_rate.unwrap_or(self.provider.night_rate),
        };

        let tariff_period = self.calendar.tariff_period(self.now);
        let energy_rate = rates.get(tariff_period);

        let average_peak = self.state.average_peak();
        let tier = self.provider.capacity_tiers.resolve(average_peak);
        let hours_in_month = f64::from(days_in_month(self.now.date())) * 24.0;
        let capacity_rate = KilowattHourRate::from(tier.fee.0 / hours_in_month);

        let subsidy = if self.has_national_fixed_price {
            KilowattHourRate::ZERO
        } else {
            self.subsidy_policy.subsidy(self.spot_price)
        };
        let national_fixed_price = tax_zone.national_fixed_price();
        let grid_price = energy_rate + capacity_rate;

        let total_price_national_fixed = national_fixed_price + grid_price;
        let (total_price, total_price_without_subsidy) = if self.has_national_fixed_price {
            (total_price_national_fixed, total_price_national_fixed)
        } else {
            (self.spot_price - subsidy + grid_price, self.spot_price + grid_price)
        };
        let savings_vs_national_fixed = if self.has_national_fixed_price {
            KilowattHourRate::ZERO
        } else {
            total_price.round_to(4) - total_price_national_fixed.round_to(4)
        };

        let month = MonthlyTotals::new(
            self.state.monthly_consumption,
            rates,
            tier.fee,
            taxes,
            subsidy,
        );
        let previous_month_average_peak = self.state.previous_month_average_peak();
        let previous_month = PreviousMonth {
            name: self.state.previous_month_name.clone(),
            consumption: round_consumption(self.state.previous_month_consumption),
            average_peak: previous_month_average_peak.unwrap_or_default().round_to(2),
            top3_peaks: round_peaks(self.state.previous_month_top3_peaks()),
            grid_rent: GridRent::new(
                self.state.previous_month_consumption,
                rates,
                previous_month_capacity_fee(
                    &self.provider.capacity_tiers,
                    previous_month_average_peak,
                ),
            ),
        };

        PricedSnapshot {
            provider_name: self.provider.name.clone(),
            tax_zone,
            has_national_fixed_price: self.has_national_fixed_price,
            tariff_period,
            energy_rate: energy_rate.round_to(4),
            day_rate: rates.day,
            night_rate: rates.night,
            capacity_fee: tier.fee,
            tier_number: tier.number,
            tier_range: tier.range,
            capacity_rate: capacity_rate.round_to(4),
            spot_price: self.spot_price.round_to(4),
            subsidy,
            spot_price_after_subsidy: (self.spot_price - subsidy).round_to(4),
            national_fixed_price: national_fixed_price.round_to(4),
            total_price: total_price.round_to(4),
            total_price_without_subsidy: total_price_without_subsidy.round_to(4),
            total_price_national_fixed: total_price_national_fixed.round_to(4),
            savings_vs_national_fixed: savings_vs_national_fixed.round_to(4),
            total_price_with_levies: (total_price + taxes.public_levies()).round_to(4),
            consumption_tax: taxes.consumption_tax_with_vat().round_to(4),
            energy_fund_levy: taxes.energy_fund_levy_with_vat().round_to(4),
            public_levies: taxes.public_levies().round_to(4),
            retail_price: self.retail_price.map(|price| price.round_to(4)),
            retail_total: self.retail_price.map(|price| (price + grid_price).round_to(4)),
            power: self.power.round_to(2),
            average_peak: average_peak.round_to(2),
            top3_peaks: round_peaks(self.state.top3_peaks()),
            month,
            previous_month,
        }
    }
}

/// Priced breakdown of one tick, per kilowatt-hour unless stated otherwise.
#[must_use]
#[derive(Clone, Debug, Serialize)]
pub struct PricedSnapshot {
    pub provider_name: String,
    pub tax_zone: TaxZone,
    pub has_national_fixed_price: bool,
    pub tariff_period: TariffPeriod,

    /// Energy rate (energiledd) in effect.
    pub energy_rate: KilowattHourRate,

    pub day_rate: KilowattHourRate,
    pub night_rate: KilowattHourRate,

    /// Monthly capacity fee (kapasitetsledd) of the current tier.
    pub capacity_fee: Cost,

    pub tier_number: usize,
    pub tier_range: TierRange,

    /// Capacity fee spread evenly over the hours of the month.
    pub capacity_rate: KilowattHourRate,

    pub spot_price: KilowattHourRate,
    pub subsidy: KilowattHourRate,
    pub spot_price_after_subsidy: KilowattHourRate,
    pub national_fixed_price: KilowattHourRate,
    pub total_price: KilowattHourRate,
    pub total_price_without_subsidy: KilowattHourRate,
    pub total_price_national_fixed: KilowattHourRate,

    /// Positive when the national fixed price would have been cheaper.
    pub savings_vs_national_fixed: KilowattHourRate,

    pub total_price_with_levies: KilowattHourRate,
    pub consumption_tax: KilowattHourRate,
    pub energy_fund_levy: KilowattHourRate,
    pub public_levies: KilowattHourRate,
    pub retail_price: Option<KilowattHourRate>,
    pub retail_total: Option<KilowattHourRate>,
    pub power: Kilowatts,
    pub average_peak: Kilowatts,
    pub top3_peaks: Vec<(NaiveDate, Kilowatts)>,
    pub month: MonthlyTotals,
    pub previous_month: PreviousMonth,
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct EnergyRates {
    day: KilowattHourRate,
    night: KilowattHourRate,
}

impl EnergyRates {
    const fn get(self, period: TariffPeriod) -> KilowattHourRate {
        match period {
            TariffPeriod::Day => self.day,
            TariffPeriod::Night => self.night,
        }
    }
}

/// Grid rent (nettleie) of a month.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct GridRent {
    pub day_energy: Cost,
    pub night_energy: Cost,
    pub capacity: Cost,
    pub total: Cost,
}

impl GridRent {
    fn new(consumption: MonthlyConsumption, rates: EnergyRates, capacity_fee: Cost) -> Self {
        let consumption = round_consumption(consumption);
        let day_energy = consumption.day * rates.day;
        let night_energy = consumption.night * rates.night;
        Self {
            day_energy: day_energy.round_to_ore(),
            night_energy: night_energy.round_to_ore(),
            capacity: capacity_fee,
            total: (day_energy + night_energy + capacity_fee).round_to_ore(),
        }
    }
}

/// Running totals of the current month.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct MonthlyTotals {
    pub consumption: MonthlyConsumption,
    pub total_consumption: KilowattHours,
    pub grid_rent: GridRent,

    /// Consumption tax and energy fund levy including VAT.
    pub levies: Cost,

    /// Rough estimate based on the current subsidy rate.
    pub estimated_subsidy: Cost,

    /// Grid rent plus levies minus the subsidy.
    pub total: Cost,
}

impl MonthlyTotals {
    fn new(
        consumption: MonthlyConsumption,
        rates: EnergyRates,
        capacity_fee: Cost,
        taxes: Taxes,
        subsidy: KilowattHourRate,
    ) -> Self {
        let consumption = round_consumption(consumption);
        let total_consumption = consumption.total().round_to(3);
        let grid_rent = GridRent::new(consumption, rates, capacity_fee);
        let levies = total_consumption * taxes.public_levies();
        let estimated_subsidy = total_consumption * subsidy;
        let raw_grid_rent = consumption.day * rates.day + consumption.night * rates.night + capacity_fee;
        Self {
            consumption,
            total_consumption,
            grid_rent,
            levies: levies.round_to_ore(),
            estimated_subsidy: estimated_subsidy.round_to_ore(),
            total: (raw_grid_rent + levies - estimated_subsidy).round_to_ore(),
        }
    }
}

/// Frozen figures of the previous month, for invoice verification.
#[must_use]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PreviousMonth {
    /// For example, `januar 2026`.
    pub name: Option<String>,

    pub consumption: MonthlyConsumption,
    pub average_peak: Kilowatts,
    pub top3_peaks: Vec<(NaiveDate, Kilowatts)>,

    /// At the current energy rates.
    pub grid_rent: GridRent,
}

/// No recorded peaks means no capacity fee.
fn previous_month_capacity_fee(tiers: &CapacityTiers, average_peak: Option<Kilowatts>) -> Cost {
    average_peak.map_or(Cost::ZERO, |average_peak| tiers.resolve(average_peak).fee)
}

fn round_consumption(consumption: MonthlyConsumption) -> MonthlyConsumption {
    MonthlyConsumption { day: consumption.day.round_to(3), night: consumption.night.round_to(3) }
}

fn round_peaks(
    peaks: impl IntoIterator<Item = (NaiveDate, Kilowatts)>,
) -> Vec<(NaiveDate, Kilowatts)> {
    peaks.into_iter().map(|(date, peak)| (date, peak.round_to(2))).collect()
}
