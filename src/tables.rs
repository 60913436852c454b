use chrono::NaiveDate;
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{
    catalog::Catalog,
    pricing::PricedSnapshot,
    quantity::{power::Kilowatts, rate::KilowattHourRate},
};

/// Output field: how to label, format, and derive it from a snapshot.
pub struct Descriptor {
    pub label: &'static str,
    pub unit: &'static str,
    pub precision: usize,
    pub value: fn(&PricedSnapshot) -> Option<f64>,

    /// Color by value, when the sign matters.
    pub color: Option<fn(f64) -> Color>,
}

impl Descriptor {
    const fn new(
        label: &'static str,
        unit: &'static str,
        precision: usize,
        value: fn(&PricedSnapshot) -> Option<f64>,
    ) -> Self {
        Self { label, unit, precision, value, color: None }
    }

    const fn colored(self, color: fn(f64) -> Color) -> Self {
        Self { color: Some(color), ..self }
    }

    pub fn format(&self, snapshot: &PricedSnapshot) -> Option<String> {
        (self.value)(snapshot).map(|value| format!("{value:.precision$}", precision = self.precision))
    }
}

const RATE: &str = "kr/kWh";

fn red_when_positive(value: f64) -> Color {
    if value > 0.0 { Color::Red } else { Color::Green }
}

pub const PRICE_FIELDS: &[Descriptor] = &[
    Descriptor::new("Energy rate", RATE, 4, |s| Some(s.energy_rate.0)),
    Descriptor::new("Day rate", RATE, 4, |s| Some(s.day_rate.0)),
    Descriptor::new("Night rate", RATE, 4, |s| Some(s.night_rate.0)),
    Descriptor::new("Capacity fee", "kr/month", 0, |s| Some(s.capacity_fee.0)),
    Descriptor::new("Capacity fee per kWh", RATE, 4, |s| Some(s.capacity_rate.0)),
    Descriptor::new("Spot price", RATE, 4, |s| Some(s.spot_price.0)),
    Descriptor::new("Subsidy", RATE, 4, |s| Some(s.subsidy.0)),
    Descriptor::new("Spot price after subsidy", RATE, 4, |s| Some(s.spot_price_after_subsidy.0)),
    Descriptor::new("National fixed price", RATE, 4, |s| Some(s.national_fixed_price.0)),
    Descriptor::new("Total price", RATE, 4, |s| Some(s.total_price.0)),
    Descriptor::new("Total price without subsidy", RATE, 4, |s| {
        Some(s.total_price_without_subsidy.0)
    }),
    Descriptor::new("Total price at national fixed price", RATE, 4, |s| {
        Some(s.total_price_national_fixed.0)
    }),
    Descriptor::new("Extra cost vs national fixed price", RATE, 4, |s| {
        Some(s.savings_vs_national_fixed.0)
    })
    .colored(red_when_positive),
    Descriptor::new("Total price with levies", RATE, 4, |s| Some(s.total_price_with_levies.0)),
    Descriptor::new("Consumption tax", RATE, 4, |s| Some(s.consumption_tax.0)),
    Descriptor::new("Energy fund levy", RATE, 4, |s| Some(s.energy_fund_levy.0)),
    Descriptor::new("Public levies", RATE, 4, |s| Some(s.public_levies.0)),
    Descriptor::new("Retail price", RATE, 4, |s| s.retail_price.map(|price| price.0)),
    Descriptor::new("Retail total", RATE, 4, |s| s.retail_total.map(|price| price.0)),
];

pub const MONTH_FIELDS: &[Descriptor] = &[
    Descriptor::new("Current power", "kW", 2, |s| Some(s.power.0)),
    Descriptor::new("Average top-3 peak", "kW", 2, |s| Some(s.average_peak.0)),
    Descriptor::new("Day consumption", "kWh", 3, |s| Some(s.month.consumption.day.0)),
    Descriptor::new("Night consumption", "kWh", 3, |s| Some(s.month.consumption.night.0)),
    Descriptor::new("Total consumption", "kWh", 3, |s| Some(s.month.total_consumption.0)),
    Descriptor::new("Grid rent", "kr", 2, |s| Some(s.month.grid_rent.total.0)),
    Descriptor::new("Levies", "kr", 2, |s| Some(s.month.levies.0)),
    Descriptor::new("Estimated subsidy", "kr", 2, |s| Some(s.month.estimated_subsidy.0)),
    Descriptor::new("Total", "kr", 2, |s| Some(s.month.total.0)),
];

pub const PREVIOUS_MONTH_FIELDS: &[Descriptor] = &[
    Descriptor::new("Day consumption", "kWh", 3, |s| Some(s.previous_month.consumption.day.0)),
    Descriptor::new("Night consumption", "kWh", 3, |s| {
        Some(s.previous_month.consumption.night.0)
    }),
    Descriptor::new("Total consumption", "kWh", 3, |s| {
        Some(s.previous_month.consumption.total().0)
    }),
    Descriptor::new("Average top-3 peak", "kW", 2, |s| Some(s.previous_month.average_peak.0)),
    Descriptor::new("Day energy", "kr", 2, |s| Some(s.previous_month.grid_rent.day_energy.0)),
    Descriptor::new("Night energy", "kr", 2, |s| Some(s.previous_month.grid_rent.night_energy.0)),
    Descriptor::new("Capacity fee", "kr", 2, |s| Some(s.previous_month.grid_rent.capacity.0)),
    Descriptor::new("Grid rent", "kr", 2, |s| Some(s.previous_month.grid_rent.total.0)),
];

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table
}

pub fn build_descriptor_table(
    title: &str,
    descriptors: &[Descriptor],
    snapshot: &PricedSnapshot,
) -> Table {
    let mut table = new_table();
    table.set_header(vec![title, "Value", "Unit"]);
    for descriptor in descriptors {
        let Some(formatted) = descriptor.format(snapshot) else {
            continue;
        };
        let mut value = Cell::new(formatted).set_alignment(CellAlignment::Right);
        if let (Some(color), Some(raw)) = (descriptor.color, (descriptor.value)(snapshot)) {
            value = value.fg(color(raw));
        }
        table.add_row(vec![
            Cell::new(descriptor.label),
            value,
            Cell::new(descriptor.unit).add_attribute(Attribute::Dim),
        ]);
    }
    table
}

pub fn build_summary_table(snapshot: &PricedSnapshot) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Provider", "Tax zone", "Period", "Tier", "National fixed price"]);
    table.add_row(vec![
        Cell::new(&snapshot.provider_name),
        Cell::new(snapshot.tax_zone),
        Cell::new(snapshot.tariff_period),
        Cell::new(format!("#{} ({})", snapshot.tier_number, snapshot.tier_range)),
        Cell::new(if snapshot.has_national_fixed_price { "yes" } else { "no" }),
    ]);
    table
}

pub fn build_peaks_table(peaks: &[(NaiveDate, Kilowatts)]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Date", "Peak"]);
    for (date, peak) in peaks {
        table.add_row(vec![
            Cell::new(date.format("%Y-%m-%d")),
            Cell::new(peak).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

pub fn build_providers_table(catalog: &Catalog) -> Table {
    let mut table = new_table();
    table.set_header(vec!["ID", "Name", "Area", "Tax zone", "Day", "Night", "Tiers", "Top fee"]);
    for provider in catalog.providers() {
        let top_fee = provider.capacity_tiers.last().map(|tier| tier.fee);
        table.add_row(vec![
            Cell::new(&provider.id).add_attribute(Attribute::Bold),
            Cell::new(&provider.name),
            Cell::new(&provider.price_area),
            Cell::new(provider.default_tax_zone()),
            rate_cell(provider.day_rate),
            rate_cell(provider.night_rate),
            Cell::new(provider.capacity_tiers.len()).set_alignment(CellAlignment::Right),
            Cell::new(top_fee.map(|fee| fee.to_string()).unwrap_or_default())
                .set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

fn rate_cell(rate: KilowattHourRate) -> Cell {
    Cell::new(rate).set_alignment(CellAlignment::Right)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        accumulator::state::{MonthlyConsumption, StateDocument},
        calendar::Calendar,
        catalog::ProviderId,
        pricing::Pricing,
        quantity::energy::KilowattHours,
    };

    fn snapshot(retail_price: Option<KilowattHourRate>) -> PricedSnapshot {
        let catalog = Catalog::embedded().unwrap();
        let provider = catalog.get(&ProviderId::from("bkk")).unwrap();
        let calendar = Calendar::default();
        let state = StateDocument {
            daily_max_power: BTreeMap::from([(
                NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                Kilowatts::from(3.5),
            )]),
            monthly_consumption: MonthlyConsumption {
                day: KilowattHours::from(150.0),
                night: KilowattHours::from(80.0),
            },
            ..StateDocument::default()
        };
        Pricing::builder()
            .now(NaiveDate::from_ymd_opt(2026, 1, 14).unwrap().and_hms_opt(12, 0, 0).unwrap())
            .provider(provider)
            .calendar(&calendar)
            .state(&state)
            .maybe_retail_price(retail_price)
            .build()
            .compute()
    }

    #[test]
    fn test_descriptor_format() {
        let snapshot = snapshot(None);
        let grid_rent = MONTH_FIELDS.iter().find(|field| field.label == "Grid rent").unwrap();
        assert_eq!(grid_rent.format(&snapshot).as_deref(), Some("337.83"));
        let energy_rate = &PRICE_FIELDS[0];
        assert_eq!(energy_rate.format(&snapshot).as_deref(), Some("0.4613"));
    }

    #[test]
    fn test_retail_rows_are_omitted_without_retail_price() {
        let without = build_descriptor_table("Price", PRICE_FIELDS, &snapshot(None)).to_string();
        assert!(!without.contains("Retail"));
        let with = build_descriptor_table("Price", PRICE_FIELDS, &snapshot(Some(0.85.into())))
            .to_string();
        assert!(with.contains("Retail total"));
    }

    #[test]
    fn test_providers_table() {
        let table = build_providers_table(&Catalog::embedded().unwrap()).to_string();
        assert!(table.contains("BKK Nett"));
        assert!(table.contains("barents_nett"));
    }
}
