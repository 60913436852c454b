use std::{cmp::Reverse, collections::BTreeMap};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::{
    calendar::TariffPeriod,
    quantity::{energy::KilowattHours, power::Kilowatts},
};

const MONTH_NAMES: [&str; 12] = [
    "januar",
    "februar",
    "mars",
    "april",
    "mai",
    "juni",
    "juli",
    "august",
    "september",
    "oktober",
    "november",
    "desember",
];

/// Persisted accumulator state, one document per provider.
///
/// Every field is optional on read, and the snake-case keys of older documents are accepted too.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StateDocument {
    /// Highest power observed on each day of the current month.
    #[serde(alias = "daily_max_power")]
    pub daily_max_power: BTreeMap<NaiveDate, Kilowatts>,

    #[serde(alias = "monthly_consumption")]
    pub monthly_consumption: MonthlyConsumption,

    /// Month number (1-12) the running totals belong to.
    #[serde(alias = "current_month", skip_serializing_if = "Option::is_none")]
    pub current_month: Option<u32>,

    #[serde(alias = "previous_month_consumption")]
    pub previous_month_consumption: MonthlyConsumption,

    #[serde(alias = "previous_month_top_3")]
    pub previous_month_top3: BTreeMap<NaiveDate, Kilowatts>,

    /// For example, `januar 2026`.
    #[serde(alias = "previous_month_name", skip_serializing_if = "Option::is_none")]
    pub previous_month_name: Option<String>,

    /// Timestamp of the latest sample, the start of the next consumption interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tick: Option<NaiveDateTime>,
}

impl StateDocument {
    /// Up to three highest daily peaks of the current month, highest first.
    pub fn top3_peaks(&self) -> Vec<(NaiveDate, Kilowatts)> {
        top3(&self.daily_max_power)
    }

    /// Capacity tier basis: mean of the top peaks that are actually present.
    pub fn average_peak(&self) -> Kilowatts {
        average(self.top3_peaks().into_iter().map(|(_, peak)| peak))
    }

    /// Frozen top peaks of the previous month, highest first.
    pub fn previous_month_top3_peaks(&self) -> Vec<(NaiveDate, Kilowatts)> {
        top3(&self.previous_month_top3)
    }

    pub fn previous_month_average_peak(&self) -> Option<Kilowatts> {
        (!self.previous_month_top3.is_empty())
            .then(|| average(self.previous_month_top3.values().copied()))
    }
}

fn top3(peaks: &BTreeMap<NaiveDate, Kilowatts>) -> Vec<(NaiveDate, Kilowatts)> {
    peaks
        .iter()
        .map(|(date, peak)| (*date, *peak))
        .sorted_by_key(|(_, peak)| Reverse(OrderedFloat(peak.0)))
        .take(3)
        .collect()
}

fn average(peaks: impl IntoIterator<Item = Kilowatts>) -> Kilowatts {
    let (sum, count) =
        peaks.into_iter().fold((Kilowatts::ZERO, 0_u32), |(sum, count), peak| (sum + peak, count + 1));
    if count == 0 { Kilowatts::ZERO } else { sum / f64::from(count) }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonthlyConsumption {
    #[serde(alias = "dag")]
    pub day: KilowattHours,

    #[serde(alias = "natt")]
    pub night: KilowattHours,
}

impl MonthlyConsumption {
    pub fn total(self) -> KilowattHours {
        self.day + self.night
    }

    pub fn add(&mut self, period: TariffPeriod, energy: KilowattHours) {
        match period {
            TariffPeriod::Day => self.day += energy,
            TariffPeriod::Night => self.night += energy,
        }
    }
}

/// Norwegian label of the calendar month preceding the one of `now`, for example `desember 2025`.
pub fn previous_month_label(now: NaiveDateTime) -> String {
    let last_day_of_previous_month = now.date().with_day(1).and_then(|first| first.pred_opt());
    // Only fails before the beginning of time.
    let date = last_day_of_previous_month.unwrap_or_else(|| now.date());
    format!("{} {}", MONTH_NAMES[date.month0() as usize], date.year())
}
