use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// Grid tariff period: the day rate applies on working days from 06:00 until 22:00.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TariffPeriod {
    Day,
    Night,
}

impl Display for TariffPeriod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Day => write!(f, "day"),
            Self::Night => write!(f, "night"),
        }
    }
}

/// Holiday calendar used to pick the tariff period.
///
/// Movable (Easter-linked) holidays are tabulated rather than computed,
/// so the table needs a new row every year.
#[must_use]
#[derive(Clone, Debug)]
pub struct Calendar {
    /// `(month, day)` pairs repeating every year.
    fixed_holidays: BTreeSet<(u32, u32)>,

    movable_holidays: BTreeSet<NaiveDate>,
}

impl Default for Calendar {
    /// Norwegian public holidays.
    fn default() -> Self {
        Self::new(
            [
                (1, 1),   // New Year's Day
                (5, 1),   // Labour Day
                (5, 17),  // Constitution Day
                (12, 25), // Christmas Day
                (12, 26), // Boxing Day
            ],
            [
                (2026, 4, 2),
                (2026, 4, 3),
                (2026, 4, 5),
                (2026, 4, 6),
                (2026, 5, 14),
                (2026, 5, 24),
                (2026, 5, 25),
                (2027, 3, 25),
                (2027, 3, 26),
                (2027, 3, 28),
                (2027, 3, 29),
                (2027, 5, 6),
                (2027, 5, 16),
                (2027, 5, 17),
            ]
            .into_iter()
            .filter_map(|(year, month, day)| NaiveDate::from_ymd_opt(year, month, day)),
        )
    }
}

impl Calendar {
    pub fn new(
        fixed_holidays: impl IntoIterator<Item = (u32, u32)>,
        movable_holidays: impl IntoIterator<Item = NaiveDate>,
    ) -> Self {
        Self {
            fixed_holidays: fixed_holidays.into_iter().collect(),
            movable_holidays: movable_holidays.into_iter().collect(),
        }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.fixed_holidays.contains(&(date.month(), date.day()))
            || self.movable_holidays.contains(&date)
    }

    pub fn is_day_rate(&self, timestamp: NaiveDateTime) -> bool {
        let is_weekend = matches!(timestamp.weekday(), Weekday::Sat | Weekday::Sun);
        let is_night = !(6..22).contains(&timestamp.hour());
        !(is_weekend || is_night || self.is_holiday(timestamp.date()))
    }

    pub fn tariff_period(&self, timestamp: NaiveDateTime) -> TariffPeriod {
        if self.is_day_rate(timestamp) { TariffPeriod::Day } else { TariffPeriod::Night }
    }

    /// Latest date covered by the movable holiday table.
    pub fn movable_holidays_until(&self) -> Option<NaiveDate> {
        self.movable_holidays.last().copied()
    }
}

/// Number of days in the month of `date`.
pub fn days_in_month(date: NaiveDate) -> u32 {
    date.with_day(1)
        .and_then(|first| Some((first, first.checked_add_months(Months::new(1))?)))
        .and_then(|(first, next)| u32::try_from((next - first).num_days()).ok())
        .unwrap_or(31)
}
