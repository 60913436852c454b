use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::quantity::rate::KilowattHourRate;

/// Consumption tax for households (2026), excluding VAT.
const CONSUMPTION_TAX: KilowattHourRate = KilowattHourRate::new(0.0713);

/// Energy fund levy (Enova), paid in every zone, excluding VAT.
pub const ENERGY_FUND_LEVY: KilowattHourRate = KilowattHourRate::new(0.01);

const VAT_RATE: f64 = 0.25;

/// National fixed price (norgespris) excluding VAT.
const NATIONAL_FIXED_PRICE: KilowattHourRate = KilowattHourRate::new(0.40);

/// Region-based eligibility for consumption tax and VAT exemptions.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Hash, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum TaxZone {
    /// Southern Norway: consumption tax and VAT.
    #[default]
    Standard,

    /// Northern Norway: consumption tax, VAT-exempt.
    Northern,

    /// Finnmark and parts of Nord-Troms: exempt from both.
    IncentiveZone,
}

impl Display for TaxZone {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Northern => write!(f, "northern"),
            Self::IncentiveZone => write!(f, "incentive-zone"),
        }
    }
}

impl TaxZone {
    /// Default zone for a price area (`NO1`…`NO5`).
    pub fn for_price_area(price_area: &str) -> Self {
        match price_area {
            "NO3" | "NO4" => Self::Northern,
            _ => Self::Standard,
        }
    }

    pub const fn taxes(self) -> Taxes {
        match self {
            Self::Standard => Taxes { consumption_tax: CONSUMPTION_TAX, vat_rate: VAT_RATE },
            Self::Northern => Taxes { consumption_tax: CONSUMPTION_TAX, vat_rate: 0.0 },
            Self::IncentiveZone => Taxes { consumption_tax: KilowattHourRate::ZERO, vat_rate: 0.0 },
        }
    }

    /// National fixed price including VAT where the zone pays it.
    pub fn national_fixed_price(self) -> KilowattHourRate {
        self.taxes().with_vat(NATIONAL_FIXED_PRICE)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Taxes {
    /// Excluding VAT.
    pub consumption_tax: KilowattHourRate,

    pub vat_rate: f64,
}

impl Taxes {
    pub fn with_vat(self, rate: KilowattHourRate) -> KilowattHourRate {
        rate * (1.0 + self.vat_rate)
    }

    pub fn consumption_tax_with_vat(self) -> KilowattHourRate {
        self.with_vat(self.consumption_tax)
    }

    pub fn energy_fund_levy_with_vat(self) -> KilowattHourRate {
        self.with_vat(ENERGY_FUND_LEVY)
    }

    /// Consumption tax and energy fund levy, including VAT.
    pub fn public_levies(self) -> KilowattHourRate {
        self.with_vat(self.consumption_tax + ENERGY_FUND_LEVY)
    }
}

/// Electricity subsidy (strømstøtte): a share of the spot price above a threshold.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, bon::Builder)]
pub struct SubsidyPolicy {
    /// Spot price level including VAT above which the subsidy kicks in.
    #[builder(default = KilowattHourRate::new(0.9625))]
    pub threshold: KilowattHourRate,

    /// Covered share of the price above the threshold.
    #[builder(default = 0.9)]
    pub coverage: f64,
}

impl Default for SubsidyPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SubsidyPolicy {
    /// Subsidy per kilowatt-hour, rounded to 4 decimals.
    pub fn subsidy(self, spot_price: KilowattHourRate) -> KilowattHourRate {
        ((spot_price - self.threshold).max(KilowattHourRate::ZERO) * self.coverage).round_to(4)
    }
}
