use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{
    prelude::*,
    quantity::{cost::Cost, power::Kilowatts},
};

/// One step of the capacity fee schedule.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapacityTier {
    /// Inclusive upper bound of the average peak power, `None` for the catch-all tier.
    pub up_to: Option<Kilowatts>,

    /// Monthly fee.
    pub fee: Cost,
}

/// Validated capacity fee schedule: non-empty, strictly increasing, ending with the catch-all tier.
#[must_use]
#[derive(Clone, Debug, PartialEq, derive_more::AsRef, derive_more::Deref)]
pub struct CapacityTiers(Vec<CapacityTier>);

impl CapacityTiers {
    /// Validate the schedule, turning the last tier into the catch-all one.
    pub fn try_new(mut tiers: Vec<CapacityTier>) -> Result<Self> {
        let Some((last, bounded)) = tiers.split_last_mut() else {
            bail!("the capacity tier table is empty");
        };
        let mut previous = Kilowatts::ZERO;
        for (index, tier) in bounded.iter().enumerate() {
            let up_to = tier
                .up_to
                .with_context(|| format!("tier #{} is unbounded but is not the last one", index + 1))?;
            ensure!(
                up_to > previous,
                "tier #{} threshold {up_to} does not exceed the previous one ({previous})",
                index + 1,
            );
            previous = up_to;
        }
        if let Some(up_to) = last.up_to {
            ensure!(
                bounded.is_empty() || up_to > previous,
                "the last tier threshold {up_to} does not exceed the previous one ({previous})",
            );
            debug!(?up_to, "treating the last tier as the catch-all");
            last.up_to = None;
        }
        Ok(Self(tiers))
    }

    /// Find the tier for the average of the top daily peaks.
    ///
    /// A value exactly on a threshold belongs to the lower tier.
    pub fn resolve(&self, average_peak: Kilowatts) -> TierResolution {
        let index = self
            .0
            .iter()
            .position(|tier| tier.up_to.is_none_or(|up_to| average_peak <= up_to))
            .unwrap_or(self.0.len() - 1);
        self.resolution_at(index)
    }

    fn resolution_at(&self, index: usize) -> TierResolution {
        let tier = self.0[index];
        let lower = index.checked_sub(1).and_then(|index| self.0[index].up_to);
        TierResolution {
            fee: tier.fee,
            number: index + 1,
            range: TierRange { lower: lower.unwrap_or(Kilowatts::ZERO), upper: tier.up_to },
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct TierResolution {
    pub fee: Cost,

    /// 1-based position in the schedule.
    pub number: usize,

    pub range: TierRange,
}

/// Human-readable tier interval, for example `2-5 kW` or `>100 kW`.
#[derive(Copy, Clone, Debug, PartialEq, serde_with::SerializeDisplay)]
pub struct TierRange {
    pub lower: Kilowatts,
    pub upper: Option<Kilowatts>,
}

impl Display for TierRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.upper {
            Some(upper) => write!(f, "{:.0}-{:.0} kW", self.lower.0, upper.0),
            None => write!(f, ">{:.0} kW", self.lower.0),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    /// BKK Nett 2026 schedule.
    pub fn bkk_tiers() -> CapacityTiers {
        CapacityTiers::try_new(
            [
                (Some(2.0), 155.0),
                (Some(5.0), 250.0),
                (Some(10.0), 415.0),
                (Some(15.0), 600.0),
                (Some(20.0), 770.0),
                (Some(25.0), 940.0),
                (Some(50.0), 1800.0),
                (Some(75.0), 2650.0),
                (Some(100.0), 3500.0),
                (None, 6900.0),
            ]
            .into_iter()
            .map(|(up_to, fee)| CapacityTier {
                up_to: up_to.map(Kilowatts::from),
                fee: Cost::from(fee),
            })
            .collect(),
        )
        .unwrap()
    }

    fn resolve(average_peak: f64) -> (f64, usize, String) {
        let resolution = bkk_tiers().resolve(Kilowatts::from(average_peak));
        (resolution.fee.0, resolution.number, resolution.range.to_string())
    }

    #[test]
    fn test_every_tier() {
        assert_eq!(resolve(1.0), (155.0, 1, "0-2 kW".to_string()));
        assert_eq!(resolve(3.5), (250.0, 2, "2-5 kW".to_string()));
        assert_eq!(resolve(7.0), (415.0, 3, "5-10 kW".to_string()));
        assert_eq!(resolve(12.0), (600.0, 4, "10-15 kW".to_string()));
        assert_eq!(resolve(17.0), (770.0, 5, "15-20 kW".to_string()));
        assert_eq!(resolve(22.0), (940.0, 6, "20-25 kW".to_string()));
        assert_eq!(resolve(30.0), (1800.0, 7, "25-50 kW".to_string()));
        assert_eq!(resolve(60.0), (2650.0, 8, "50-75 kW".to_string()));
        assert_eq!(resolve(80.0), (3500.0, 9, "75-100 kW".to_string()));
        assert_eq!(resolve(150.0), (6900.0, 10, ">100 kW".to_string()));
    }

    #[test]
    fn test_zero() {
        assert_eq!(resolve(0.0), (155.0, 1, "0-2 kW".to_string()));
    }

    #[test]
    fn test_boundary_belongs_to_lower_tier() {
        assert_eq!(resolve(2.0).1, 1);
        assert_abs_diff_eq!(resolve(2.0).0, 155.0);
        assert_eq!(resolve(2.0001).1, 2);
        assert_abs_diff_eq!(resolve(2.0001).0, 250.0);
        assert_eq!(resolve(100.0).1, 9);
        assert_eq!(resolve(100.0001).1, 10);
    }

    #[test]
    fn test_exactly_one_tier_matches() {
        let tiers = bkk_tiers();
        for step in 0..=1200 {
            let average_peak = Kilowatts::from(f64::from(step) * 0.1);
            let matching = tiers
                .iter()
                .enumerate()
                .filter(|(index, tier)| {
                    let lower = index
                        .checked_sub(1)
                        .and_then(|index| tiers[index].up_to)
                        .unwrap_or(Kilowatts::ZERO);
                    (index == &0 || average_peak > lower)
                        && tier.up_to.is_none_or(|up_to| average_peak <= up_to)
                })
                .map(|(index, _)| index + 1)
                .collect::<Vec<_>>();
            assert_eq!(matching, vec![tiers.resolve(average_peak).number], "{average_peak:?}");
        }
    }

    #[test]
    fn test_last_tier_becomes_catch_all() -> Result {
        let tiers = CapacityTiers::try_new(vec![
            CapacityTier { up_to: Some(Kilowatts::from(2.0)), fee: Cost::from(517.0) },
            CapacityTier { up_to: Some(Kilowatts::from(999.0)), fee: Cost::from(931.0) },
        ])?;
        assert_eq!(tiers[1].up_to, None);
        let resolution = tiers.resolve(Kilowatts::from(1500.0));
        assert_eq!(resolution.number, 2);
        assert_eq!(resolution.range.to_string(), ">2 kW");
        Ok(())
    }

    #[test]
    fn test_single_tier() -> Result {
        let tiers =
            CapacityTiers::try_new(vec![CapacityTier { up_to: None, fee: Cost::from(100.0) }])?;
        let resolution = tiers.resolve(Kilowatts::from(3.0));
        assert_eq!(resolution.number, 1);
        assert_eq!(resolution.range.to_string(), ">0 kW");
        Ok(())
    }

    #[test]
    fn test_empty_is_rejected() {
        assert!(CapacityTiers::try_new(Vec::new()).is_err());
    }

    #[test]
    fn test_non_increasing_is_rejected() {
        let result = CapacityTiers::try_new(vec![
            CapacityTier { up_to: Some(Kilowatts::from(5.0)), fee: Cost::from(1.0) },
            CapacityTier { up_to: Some(Kilowatts::from(5.0)), fee: Cost::from(2.0) },
            CapacityTier { up_to: None, fee: Cost::from(3.0) },
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unbounded_middle_tier_is_rejected() {
        let result = CapacityTiers::try_new(vec![
            CapacityTier { up_to: None, fee: Cost::from(1.0) },
            CapacityTier { up_to: None, fee: Cost::from(2.0) },
        ]);
        assert!(result.is_err());
    }
}
