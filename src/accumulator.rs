pub mod state;

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use self::state::{StateDocument, previous_month_label};
use crate::{
    calendar::Calendar,
    catalog::ProviderId,
    prelude::*,
    quantity::{energy::KilowattHours, power::Kilowatts},
    store::Store,
};

/// Running monthly totals and daily peaks for one provider, persisted after every change.
#[must_use]
pub struct MonthlyAccumulator<S> {
    store: S,
    key: ProviderId,
    calendar: Calendar,
    state: StateDocument,
    is_loaded: bool,

    /// Set when the in-memory state is ahead of the stored document.
    is_dirty: bool,
}

impl<S: Store> MonthlyAccumulator<S> {
    pub fn new(store: S, key: ProviderId, calendar: Calendar) -> Self {
        Self {
            store,
            key,
            calendar,
            state: StateDocument::default(),
            is_loaded: false,
            is_dirty: false,
        }
    }

    pub const fn state(&self) -> &StateDocument {
        &self.state
    }

    pub const fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn top3_peaks(&self) -> Vec<(NaiveDate, Kilowatts)> {
        self.state.top3_peaks()
    }

    pub fn average_peak(&self) -> Kilowatts {
        self.state.average_peak()
    }

    /// Load the stored document unless that has already been done.
    #[instrument(skip_all, fields(key = %self.key))]
    pub async fn ensure_loaded(&mut self) -> Result {
        if !self.is_loaded {
            if let Some(state) = self.store.load(&self.key).await? {
                debug!(current_month = ?state.current_month, n_days = state.daily_max_power.len(), "loaded");
                self.state = state;
            }
            self.is_loaded = true;
        }
        Ok(())
    }

    /// Account for one power sample taken at `now`.
    ///
    /// Only a failure to load the stored state is an error.
    /// A failed save is logged and retried on the next tick.
    #[instrument(skip_all, fields(key = %self.key, now = %now))]
    pub async fn tick(&mut self, now: NaiveDateTime, power: Kilowatts) -> Result {
        self.ensure_loaded().await?;

        let power = if power < Kilowatts::ZERO {
            warn!(?power, "negative power reading, counting it as zero");
            Kilowatts::ZERO
        } else {
            power
        };

        match self.state.current_month {
            Some(month) if month == now.month() => {}
            Some(_) => {
                self.roll_over(now);
                self.persist().await;
            }
            None => {
                self.state.current_month = Some(now.month());
                self.is_dirty = true;
            }
        }

        if let Some(last_tick) = self.state.last_tick
            && power > Kilowatts::ZERO
        {
            let energy = power * (now - last_tick);
            if energy > KilowattHours::ZERO {
                let period = self.calendar.tariff_period(now);
                trace!(?energy, %period, "accumulating");
                self.state.monthly_consumption.add(period, energy);
                self.is_dirty = true;
            }
        }
        if self.state.last_tick != Some(now) {
            self.state.last_tick = Some(now);
            self.is_dirty = true;
        }

        let date = now.date();
        if power > self.state.daily_max_power.get(&date).copied().unwrap_or_default() {
            debug!(%date, ?power, "new daily peak");
            self.state.daily_max_power.insert(date, power);
            self.is_dirty = true;
            debug!(average_peak = ?self.average_peak(), "updated the peaks");
        }

        if self.is_dirty {
            self.persist().await;
        }
        Ok(())
    }

    fn roll_over(&mut self, now: NaiveDateTime) {
        let label = previous_month_label(now);
        info!(previous_month = %label, "new month, starting over");
        self.state.previous_month_consumption =
            std::mem::take(&mut self.state.monthly_consumption);
        self.state.previous_month_top3 = self.top3_peaks().into_iter().collect();
        self.state.previous_month_name = Some(label);
        self.state.daily_max_power.clear();
        self.state.current_month = Some(now.month());
        self.is_dirty = true;
    }

    async fn persist(&mut self) {
        match self.store.save(&self.key, &self.state).await {
            Ok(()) => {
                self.is_dirty = false;
            }
            Err(error) => {
                error!(error = format!("{error:#}"), "failed to save the state, will retry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use approx::assert_abs_diff_eq;
    use async_trait::async_trait;
    use chrono::{NaiveTime, TimeDelta};

    use super::*;
    use crate::{
        accumulator::state::MonthlyConsumption,
        store::{FileStore, MemoryStore, Rename},
    };

    fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap())
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn key() -> ProviderId {
        ProviderId::from("bkk")
    }

    /// Memory store that counts saves and fails them on demand.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        is_failing: AtomicBool,
        n_saves: AtomicUsize,
    }

    #[async_trait]
    impl Store for &FlakyStore {
        async fn load(&self, key: &ProviderId) -> Result<Option<StateDocument>> {
            self.inner.load(key).await
        }

        async fn save(&self, key: &ProviderId, document: &StateDocument) -> Result {
            if self.is_failing.load(Ordering::Relaxed) {
                bail!("disk on fire");
            }
            self.n_saves.fetch_add(1, Ordering::Relaxed);
            self.inner.save(key, document).await
        }

        async fn rename(&self, from: &ProviderId, to: &ProviderId) -> Result<Rename> {
            self.inner.rename(from, to).await
        }
    }

    async fn january_store() -> Result<FlakyStore> {
        let store = FlakyStore::default();
        let document = StateDocument {
            daily_max_power: BTreeMap::from([
                (date(2026, 1, 5), Kilowatts::from(7.5)),
                (date(2026, 1, 12), Kilowatts::from(6.2)),
                (date(2026, 1, 20), Kilowatts::from(5.8)),
                (date(2026, 1, 25), Kilowatts::from(3.0)),
            ]),
            monthly_consumption: MonthlyConsumption {
                day: KilowattHours::from(150.0),
                night: KilowattHours::from(80.0),
            },
            current_month: Some(1),
            ..StateDocument::default()
        };
        store.inner.save(&key(), &document).await?;
        Ok(store)
    }

    #[tokio::test]
    async fn test_month_rollover() -> Result {
        let store = january_store().await?;
        let mut accumulator = MonthlyAccumulator::new(&store, key(), Calendar::default());
        accumulator.tick(at(2026, 2, 1, 0, 1), Kilowatts::ZERO).await?;

        let state = accumulator.state();
        assert_eq!(state.previous_month_name.as_deref(), Some("januar 2026"));
        assert_eq!(
            state.previous_month_top3,
            BTreeMap::from([
                (date(2026, 1, 5), Kilowatts::from(7.5)),
                (date(2026, 1, 12), Kilowatts::from(6.2)),
                (date(2026, 1, 20), Kilowatts::from(5.8)),
            ]),
        );
        assert_abs_diff_eq!(state.previous_month_consumption.day.0, 150.0);
        assert_abs_diff_eq!(state.previous_month_consumption.night.0, 80.0);
        assert!(state.daily_max_power.is_empty());
        assert_eq!(state.monthly_consumption, MonthlyConsumption::default());
        assert_eq!(state.current_month, Some(2));

        // Persisted right away.
        let stored = store.inner.load(&key()).await?.unwrap();
        assert_eq!(stored.previous_month_name.as_deref(), Some("januar 2026"));
        assert_eq!(stored.current_month, Some(2));
        Ok(())
    }

    #[tokio::test]
    async fn test_year_boundary_rollover() -> Result {
        let store = FlakyStore::default();
        let mut accumulator = MonthlyAccumulator::new(&store, key(), Calendar::default());
        accumulator.tick(at(2025, 12, 31, 23, 58), Kilowatts::from(2.0)).await?;
        accumulator.tick(at(2026, 1, 1, 0, 0), Kilowatts::from(3.0)).await?;

        let state = accumulator.state();
        assert_eq!(state.previous_month_name.as_deref(), Some("desember 2025"));
        assert_eq!(state.previous_month_top3.len(), 1);
        assert_eq!(state.current_month, Some(1));

        // The interval that crossed midnight belongs to the new month.
        assert_abs_diff_eq!(state.monthly_consumption.night.0, 0.1, epsilon = 1e-12);
        assert_eq!(accumulator.top3_peaks(), vec![(date(2026, 1, 1), Kilowatts::from(3.0))]);
        Ok(())
    }

    #[tokio::test]
    async fn test_restart_across_month_boundary() -> Result {
        let store = january_store().await?;
        let mut accumulator = MonthlyAccumulator::new(&store, key(), Calendar::default());
        accumulator.tick(at(2026, 2, 3, 12, 0), Kilowatts::from(1.0)).await?;
        assert_eq!(accumulator.state().previous_month_name.as_deref(), Some("januar 2026"));
        assert_eq!(accumulator.state().previous_month_top3.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_accumulates_by_tariff_period() -> Result {
        let store = FlakyStore::default();
        let mut accumulator = MonthlyAccumulator::new(&store, key(), Calendar::default());

        // First tick only sets the reference point.
        accumulator.tick(at(2026, 1, 14, 12, 0), Kilowatts::from(6.0)).await?;
        assert_eq!(accumulator.state().monthly_consumption, MonthlyConsumption::default());

        // Wednesday noon: day rate.
        accumulator.tick(at(2026, 1, 14, 12, 1), Kilowatts::from(6.0)).await?;
        // Wednesday 23:00: night rate.
        accumulator.tick(at(2026, 1, 14, 23, 0), Kilowatts::from(0.0)).await?;
        accumulator.tick(at(2026, 1, 14, 23, 30), Kilowatts::from(2.0)).await?;

        let consumption = accumulator.state().monthly_consumption;
        assert_abs_diff_eq!(consumption.day.0, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(consumption.night.0, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(consumption.total().0, 1.1, epsilon = 1e-12);
        Ok(())
    }

    #[tokio::test]
    async fn test_same_timestamp_is_idempotent() -> Result {
        let store = FlakyStore::default();
        let mut accumulator = MonthlyAccumulator::new(&store, key(), Calendar::default());
        let now = at(2026, 1, 14, 12, 0);
        accumulator.tick(now - TimeDelta::minutes(1), Kilowatts::from(6.0)).await?;
        accumulator.tick(now, Kilowatts::from(6.0)).await?;
        let after_first = accumulator.state().clone();
        let n_saves = store.n_saves.load(Ordering::Relaxed);

        accumulator.tick(now, Kilowatts::from(6.0)).await?;
        assert_eq!(accumulator.state(), &after_first);
        assert_abs_diff_eq!(accumulator.state().monthly_consumption.day.0, 0.1, epsilon = 1e-12);
        assert_eq!(store.n_saves.load(Ordering::Relaxed), n_saves, "nothing changed");
        Ok(())
    }

    #[tokio::test]
    async fn test_daily_peak_only_grows() -> Result {
        let store = FlakyStore::default();
        let mut accumulator = MonthlyAccumulator::new(&store, key(), Calendar::default());
        accumulator.tick(at(2026, 1, 14, 8, 0), Kilowatts::from(4.0)).await?;
        accumulator.tick(at(2026, 1, 14, 9, 0), Kilowatts::from(2.0)).await?;
        accumulator.tick(at(2026, 1, 14, 10, 0), Kilowatts::from(5.0)).await?;
        accumulator.tick(at(2026, 1, 15, 10, 0), Kilowatts::ZERO).await?;

        assert_eq!(
            accumulator.state().daily_max_power,
            BTreeMap::from([(date(2026, 1, 14), Kilowatts::from(5.0))]),
            "zero power does not create an entry",
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_negative_power_is_clamped() -> Result {
        let store = FlakyStore::default();
        let mut accumulator = MonthlyAccumulator::new(&store, key(), Calendar::default());
        accumulator.tick(at(2026, 1, 14, 12, 0), Kilowatts::from(-3.0)).await?;
        accumulator.tick(at(2026, 1, 14, 13, 0), Kilowatts::from(-3.0)).await?;
        assert_eq!(accumulator.state().monthly_consumption, MonthlyConsumption::default());
        assert!(accumulator.state().daily_max_power.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_persistence_round_trip() -> Result {
        let store = FlakyStore::default();
        let (top3, average_peak) = {
            let mut accumulator = MonthlyAccumulator::new(&store, key(), Calendar::default());
            for (day, peak) in [(2, 4.0), (3, 7.0), (5, 3.0), (6, 5.5)] {
                accumulator.tick(at(2026, 1, day, 18, 0), Kilowatts::from(peak)).await?;
            }
            (accumulator.top3_peaks(), accumulator.average_peak())
        };
        assert_eq!(top3.len(), 3);
        assert_abs_diff_eq!(average_peak.0, 5.5, epsilon = 1e-12);

        let mut reloaded = MonthlyAccumulator::new(&store, key(), Calendar::default());
        reloaded.ensure_loaded().await?;
        assert_eq!(reloaded.top3_peaks(), top3);
        assert_eq!(reloaded.average_peak(), average_peak);
        Ok(())
    }

    #[tokio::test]
    async fn test_consumption_across_restarts() -> Result {
        let directory = tempfile::tempdir()?;

        // One process per sample, as with `nettleie tick` from a timer.
        for minute in 0..10 {
            let store = FileStore::new(directory.path());
            let mut accumulator = MonthlyAccumulator::new(store, key(), Calendar::default());
            accumulator.tick(at(2026, 1, 14, 12, minute), Kilowatts::from(6.0)).await?;
        }

        let mut reloaded =
            MonthlyAccumulator::new(FileStore::new(directory.path()), key(), Calendar::default());
        reloaded.ensure_loaded().await?;
        assert_abs_diff_eq!(reloaded.state().monthly_consumption.day.0, 0.9, epsilon = 1e-9);
        assert_abs_diff_eq!(reloaded.state().monthly_consumption.night.0, 0.0);
        assert_eq!(reloaded.state().last_tick, Some(at(2026, 1, 14, 12, 9)));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_save_is_retried() -> Result {
        let store = FlakyStore::default();
        let mut accumulator = MonthlyAccumulator::new(&store, key(), Calendar::default());

        store.is_failing.store(true, Ordering::Relaxed);
        accumulator.tick(at(2026, 1, 14, 12, 0), Kilowatts::from(3.0)).await?;
        assert_eq!(store.inner.load(&key()).await?, None);
        assert_abs_diff_eq!(accumulator.average_peak().0, 3.0);

        // Nothing changes on the next tick, but the pending state still gets flushed.
        store.is_failing.store(false, Ordering::Relaxed);
        accumulator.tick(at(2026, 1, 14, 12, 0), Kilowatts::ZERO).await?;
        let stored = store.inner.load(&key()).await?.unwrap();
        assert_eq!(stored.daily_max_power.len(), 1);
        assert_eq!(store.n_saves.load(Ordering::Relaxed), 1);
        Ok(())
    }
}
