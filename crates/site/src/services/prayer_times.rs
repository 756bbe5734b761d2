//! Today's prayer times.
//!
//! The backend keeps a one-row `current_prayer_times` table that a
//! serverless function refreshes from the full `prayer_times` calendar.
//! When the current row is missing or from an earlier day the service asks
//! for a refresh, and if that does not produce today's row it reads
//! today's calendar entry directly. At most one refresh per day is requested
//! within [`REFRESH_BACKOFF`], whatever it returned.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use moka::future::Cache;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use masjid_core::PrayerTimes;

use crate::services::auth::ProviderError;

/// Default timezone used to decide what "today" is.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Rome;

/// Minimum gap between two refresh requests for the same day.
pub const REFRESH_BACKOFF: Duration = Duration::from_secs(60);

/// Backend access for prayer times.
#[async_trait]
pub trait PrayerTimesSource: Send + Sync {
    /// The row in `current_prayer_times`, whatever its date.
    async fn current(&self) -> Result<Option<PrayerTimes>, ProviderError>;

    /// The calendar entry for `date`.
    async fn for_date(&self, date: NaiveDate) -> Result<Option<PrayerTimes>, ProviderError>;

    /// Ask the backend to copy today's calendar entry into the current row.
    async fn refresh(&self) -> Result<(), ProviderError>;
}

/// Prayer times lookup failure.
#[derive(Debug, Error)]
pub enum PrayerTimesError {
    /// The current row could not be read.
    #[error("failed to read current prayer times: {0}")]
    Source(#[from] ProviderError),
}

/// Cached prayer-times lookup.
#[derive(Clone)]
pub struct PrayerTimesService {
    source: Arc<dyn PrayerTimesSource>,
    timezone: Tz,
    cache: Cache<NaiveDate, PrayerTimes>,
    refresh_attempts: Cache<NaiveDate, ()>,
}

impl PrayerTimesService {
    /// Create a service caching results for `ttl`.
    #[must_use]
    pub fn new(source: Arc<dyn PrayerTimesSource>, timezone: Tz, ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(8).time_to_live(ttl).build();
        let refresh_attempts = Cache::builder()
            .max_capacity(8)
            .time_to_live(REFRESH_BACKOFF)
            .build();
        Self {
            source,
            timezone,
            cache,
            refresh_attempts,
        }
    }

    /// The calendar date at `now` in the configured timezone.
    #[must_use]
    pub fn today_at(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    /// Prayer times for today.
    ///
    /// # Errors
    ///
    /// Returns an error if the current row cannot be read.
    pub async fn today(&self) -> Result<Option<PrayerTimes>, PrayerTimesError> {
        self.for_day(self.today_at(Utc::now())).await
    }

    /// Prayer times for `today`, where `today` is the current date in the
    /// configured timezone.
    ///
    /// # Errors
    ///
    /// Returns an error if the current row cannot be read.
    #[instrument(skip(self))]
    pub async fn for_day(&self, today: NaiveDate) -> Result<Option<PrayerTimes>, PrayerTimesError> {
        if let Some(times) = self.cache.get(&today).await {
            return Ok(Some(times));
        }

        let times = self.load(today).await?;
        if let Some(times) = &times {
            self.cache.insert(today, times.clone()).await;
        }
        Ok(times)
    }

    async fn load(&self, today: NaiveDate) -> Result<Option<PrayerTimes>, PrayerTimesError> {
        let current = self.source.current().await?;

        if let Some(times) = current.filter(|t| t.is_for(today)) {
            return Ok(Some(times));
        }

        if let Some(times) = self.refresh(today).await {
            return Ok(Some(times));
        }

        match self.source.for_date(today).await {
            Ok(times) => Ok(times),
            Err(e) => {
                warn!(%today, error = %e, "Prayer times calendar fallback failed");
                Ok(None)
            }
        }
    }

    /// Request a refresh unless one was requested for `today` recently.
    async fn refresh(&self, today: NaiveDate) -> Option<PrayerTimes> {
        if self.refresh_attempts.contains_key(&today) {
            debug!(%today, "Prayer times refresh requested recently, skipping");
            return None;
        }
        self.refresh_attempts.insert(today, ()).await;

        debug!(%today, "Current prayer times are stale, requesting refresh");
        match self.source.refresh().await {
            Ok(()) => match self.source.current().await {
                Ok(Some(times)) if times.is_for(today) => {
                    info!(%today, "Prayer times refreshed");
                    return Some(times);
                }
                Ok(_) => warn!(%today, "Refresh did not produce today's prayer times"),
                Err(e) => warn!(error = %e, "Failed to re-read prayer times after refresh"),
            },
            Err(e) => warn!(error = %e, "Prayer times refresh failed"),
        }
        None
    }
}

impl std::fmt::Debug for PrayerTimesService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrayerTimesService")
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;

    use super::*;

    fn times(date: NaiveDate, fajr: &str) -> PrayerTimes {
        PrayerTimes {
            date,
            fajr: fajr.into(),
            sunrise: "06:30".into(),
            dhuhr: "12:34".into(),
            asr: "15:52".into(),
            maghrib: "18:38".into(),
            isha: "19:59".into(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[derive(Default)]
    struct Source {
        current: Mutex<Option<PrayerTimes>>,
        calendar: Vec<PrayerTimes>,
        refresh_copies: bool,
        current_fails: bool,
        calendar_fails: bool,
        reads: AtomicUsize,
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl PrayerTimesSource for Source {
        async fn current(&self) -> Result<Option<PrayerTimes>, ProviderError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.current_fails {
                return Err(ProviderError::Transient("503".into()));
            }
            Ok(self.current.lock().unwrap().clone())
        }

        async fn for_date(&self, date: NaiveDate) -> Result<Option<PrayerTimes>, ProviderError> {
            if self.calendar_fails {
                return Err(ProviderError::Transient("503".into()));
            }
            Ok(self.calendar.iter().find(|t| t.date == date).cloned())
        }

        async fn refresh(&self) -> Result<(), ProviderError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if !self.refresh_copies {
                return Err(ProviderError::Transient("function failed".into()));
            }
            // The refresh function copies the calendar entry for day 20.
            let today = self.calendar.iter().find(|t| t.date == day(20)).cloned();
            *self.current.lock().unwrap() = today;
            Ok(())
        }
    }

    fn service(source: Arc<Source>) -> PrayerTimesService {
        PrayerTimesService::new(source, DEFAULT_TIMEZONE, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_fresh_current_row_is_used_without_refresh() {
        let source = Arc::new(Source {
            current: Mutex::new(Some(times(day(20), "05:01"))),
            ..Source::default()
        });
        let result = service(source.clone()).for_day(day(20)).await.unwrap();
        assert_eq!(result.unwrap().fajr, "05:01");
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_row_triggers_refresh_and_reread() {
        let source = Arc::new(Source {
            current: Mutex::new(Some(times(day(19), "05:03"))),
            calendar: vec![times(day(20), "05:01")],
            refresh_copies: true,
            ..Source::default()
        });
        let result = service(source.clone()).for_day(day(20)).await.unwrap();
        assert_eq!(result.unwrap().date, day(20));
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_calendar() {
        let source = Arc::new(Source {
            calendar: vec![times(day(20), "05:01")],
            ..Source::default()
        });
        let result = service(source).for_day(day(20)).await.unwrap();
        assert_eq!(result.unwrap().fajr, "05:01");
    }

    #[tokio::test]
    async fn test_failed_refresh_is_not_repeated_within_backoff() {
        let source = Arc::new(Source {
            current: Mutex::new(Some(times(day(19), "05:03"))),
            ..Source::default()
        });
        let svc = service(source.clone());

        assert!(svc.for_day(day(20)).await.unwrap().is_none());
        assert!(svc.for_day(day(20)).await.unwrap().is_none());

        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fallback_error_yields_none() {
        let source = Arc::new(Source {
            calendar_fails: true,
            ..Source::default()
        });
        assert!(service(source).for_day(day(20)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_current_read_failure_is_an_error() {
        let source = Arc::new(Source {
            current_fails: true,
            ..Source::default()
        });
        assert!(service(source).for_day(day(20)).await.is_err());
    }

    #[tokio::test]
    async fn test_results_are_cached() {
        let source = Arc::new(Source {
            current: Mutex::new(Some(times(day(20), "05:01"))),
            ..Source::default()
        });
        let svc = service(source.clone());
        svc.for_day(day(20)).await.unwrap();
        svc.for_day(day(20)).await.unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_today_follows_configured_timezone() {
        let svc = service(Arc::new(Source::default()));
        // 23:30 UTC on the 19th is already the 20th in Rome.
        let now = Utc.with_ymd_and_hms(2026, 3, 19, 23, 30, 0).unwrap();
        assert_eq!(svc.today_at(now), day(20));
    }
}
