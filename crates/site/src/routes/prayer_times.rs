//! Prayer times API.

use axum::{Json, extract::State};
use chrono::NaiveDate;
use serde::Serialize;

use masjid_core::{PrayerTimeEntry, PrayerTimes};

use crate::error::AppError;
use crate::state::AppState;

/// Today's prayer times as returned by `GET /api/prayer-times`.
#[derive(Debug, Serialize)]
pub struct PrayerTimesResponse {
    pub date: NaiveDate,
    pub prayers: Vec<PrayerTimeEntry>,
}

impl From<PrayerTimes> for PrayerTimesResponse {
    fn from(times: PrayerTimes) -> Self {
        Self {
            date: times.date,
            prayers: times.entries(),
        }
    }
}

/// Today's prayer times.
///
/// # Errors
///
/// Returns `NotFound` when no times exist for today, or an upstream error
/// when the current row cannot be read.
pub async fn today(State(state): State<AppState>) -> Result<Json<PrayerTimesResponse>, AppError> {
    state
        .prayer_times()
        .today()
        .await?
        .map(|times| Json(times.into()))
        .ok_or_else(|| AppError::NotFound("prayer times for today".to_string()))
}
