//! Daily prayer times.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The six daily entries shown on the site, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prayer {
    Fajr,
    Sunrise,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl Prayer {
    /// All entries in display order.
    pub const ALL: [Self; 6] = [
        Self::Fajr,
        Self::Sunrise,
        Self::Dhuhr,
        Self::Asr,
        Self::Maghrib,
        Self::Isha,
    ];

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fajr => "Fajr",
            Self::Sunrise => "Sunrise",
            Self::Dhuhr => "Dhuhr",
            Self::Asr => "Asr",
            Self::Maghrib => "Maghrib",
            Self::Isha => "Isha",
        }
    }
}

/// Prayer times for one calendar day.
///
/// Times are kept as the backend stores them (`HH:MM` or `HH:MM:SS`); the
/// site only displays them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerTimes {
    pub date: NaiveDate,
    pub fajr: String,
    pub sunrise: String,
    pub dhuhr: String,
    pub asr: String,
    pub maghrib: String,
    pub isha: String,
}

/// One displayed prayer time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrayerTimeEntry {
    pub prayer: &'static str,
    pub time: String,
}

impl PrayerTimes {
    /// The time recorded for `prayer`.
    #[must_use]
    pub fn time(&self, prayer: Prayer) -> &str {
        match prayer {
            Prayer::Fajr => &self.fajr,
            Prayer::Sunrise => &self.sunrise,
            Prayer::Dhuhr => &self.dhuhr,
            Prayer::Asr => &self.asr,
            Prayer::Maghrib => &self.maghrib,
            Prayer::Isha => &self.isha,
        }
    }

    /// Entries in display order.
    #[must_use]
    pub fn entries(&self) -> Vec<PrayerTimeEntry> {
        Prayer::ALL
            .iter()
            .map(|&prayer| PrayerTimeEntry {
                prayer: prayer.name(),
                time: self.time(prayer).to_owned(),
            })
            .collect()
    }

    /// Whether these times are for `today`.
    #[must_use]
    pub fn is_for(&self, today: NaiveDate) -> bool {
        self.date == today
    }
}
