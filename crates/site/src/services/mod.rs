//! Business logic services for the site.
//!
//! # Services
//!
//! - `auth` - Admin sign-in, admin role resolution and per-visitor auth state
//! - `prayer_times` - Today's prayer times with refresh and fallback
//! - `submissions` - Contact messages and registrations for the dashboard

pub mod auth;
pub mod prayer_times;
pub mod submissions;

pub use auth::{AuthController, AuthError, AuthSessions};
pub use prayer_times::{PrayerTimesError, PrayerTimesService, PrayerTimesSource};
pub use submissions::SubmissionsSource;
