//! Timestamped media file names

use chrono::{DateTime, TimeZone};
use std::fmt::Display;

/// `yyyyMMdd_HHmmss_SSS.<extension>` for the given instant
pub fn media_file_name<Tz>(now: &DateTime<Tz>, extension: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let extension = extension.trim_start_matches('.');
    format!("{}.{}", now.format("%Y%m%d_%H%M%S_%3f"), extension)
}
