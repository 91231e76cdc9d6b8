//! Productive-hours schedule embedded in the user profile.

use serde::{Deserialize, Serialize};

/// A window of productive time on one weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourWindow {
    /// Weekday, 0 = Monday through 6 = Sunday.
    pub weekday: u8,
    /// Start, in minutes after midnight.
    pub start_minute: u16,
    /// End, in minutes after midnight (exclusive).
    pub end_minute: u16,
}

impl HourWindow {
    /// Creates a new window.
    pub fn new(weekday: u8, start_minute: u16, end_minute: u16) -> Self {
        Self {
            weekday,
            start_minute,
            end_minute,
        }
    }

    /// Length of the window in minutes.
    pub fn minutes(&self) -> u16 {
        self.end_minute.saturating_sub(self.start_minute)
    }
}

/// The user's weekly productive-hours schedule.
///
/// Stored on both sides as a single embedded text blob. [`to_blob`] and
/// [`from_blob`] are exact inverses for any blob `to_blob` produced, so
/// repeated round trips through the remote store never drift.
///
/// [`to_blob`]: ProductiveHours::to_blob
/// [`from_blob`]: ProductiveHours::from_blob
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductiveHours {
    /// Windows in the order the user defined them.
    pub windows: Vec<HourWindow>,
}

impl ProductiveHours {
    /// Creates a schedule from windows.
    pub fn new(windows: Vec<HourWindow>) -> Self {
        Self { windows }
    }

    /// Returns true if no windows are defined.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Total productive minutes per week.
    pub fn weekly_minutes(&self) -> u32 {
        self.windows.iter().map(|w| u32::from(w.minutes())).sum()
    }

    /// Encodes the schedule as its embedded text form.
    pub fn to_blob(&self) -> String {
        // A struct of integers and vectors always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{\"windows\":[]}"))
    }

    /// Decodes the embedded text form.
    pub fn from_blob(blob: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_is_idempotent() {
        let hours = ProductiveHours::new(vec![
            HourWindow::new(0, 9 * 60, 12 * 60),
            HourWindow::new(2, 14 * 60, 17 * 60 + 30),
        ]);
        let blob = hours.to_blob();
        let decoded = ProductiveHours::from_blob(&blob).unwrap();
        assert_eq!(decoded, hours);
        assert_eq!(decoded.to_blob(), blob);
    }

    #[test]
    fn empty_schedule_blob() {
        let blob = ProductiveHours::default().to_blob();
        assert_eq!(blob, "{\"windows\":[]}");
        assert!(ProductiveHours::from_blob(&blob).unwrap().is_empty());
    }

    #[test]
    fn weekly_minutes() {
        let hours = ProductiveHours::new(vec![
            HourWindow::new(0, 60, 120),
            HourWindow::new(1, 600, 630),
            HourWindow::new(3, 700, 650),
        ]);
        assert_eq!(hours.weekly_minutes(), 90);
    }

    #[test]
    fn garbage_blob_is_an_error() {
        assert!(ProductiveHours::from_blob("not json").is_err());
    }
}
