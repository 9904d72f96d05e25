//! Calendar date source for date-suffixed checksums.
//!
//! Airpay checksums append the server-local date (`YYYY-MM-DD`). A checksum
//! computed just before local midnight and verified just after will fail; this
//! is accepted gateway behaviour.

use chrono::NaiveDate;

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;

    fn today_string(&self) -> String {
        self.today().format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// Always reports the same date. Used to make checksums reproducible.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_formats_iso_date() {
        let clock = FixedClock(NaiveDate::from_ymd_opt(2025, 12, 6).unwrap());
        assert_eq!(clock.today_string(), "2025-12-06");
    }
}
