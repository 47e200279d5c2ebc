use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::config::{CalendarConfig, CompetitorConfig, DateRange};

/// Date rules for the restaurant's trading area: paydays, school breaks,
/// holidays and competitor closing days.
#[derive(Debug, Clone)]
pub struct BusinessCalendar {
    payday_anchor: NaiveDate,
    payday_period_days: i64,
    school_breaks: Vec<DateRange>,
    observed_holidays: Vec<NaiveDate>,
    lunar_new_year: Vec<NaiveDate>,
    competitors: Vec<CompetitorConfig>,
}

impl BusinessCalendar {
    pub fn new(config: &CalendarConfig) -> Self {
        Self {
            payday_anchor: config.payday_anchor,
            payday_period_days: config.payday_period_days.max(1),
            school_breaks: config.school_breaks.clone(),
            observed_holidays: config.observed_holidays.clone(),
            lunar_new_year: config.lunar_new_year.clone(),
            competitors: config.competitors.clone(),
        }
    }

    /// Biweekly federal payday: any date on the anchor's 14-day lattice,
    /// before or after the anchor.
    pub fn is_federal_payday(&self, date: NaiveDate) -> bool {
        (date - self.payday_anchor)
            .num_days()
            .rem_euclid(self.payday_period_days)
            == 0
    }

    /// One or two days after a federal payday.
    pub fn is_payday_weekend(&self, date: NaiveDate) -> bool {
        self.is_federal_payday(date - Duration::days(1))
            || self.is_federal_payday(date - Duration::days(2))
    }

    pub fn is_school_break(&self, date: NaiveDate) -> bool {
        self.school_breaks.iter().any(|r| r.contains(date))
    }

    pub fn is_observed_holiday(&self, date: NaiveDate) -> bool {
        self.observed_holidays.contains(&date)
    }

    /// Holidays that shift traffic on the days around them.
    pub fn major_holidays(&self, year: i32) -> Vec<NaiveDate> {
        let mut days: Vec<NaiveDate> = [
            NaiveDate::from_ymd_opt(year, 1, 1),
            nth_weekday_of_month(year, 2, Weekday::Sun, 2), // Super Bowl Sunday
            NaiveDate::from_ymd_opt(year, 2, 14),
            easter_date(year),
            last_weekday_of_month(year, 5, Weekday::Mon), // Memorial Day
            NaiveDate::from_ymd_opt(year, 7, 4),
            nth_weekday_of_month(year, 9, Weekday::Mon, 1), // Labor Day
            nth_weekday_of_month(year, 11, Weekday::Thu, 4), // Thanksgiving
            NaiveDate::from_ymd_opt(year, 12, 25),
        ]
        .into_iter()
        .flatten()
        .collect();

        days.extend(self.lunar_new_year.iter().filter(|d| d.year() == year));
        days.sort();
        days.dedup();
        days
    }

    fn is_major_holiday(&self, date: NaiveDate) -> bool {
        self.major_holidays(date.year()).contains(&date)
    }

    /// One or two days before a major holiday.
    pub fn is_pre_holiday(&self, date: NaiveDate) -> bool {
        (1..=2).any(|k| self.is_major_holiday(date + Duration::days(k)))
    }

    /// One or two days after a major holiday.
    pub fn is_post_holiday(&self, date: NaiveDate) -> bool {
        (1..=2).any(|k| self.is_major_holiday(date - Duration::days(k)))
    }

    pub fn is_valentines_period(&self, date: NaiveDate) -> bool {
        date.month() == 2 && (13..=15).contains(&date.day())
    }

    /// Three-day window starting on each configured Lunar New Year.
    pub fn is_lunar_new_year(&self, date: NaiveDate) -> bool {
        self.lunar_new_year
            .iter()
            .any(|start| (0..3).contains(&(date - *start).num_days()))
    }

    /// Number of nearby competitors closed on this weekday.
    pub fn overflow_index(&self, weekday: Weekday) -> u32 {
        self.competitors
            .iter()
            .filter(|c| c.closed_on.contains(&weekday))
            .count() as u32
    }
}

impl Default for BusinessCalendar {
    fn default() -> Self {
        Self::new(&CalendarConfig::default())
    }
}

/// Semi-monthly payday: the 15th or the last day of the month.
pub fn is_semi_monthly_payday(date: NaiveDate) -> bool {
    date.day() == 15 || date.succ_opt().is_none_or(|next| next.month() != date.month())
}

/// Seasonal demand level by month.
///
/// +1 for the winter peak (Nov-Feb), -1 for the warm-season slump (Apr-Aug),
/// 0 for the shoulder months.
pub fn season_impact(month: u32) -> i8 {
    match month {
        1 | 2 | 11 | 12 => 1,
        4..=8 => -1,
        _ => 0,
    }
}

fn nth_weekday_of_month(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    (1..=5)
        .rev()
        .find_map(|n| NaiveDate::from_weekday_of_month_opt(year, month, weekday, n))
}

/// Calculate Easter date using the Anonymous Gregorian algorithm.
/// This is efficient and accurate for the Gregorian calendar (1583-4099).
fn easter_date(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = ((h + l - 7 * m + 114) % 31) + 1;

    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}
