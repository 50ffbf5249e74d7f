//! Projection of contacts onto yearly birthday events.

use chrono::{Datelike, NaiveDate};

use crate::constants::{TARGET_YEAR_OFFSETS, UID_DOMAIN};
use crate::contact::ContactRecord;
use crate::reminder::ReminderTrigger;

/// Produces the human-readable event title.
///
/// `age` is `None` when the birth year is unknown and `Some(0)` for the
/// year of birth itself.
pub trait SummaryFormatter: Send + Sync {
    fn format(&self, name: &str, age: Option<i32>) -> String;
}

impl<F> SummaryFormatter for F
where
    F: Fn(&str, Option<i32>) -> String + Send + Sync,
{
    fn format(&self, name: &str, age: Option<i32>) -> String {
        self(name, age)
    }
}

/// Title used when no formatter is installed.
pub fn fallback_summary(name: &str) -> String {
    format!("Birthday: {name}")
}

/// English titles that include the age being reached.
#[derive(Debug, Default, Clone, Copy)]
pub struct AgeSummaryFormatter;

impl SummaryFormatter for AgeSummaryFormatter {
    fn format(&self, name: &str, age: Option<i32>) -> String {
        match age {
            Some(0) => format!("Birthday: {name} (birth)"),
            Some(age) => format!("Birthday: {name} ({age})"),
            None => fallback_summary(name),
        }
    }
}

/// DISPLAY alarm attached to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub trigger: String,
    pub description: String,
}

/// One all-day birthday occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BirthdayEvent {
    pub uid: String,
    pub date: NaiveDate,
    pub summary: String,
    pub alarm: Option<Alarm>,
}

/// Events generated for a single contact.
#[derive(Debug, Default)]
pub struct Projection {
    pub events: Vec<BirthdayEvent>,
    /// An event falls on the sync-time current date.
    pub is_today: bool,
}

/// Turns contact records into events for the years around `today`.
pub struct EventProjector<'a> {
    pub today: NaiveDate,
    pub reminder: Option<&'a ReminderTrigger>,
    pub formatter: Option<&'a dyn SummaryFormatter>,
}

impl EventProjector<'_> {
    pub fn project(&self, record: &ContactRecord, uid_base: &str) -> Projection {
        let current_year = self.today.year();
        let birth = &record.birth;
        let mut projection = Projection::default();

        for offset in TARGET_YEAR_OFFSETS {
            let year = current_year + offset;

            // Nobody has a birthday before being born.
            if birth.year_known && year < birth.year() {
                continue;
            }

            let age = birth.year_known.then(|| year - birth.year());
            let summary = match self.formatter {
                Some(formatter) => formatter.format(&record.name, age),
                None => fallback_summary(&record.name),
            };

            let date = birth.in_year(year);
            if date == self.today {
                projection.is_today = true;
            }

            let alarm = self.reminder.map(|trigger| Alarm {
                trigger: trigger.as_str().to_string(),
                description: summary.clone(),
            });

            projection.events.push(BirthdayEvent {
                uid: format!("{uid_base}-{year}@{UID_DOMAIN}"),
                date,
                summary,
                alarm,
            });
        }

        projection
    }
}
