//! Terminal rendering of the upcoming birthdays list.

use birthcal_core::BirthdayEntry;
use chrono::NaiveDate;
use owo_colors::OwoColorize;

/// Birthdays this close are highlighted.
const SOON_DAYS: i64 = 7;

/// Extension trait for TUI rendering with colors.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for BirthdayEntry {
    fn render(&self) -> String {
        if self.year_known {
            self.date_of_birth.format("%Y-%m-%d").to_string()
        } else {
            self.date_of_birth.format("--%m-%d").to_string()
        }
    }
}

fn age_label(entry: &BirthdayEntry) -> String {
    if entry.year_known {
        entry.age_next.to_string()
    } else {
        "-".to_string()
    }
}

/// One header line plus one line per entry, in the given order.
pub fn render_entries(entries: &[BirthdayEntry], today: NaiveDate) -> Vec<String> {
    let name_width = entries
        .iter()
        .map(|e| e.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Name".len());

    let mut lines = Vec::with_capacity(entries.len() + 1);
    let header = format!("{:<name_width$}  {:<10}  {:<10}  {:>3}", "Name", "Born", "Next", "Age");
    lines.push(header.bold().to_string());

    for entry in entries {
        let row = format!(
            "{:<name_width$}  {:<10}  {:<10}  {:>3}",
            entry.name,
            entry.render(),
            entry.next_occurrence.format("%Y-%m-%d").to_string(),
            age_label(entry)
        );

        let days_left = (entry.next_occurrence - today).num_days();
        let row = if days_left == 0 {
            format!("{} 🎂", row.green().bold())
        } else if days_left <= SOON_DAYS {
            row.yellow().to_string()
        } else {
            row
        };
        lines.push(row);
    }

    lines
}
