//! Alarm triggers attached to birthday events.

use std::fmt;

use serde::Deserialize;

use crate::error::{BirthcalError, BirthcalResult};

/// A validated, signed ISO 8601 duration used verbatim as a VALARM `TRIGGER`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderTrigger(String);

impl ReminderTrigger {
    /// Validate `value` (e.g. `-P1D`, `-PT15M`, `P0D`).
    pub fn parse(value: &str) -> BirthcalResult<Self> {
        let value = value.trim();
        let unsigned = value
            .strip_prefix('-')
            .or_else(|| value.strip_prefix('+'))
            .unwrap_or(value);

        if !unsigned.starts_with('P') {
            return Err(BirthcalError::Config(format!(
                "invalid reminder trigger {value:?}: expected an ISO 8601 duration"
            )));
        }

        iso8601::duration(unsigned).map_err(|e| {
            BirthcalError::Config(format!("invalid reminder trigger {value:?}: {e}"))
        })?;

        Ok(ReminderTrigger(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReminderTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderUnit {
    #[default]
    Days,
    Hours,
    Minutes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderDirection {
    #[default]
    Before,
    After,
}

/// Reminder expressed as "N units before/after the start of the day".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderSettings {
    pub value: u32,
    pub unit: ReminderUnit,
    pub direction: ReminderDirection,
}

impl ReminderSettings {
    pub fn to_trigger(&self) -> ReminderTrigger {
        let sign = match self.direction {
            ReminderDirection::Before => "-",
            ReminderDirection::After => "",
        };
        let body = match self.unit {
            ReminderUnit::Days => format!("P{}D", self.value),
            ReminderUnit::Hours => format!("PT{}H", self.value),
            ReminderUnit::Minutes => format!("PT{}M", self.value),
        };
        ReminderTrigger(format!("{sign}{body}"))
    }
}
