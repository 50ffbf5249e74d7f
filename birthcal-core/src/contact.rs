//! Contact records extracted from vCards, and the display entries built from them.

use chrono::{DateTime, NaiveDate, TimeZone};
use ical::parser::vcard::component::VcardContact;
use sha2::{Digest, Sha256};

use crate::constants::{FALLBACK_NAME, UID_HASH_BYTES, UID_SALT};
use crate::date::{BirthDate, next_occurrence, parse_birth_date};
use crate::error::{BirthcalError, BirthcalResult};

/// A contact with a usable birthday.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRecord {
    pub name: String,
    /// The `BDAY` value as found in the card.
    pub raw_birthday: String,
    pub birth: BirthDate,
}

impl ContactRecord {
    /// Extract name and birthday from a decoded vCard.
    ///
    /// Returns `Ok(None)` when the card has no (or an empty) `BDAY`, and a
    /// `DateParse` error when the value is present but unreadable.
    pub fn from_vcard(card: &VcardContact) -> BirthcalResult<Option<Self>> {
        let Some(raw_birthday) = property_value(card, "BDAY").filter(|v| !v.trim().is_empty())
        else {
            return Ok(None);
        };

        let birth = parse_birth_date(raw_birthday)?;

        // Name strategy: FN (formatted) > N (structured) > fallback
        let name = property_value(card, "FN")
            .or_else(|| property_value(card, "N"))
            .unwrap_or(FALLBACK_NAME)
            .to_string();

        Ok(Some(ContactRecord {
            name,
            raw_birthday: raw_birthday.to_string(),
            birth,
        }))
    }

    /// Deterministic identifier for this contact, see [`stable_uid`].
    pub fn uid(&self) -> String {
        stable_uid(&self.name, self.birth.date)
    }
}

fn property_value<'a>(card: &'a VcardContact, name: &str) -> Option<&'a str> {
    card.properties
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .and_then(|p| p.value.as_deref())
}

/// Hash name, birth date and a fixed salt into a short hex identifier.
///
/// The same contact yields the same identifier on every sync, which keeps
/// list rows and event UIDs stable without persistent storage.
pub fn stable_uid(name: &str, birth_date: NaiveDate) -> String {
    let input = format!(
        "{}|{}T00:00:00Z|{}",
        name,
        birth_date.format("%Y-%m-%d"),
        UID_SALT
    );
    let digest = Sha256::digest(input.as_bytes());
    format!("{:x}", digest)[..UID_HASH_BYTES * 2].to_string()
}

/// A contact row for the upcoming birthdays view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BirthdayEntry {
    pub uid: String,
    pub name: String,
    pub date_of_birth: NaiveDate,
    /// False when the card only had `--MM-DD`.
    pub year_known: bool,
    /// Primary sorting key of the view.
    pub next_occurrence: NaiveDate,
    /// Age reached at `next_occurrence`. Only meaningful if `year_known`.
    pub age_next: i32,
}

impl BirthdayEntry {
    pub fn new<Tz: TimeZone>(record: &ContactRecord, uid: String, now: &DateTime<Tz>) -> Self {
        let (next_occurrence, age_next) = next_occurrence(now, &record.birth);
        BirthdayEntry {
            uid,
            name: record.name.clone(),
            date_of_birth: record.birth.date,
            year_known: record.birth.year_known,
            next_occurrence,
            age_next,
        }
    }
}

/// Build a record from a card, turning date problems into a skip.
pub(crate) fn record_or_skip(card: &VcardContact) -> Option<ContactRecord> {
    match ContactRecord::from_vcard(card) {
        Ok(record) => record,
        Err(BirthcalError::DateParse(value)) => {
            tracing::debug!(component = "engine", value = %value, "Skipping invalid date format");
            None
        }
        Err(err) => {
            tracing::debug!(component = "engine", error = %err, "Skipping card");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use ical::property::Property;

    fn card(props: &[(&str, &str)]) -> VcardContact {
        let mut card = VcardContact::new();
        card.properties = props
            .iter()
            .map(|(name, value)| Property {
                name: name.to_string(),
                params: None,
                value: Some(value.to_string()),
            })
            .collect();
        card
    }

    #[test]
    fn test_name_prefers_formatted_name() {
        let record = ContactRecord::from_vcard(&card(&[
            ("N", "Doe;Jane;;;"),
            ("FN", "Jane Doe"),
            ("BDAY", "1990-05-15"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(record.name, "Jane Doe");
    }

    #[test]
    fn test_name_falls_back_to_structured_then_fixed_label() {
        let structured = ContactRecord::from_vcard(&card(&[("N", "Doe;Jane;;;"), ("BDAY", "--05-15")]))
            .unwrap()
            .unwrap();
        assert_eq!(structured.name, "Doe;Jane;;;");

        let anonymous = ContactRecord::from_vcard(&card(&[("BDAY", "19900515")]))
            .unwrap()
            .unwrap();
        assert_eq!(anonymous.name, FALLBACK_NAME);
    }

    #[test]
    fn test_missing_or_empty_birthday_is_skipped() {
        assert!(ContactRecord::from_vcard(&card(&[("FN", "No Bday")])).unwrap().is_none());
        assert!(
            ContactRecord::from_vcard(&card(&[("FN", "Empty"), ("BDAY", "")]))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_bad_birthday_is_a_date_parse_error() {
        let result = ContactRecord::from_vcard(&card(&[("FN", "Bad"), ("BDAY", "yesterday")]));
        assert!(matches!(result, Err(BirthcalError::DateParse(_))));
        assert!(record_or_skip(&card(&[("FN", "Bad"), ("BDAY", "yesterday")])).is_none());
    }

    #[test]
    fn test_stable_uid_is_deterministic() {
        let date = NaiveDate::from_ymd_opt(1990, 5, 15).unwrap();
        let first = stable_uid("Jane Doe", date);
        let second = stable_uid("Jane Doe", date);
        assert_eq!(first, second);
        assert_eq!(first.len(), UID_HASH_BYTES * 2);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));

        assert_ne!(first, stable_uid("John Doe", date));
        assert_ne!(first, stable_uid("Jane Doe", date.succ_opt().unwrap()));
    }

    #[test]
    fn test_entry_computes_next_occurrence() {
        let record = ContactRecord::from_vcard(&card(&[("FN", "Jane"), ("BDAY", "1990-03-10")]))
            .unwrap()
            .unwrap();
        let now = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 6, 1, 8, 0, 0)
            .unwrap();
        let entry = BirthdayEntry::new(&record, record.uid(), &now);
        assert_eq!(entry.next_occurrence, NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
        assert_eq!(entry.age_next, 36);
        assert!(entry.year_known);
    }
}
