//! Inbound feedback payloads and the canonical stored record
//!
//! Every backend stores the same eight fields in the same order. The
//! payload coming off the wire is loosely shaped (a multi-select may arrive
//! as a single string or as an array, a rating as a number), so it is
//! flattened here, once, before any backend sees it.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::timefmt;

/// Number of canonical fields in a record
pub const FIELD_COUNT: usize = 8;

/// Column headers shared by the CSV file and the workbook, in field order
pub const HEADERS: [&str; FIELD_COUNT] = [
    "Submission Date",
    "Submission Time",
    "Liked Most",
    "Planning to Buy",
    "Jewel Types",
    "Experience Rating",
    "Name",
    "WhatsApp Number",
];

/// Separator used to join multi-select answers in JSON and the workbook
pub const DEFAULT_SEPARATOR: &str = ", ";

/// Feedback form submission as received over HTTP
///
/// Only the known keys are kept; anything else in the body is ignored.
/// Each value stays a raw JSON value until normalization. Older forms sent
/// the jewellery answer as `interested_in`; it is kept separately and only
/// used when `jewel_types` is absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackPayload {
    pub liked_most: Option<Value>,
    pub jewel_types: Option<Value>,
    pub interested_in: Option<Value>,
    pub planning_to_buy: Option<Value>,
    pub experience_rating: Option<Value>,
    pub name: Option<Value>,
    pub whatsapp: Option<Value>,
}

impl FeedbackPayload {
    /// Build a payload from a decoded JSON body
    ///
    /// Returns `None` when the body is not a JSON object.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self::from_map(fields)),
            _ => None,
        }
    }

    /// Pick the known keys out of a decoded object
    fn from_map(mut fields: Map<String, Value>) -> Self {
        let mut take = |key: &str| fields.remove(key);

        FeedbackPayload {
            liked_most: take("liked_most"),
            jewel_types: take("jewel_types"),
            interested_in: take("interested_in"),
            planning_to_buy: take("planning_to_buy"),
            experience_rating: take("experience_rating"),
            name: take("name"),
            whatsapp: take("whatsapp"),
        }
    }

    /// Build a payload from already-decoded form pairs
    ///
    /// Repeated keys and `key[]` keys (the way browsers send checkbox
    /// groups) are collected into arrays.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut fields: Map<String, Value> = Map::new();

        for (key, value) in pairs {
            let (key, forced_list) = match key.strip_suffix("[]") {
                Some(stripped) => (stripped.to_string(), true),
                None => (key, false),
            };

            match fields.get_mut(&key) {
                Some(Value::Array(items)) => items.push(Value::String(value)),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, Value::String(value)]);
                }
                None if forced_list => {
                    fields.insert(key, Value::Array(vec![Value::String(value)]));
                }
                None => {
                    fields.insert(key, Value::String(value));
                }
            }
        }

        Self::from_map(fields)
    }
}

/// One stored feedback submission, in canonical field order
///
/// Serialized with camelCase keys. Missing keys in older JSON stores
/// deserialize to empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedbackRecord {
    pub submission_date: String,
    pub submission_time: String,
    pub liked_most: String,
    pub planning_to_buy: String,
    pub interested_in: String,
    pub experience_rating: String,
    pub name: String,
    pub whatsapp: String,
}

impl FeedbackRecord {
    /// Normalize a payload into a record
    ///
    /// Never fails. Multi-select answers are joined with `separator`, absent
    /// fields become empty strings, and date and time are both derived from
    /// the single `captured_at` instant so they agree with each other.
    ///
    /// # Examples
    /// ```
    /// use chrono::{Local, TimeZone};
    /// use feedback_ledger::record::{FeedbackPayload, FeedbackRecord};
    /// use serde_json::json;
    ///
    /// let payload = FeedbackPayload::from_json(json!({
    ///     "liked_most": ["Design", "Service"],
    ///     "name": "Asha",
    /// })).unwrap();
    /// let at = Local.with_ymd_and_hms(2024, 9, 8, 13, 5, 0).unwrap();
    ///
    /// let record = FeedbackRecord::normalize(&payload, ", ", &at);
    /// assert_eq!(record.liked_most, "Design, Service");
    /// assert_eq!(record.submission_date, "8/9/2024");
    /// assert_eq!(record.submission_time, "1:05:00 pm");
    /// assert_eq!(record.whatsapp, "");
    /// ```
    pub fn normalize(payload: &FeedbackPayload, separator: &str, captured_at: &DateTime<Local>) -> Self {
        let local = captured_at.naive_local();
        let field = |value: &Option<Value>| {
            value
                .as_ref()
                .map(|v| flatten_value(v, separator))
                .unwrap_or_default()
        };

        FeedbackRecord {
            submission_date: timefmt::display_date(&local),
            submission_time: timefmt::display_time(&local),
            liked_most: field(&payload.liked_most),
            planning_to_buy: field(&payload.planning_to_buy),
            interested_in: field(if payload.jewel_types.is_some() {
                &payload.jewel_types
            } else {
                &payload.interested_in
            }),
            experience_rating: field(&payload.experience_rating),
            name: field(&payload.name),
            whatsapp: field(&payload.whatsapp),
        }
    }

    /// Field values in canonical order
    pub fn to_row(&self) -> [&str; FIELD_COUNT] {
        [
            &self.submission_date,
            &self.submission_time,
            &self.liked_most,
            &self.planning_to_buy,
            &self.interested_in,
            &self.experience_rating,
            &self.name,
            &self.whatsapp,
        ]
    }

    /// Build a record from a row of cells in canonical order
    ///
    /// Short rows are padded with empty strings, extra cells are ignored.
    pub fn from_row<S: AsRef<str>>(cells: &[S]) -> Self {
        let cell = |index: usize| {
            cells
                .get(index)
                .map(|c| c.as_ref().to_string())
                .unwrap_or_default()
        };

        FeedbackRecord {
            submission_date: cell(0),
            submission_time: cell(1),
            liked_most: cell(2),
            planning_to_buy: cell(3),
            interested_in: cell(4),
            experience_rating: cell(5),
            name: cell(6),
            whatsapp: cell(7),
        }
    }

    /// Bring legacy date and time strings onto the display format
    pub fn with_normalized_timestamp(mut self) -> Self {
        self.submission_date = timefmt::normalize_date(&self.submission_date);
        self.submission_time = timefmt::normalize_time(&self.submission_time);
        self
    }
}

/// Flatten a raw JSON value into the single string stored for a field
fn flatten_value(value: &Value, separator: &str) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| flatten_value(item, separator))
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join(separator),
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn captured() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 9, 8, 8, 5, 1).unwrap()
    }

    #[test]
    fn arrays_are_joined_with_the_separator() {
        let payload = FeedbackPayload::from_json(json!({
            "liked_most": ["Design", "Staff", "Pricing"],
            "jewel_types": ["Rings", "Necklaces"],
        }))
        .unwrap();

        let json_record = FeedbackRecord::normalize(&payload, ", ", &captured());
        let csv_record = FeedbackRecord::normalize(&payload, "; ", &captured());

        assert_eq!(json_record.liked_most, "Design, Staff, Pricing");
        assert_eq!(json_record.interested_in, "Rings, Necklaces");
        assert_eq!(csv_record.liked_most, "Design; Staff; Pricing");
        assert_eq!(csv_record.interested_in, "Rings; Necklaces");
    }

    #[test]
    fn missing_and_null_fields_become_empty() {
        let payload = FeedbackPayload::from_json(json!({
            "name": null,
            "unexpected": "ignored",
        }))
        .unwrap();

        let record = FeedbackRecord::normalize(&payload, ", ", &captured());

        assert_eq!(record.submission_date, "8/9/2024");
        assert_eq!(record.submission_time, "8:05:01 am");
        for value in &record.to_row()[2..] {
            assert_eq!(*value, "");
        }
    }

    #[test]
    fn scalars_keep_their_text_form() {
        let payload = FeedbackPayload::from_json(json!({
            "experience_rating": 5,
            "planning_to_buy": "  Yes  ",
            "liked_most": "Ambience",
            "interested_in": "Bangles",
        }))
        .unwrap();

        let record = FeedbackRecord::normalize(&payload, ", ", &captured());

        assert_eq!(record.experience_rating, "5");
        assert_eq!(record.planning_to_buy, "Yes");
        assert_eq!(record.liked_most, "Ambience");
        assert_eq!(record.interested_in, "Bangles");
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(FeedbackPayload::from_json(json!(["a", "b"])).is_none());
        assert!(FeedbackPayload::from_json(json!("text")).is_none());
    }

    #[test]
    fn form_pairs_collect_repeated_keys() {
        let payload = FeedbackPayload::from_pairs(vec![
            ("liked_most".to_string(), "Design".to_string()),
            ("liked_most".to_string(), "Staff".to_string()),
            ("jewel_types[]".to_string(), "Rings".to_string()),
            ("name".to_string(), "Ravi".to_string()),
        ]);

        let record = FeedbackRecord::normalize(&payload, ", ", &captured());

        assert_eq!(record.liked_most, "Design, Staff");
        assert_eq!(record.interested_in, "Rings");
        assert_eq!(record.name, "Ravi");
    }

    #[test]
    fn both_jewellery_keys_keep_the_rest_of_the_form() {
        let pairs = vec![
            ("name".to_string(), "Asha".to_string()),
            ("whatsapp".to_string(), "98765".to_string()),
            ("jewel_types".to_string(), "Rings".to_string()),
            ("interested_in".to_string(), "Bangles".to_string()),
        ];
        let record = FeedbackRecord::normalize(&FeedbackPayload::from_pairs(pairs), ", ", &captured());

        assert_eq!(record.name, "Asha");
        assert_eq!(record.whatsapp, "98765");
        assert_eq!(record.interested_in, "Rings");

        let payload = FeedbackPayload::from_json(json!({
            "name": "Asha",
            "jewel_types": "Rings",
            "interested_in": "Bangles",
        }))
        .unwrap();
        let record = FeedbackRecord::normalize(&payload, ", ", &captured());

        assert_eq!(record.name, "Asha");
        assert_eq!(record.interested_in, "Rings");
    }

    #[test]
    fn rows_pad_and_round_trip() {
        let record = FeedbackRecord::from_row(&["1/2/2024", "9:00:00 am", "Design"]);
        assert_eq!(record.liked_most, "Design");
        assert_eq!(record.whatsapp, "");

        let again = FeedbackRecord::from_row(&record.to_row());
        assert_eq!(again, record);
    }

    #[test]
    fn json_keys_are_camel_case_in_field_order() {
        let record = FeedbackRecord::from_row(&["1/2/2024", "9:00:00 am"]);
        let text = serde_json::to_string(&record).unwrap();

        let date = text.find("submissionDate").unwrap();
        let liked = text.find("likedMost").unwrap();
        let whatsapp = text.find("whatsapp").unwrap();
        assert!(date < liked && liked < whatsapp);
    }
}
