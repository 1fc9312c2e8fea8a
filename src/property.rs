//! Property translator: turns a human-typed value into a store-shaped typed
//! property and renders store properties back into text.
//!
//! Dispatch is driven by the type tag the store reports for each field, so a
//! deployment can add or rename fields without touching the dialogue layer.

use crate::error::{TaskError, TaskResult};
use chrono::NaiveDate;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Format users type and read dates in.
pub const USER_DATE_FORMAT: &str = "%m/%d/%Y";
/// Format dates cross the store boundary in.
pub const STORE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Placeholder for values that are absent or cannot be rendered.
pub const MISSING: &str = "N/A";

/// Closed set of property shapes the translator knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Title,
    Choice,
    Date,
    RichText,
    Contact,
    PersonList,
    Unknown,
}

impl PropertyType {
    /// Maps a store type tag onto a known shape.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "title" => PropertyType::Title,
            "status" | "select" => PropertyType::Choice,
            "date" => PropertyType::Date,
            "rich_text" => PropertyType::RichText,
            "email" | "phone_number" | "url" => PropertyType::Contact,
            "people" => PropertyType::PersonList,
            _ => PropertyType::Unknown,
        }
    }
}

/// One field as declared by the store schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    /// Raw tag reported by the store, e.g. `status` or `select`.
    pub tag: String,
    pub kind: PropertyType,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self {
            name: name.into(),
            kind: PropertyType::from_tag(&tag),
            tag,
        }
    }
}

/// Live description of the fields a task record carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: BTreeMap<String, FieldSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, replacing any previous declaration with the same name.
    pub fn with_field(mut self, name: impl Into<String>, tag: impl Into<String>) -> Self {
        self.insert(FieldSchema::new(name, tag));
        self
    }

    pub fn insert(&mut self, field: FieldSchema) {
        self.fields.insert(field.name.clone(), field);
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }
}

/// Parses a `MM/DD/YYYY` date typed by a user.
///
/// ```
/// use astra::property::parse_user_date;
/// assert!(parse_user_date("06/25/2025").is_ok());
/// assert!(parse_user_date("13/45/2025").is_err());
/// ```
pub fn parse_user_date(raw: &str) -> TaskResult<NaiveDate> {
    let raw = raw.trim();
    // `%Y` alone takes any number of digits.
    let four_digit_year = raw
        .rsplit('/')
        .next()
        .is_some_and(|year| year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit()));
    if !four_digit_year {
        return Err(TaskError::invalid_date(raw));
    }
    NaiveDate::parse_from_str(raw, USER_DATE_FORMAT).map_err(|_| TaskError::invalid_date(raw))
}

pub fn to_store_date(date: NaiveDate) -> String {
    date.format(STORE_DATE_FORMAT).to_string()
}

/// Re-renders a store date (optionally carrying a time part) as `MM/DD/YYYY`.
pub fn user_date_from_store(iso: &str) -> Option<String> {
    let day = iso.get(..10)?;
    NaiveDate::parse_from_str(day, STORE_DATE_FORMAT)
        .ok()
        .map(|d| d.format(USER_DATE_FORMAT).to_string())
}

fn text_segments(content: &str) -> Value {
    json!([{ "text": { "content": content } }])
}

fn keyed(tag: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(tag.to_string(), value);
    Value::Object(map)
}

/// Builds the store-shaped update value for `field` from a raw string.
///
/// Choice values are not checked against the field's options here; the store
/// is the authority on which names exist.
pub fn encode(field: &FieldSchema, raw: &str) -> TaskResult<Value> {
    let value = match field.kind {
        PropertyType::Title => keyed("title", text_segments(raw)),
        PropertyType::RichText => keyed("rich_text", text_segments(raw)),
        PropertyType::Choice => keyed(&field.tag, json!({ "name": raw })),
        PropertyType::Date => {
            let date = parse_user_date(raw)?;
            keyed("date", json!({ "start": to_store_date(date) }))
        }
        PropertyType::Contact => keyed(&field.tag, json!(raw)),
        PropertyType::PersonList => keyed("people", json!([{ "object": "user", "id": raw }])),
        PropertyType::Unknown => return Err(TaskError::UnsupportedField(field.name.clone())),
    };
    Ok(value)
}

fn tag_of(prop: &Value) -> &str {
    prop.get("type").and_then(Value::as_str).unwrap_or_default()
}

/// Concatenates the plain text of a title or rich-text segment list.
fn joined_text(segments: &Value) -> Option<String> {
    let segments = segments.as_array()?;
    let text: String = segments
        .iter()
        .filter_map(|s| {
            s.get("plain_text")
                .or_else(|| s.get("text").and_then(|t| t.get("content")))
                .and_then(Value::as_str)
        })
        .collect();
    if text.is_empty() { None } else { Some(text) }
}

/// Plain text of a title property, if it has any.
pub fn title_text(prop: &Value) -> Option<String> {
    joined_text(prop.get("title")?)
}

/// Start of a date property, re-rendered as `MM/DD/YYYY`.
pub fn date_text(prop: &Value) -> Option<String> {
    let start = prop.get("date")?.get("start")?.as_str()?;
    user_date_from_store(start).or_else(|| Some(start.to_string()))
}

/// Name of the selected option of a status or select property.
pub fn choice_name(prop: &Value) -> Option<String> {
    let tag = tag_of(prop);
    prop.get(tag)?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

/// Renders any store property as display text.
///
/// Shapes that cannot be rendered yield [`MISSING`] instead of failing, so
/// one odd field never hides the rest of a record.
pub fn render(prop: &Value) -> String {
    let tag = tag_of(prop);
    match PropertyType::from_tag(tag) {
        PropertyType::Title => title_text(prop).unwrap_or_else(|| "Untitled".into()),
        PropertyType::RichText => prop
            .get("rich_text")
            .and_then(joined_text)
            .unwrap_or_else(|| MISSING.into()),
        PropertyType::Choice => choice_name(prop).unwrap_or_else(|| MISSING.into()),
        PropertyType::Date => date_text(prop).unwrap_or_else(|| MISSING.into()),
        PropertyType::Contact => prop
            .get(tag)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| MISSING.into()),
        PropertyType::PersonList => {
            let names: Vec<&str> = prop
                .get("people")
                .and_then(Value::as_array)
                .map(|people| {
                    people
                        .iter()
                        .filter_map(|p| p.get("name").or_else(|| p.get("id")))
                        .filter_map(Value::as_str)
                        .collect()
                })
                .unwrap_or_default();
            if names.is_empty() {
                "Unassigned".into()
            } else {
                names.join(", ")
            }
        }
        PropertyType::Unknown => MISSING.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_map_onto_known_shapes() {
        assert_eq!(PropertyType::from_tag("status"), PropertyType::Choice);
        assert_eq!(PropertyType::from_tag("select"), PropertyType::Choice);
        assert_eq!(PropertyType::from_tag("people"), PropertyType::PersonList);
        assert_eq!(PropertyType::from_tag("formula"), PropertyType::Unknown);
    }

    #[test]
    fn short_years_are_rejected() {
        for raw in ["06/25/25", "06/25/025", "06/25/+2025", "06/25/20255"] {
            let err = parse_user_date(raw).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("Invalid date format '{raw}'. Use MM/DD/YYYY.")
            );
        }
        assert!(parse_user_date(" 6/5/2025 ").is_ok());
    }

    #[test]
    fn encodes_date_in_store_form() {
        let field = FieldSchema::new("Due Date", "date");
        let value = encode(&field, "06/25/2025").unwrap();
        assert_eq!(value, json!({ "date": { "start": "2025-06-25" } }));
    }

    #[test]
    fn rejects_bad_date() {
        let field = FieldSchema::new("Due Date", "date");
        let err = encode(&field, "13/45/2025").unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));
        assert!(err.to_string().contains("MM/DD/YYYY"));
    }

    #[test]
    fn choice_uses_store_tag() {
        let status = FieldSchema::new("Status", "status");
        let select = FieldSchema::new("Priority", "select");
        assert_eq!(
            encode(&status, "Done").unwrap(),
            json!({ "status": { "name": "Done" } })
        );
        assert_eq!(
            encode(&select, "High").unwrap(),
            json!({ "select": { "name": "High" } })
        );
    }

    #[test]
    fn contact_passes_through_verbatim() {
        let field = FieldSchema::new("Owner email", "email");
        assert_eq!(
            encode(&field, "a@b.c").unwrap(),
            json!({ "email": "a@b.c" })
        );
    }

    #[test]
    fn unknown_field_type_is_rejected() {
        let field = FieldSchema::new("Score", "formula");
        let err = encode(&field, "1").unwrap_err();
        assert!(matches!(err, TaskError::UnsupportedField(name) if name == "Score"));
    }

    #[test]
    fn renders_each_shape() {
        let title = json!({ "type": "title", "title": [{ "plain_text": "Ship it" }] });
        let date = json!({ "type": "date", "date": { "start": "2025-06-25" } });
        let empty_date = json!({ "type": "date", "date": null });
        let people = json!({ "type": "people", "people": [{ "name": "Ada" }, { "name": "Lin" }] });
        let nobody = json!({ "type": "people", "people": [] });
        let text = json!({ "type": "rich_text", "rich_text": [] });
        let formula = json!({ "type": "formula", "formula": { "number": 3 } });
        assert_eq!(render(&title), "Ship it");
        assert_eq!(render(&date), "06/25/2025");
        assert_eq!(render(&empty_date), MISSING);
        assert_eq!(render(&people), "Ada, Lin");
        assert_eq!(render(&nobody), "Unassigned");
        assert_eq!(render(&text), MISSING);
        assert_eq!(render(&formula), MISSING);
    }

    #[test]
    fn store_date_with_time_renders_day() {
        assert_eq!(
            user_date_from_store("2025-06-25T10:00:00.000+00:00").as_deref(),
            Some("06/25/2025")
        );
    }
}
