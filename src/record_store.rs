use crate::error::StoreError;
use crate::property::{self, FieldSchema, PropertyType, Schema};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Store-shaped properties keyed by field name.
pub type Properties = BTreeMap<String, Value>;

/// A task record as returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub properties: Properties,
}

impl Record {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// Store-neutral query filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Exact, case-sensitive title match.
    TitleEquals { property: String, value: String },
    /// Choice field whose selected option is not `value`. `tag` is the
    /// store's type tag for the field (`status` or `select`).
    ChoiceNotEquals {
        property: String,
        tag: String,
        value: String,
    },
    /// Person-list field containing the given user id.
    PersonContains { property: String, user_id: String },
    And(Vec<Filter>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub property: String,
    pub ascending: bool,
}

impl Sort {
    pub fn ascending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ascending: true,
        }
    }
}

/// Operations consumed from the structured-record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Reports the fields task records currently declare.
    async fn schema(&self) -> Result<Schema, StoreError>;

    async fn create(&self, properties: Properties) -> Result<Record, StoreError>;

    /// Returns matching records in store order after applying `sorts`.
    async fn query(&self, filter: Option<&Filter>, sorts: &[Sort])
    -> Result<Vec<Record>, StoreError>;

    async fn update(&self, id: &str, properties: Properties) -> Result<Record, StoreError>;

    /// Fetches one record. A missing record is a `Status` error with 404.
    async fn retrieve(&self, id: &str) -> Result<Record, StoreError>;
}

/// Record store held in memory. Used by tests and for running the bot
/// without a backing service. Behaves like the HTTP store: properties are
/// tagged with their schema type, unknown fields and choice names outside a
/// field's options are rejected.
#[derive(Default)]
pub struct InMemoryRecordStore {
    schema: Schema,
    options: BTreeMap<String, Vec<String>>,
    records: Mutex<Vec<Record>>,
    mutations: Mutex<usize>,
}

impl InMemoryRecordStore {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            ..Self::default()
        }
    }

    /// Restricts a choice field to the given option names.
    pub fn with_options(mut self, field: &str, options: &[&str]) -> Self {
        self.options.insert(
            field.to_string(),
            options.iter().map(|o| o.to_string()).collect(),
        );
        self
    }

    /// Number of create and update calls that reached the store.
    pub async fn mutation_count(&self) -> usize {
        *self.mutations.lock().await
    }

    pub async fn records(&self) -> Vec<Record> {
        self.records.lock().await.clone()
    }

    fn tag(&self, field: &FieldSchema, value: &Value) -> Result<Value, StoreError> {
        if let Some(options) = self.options.get(&field.name) {
            if field.kind == PropertyType::Choice {
                let name = value
                    .get(&field.tag)
                    .and_then(|c| c.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if !options.iter().any(|o| o == name) {
                    return Err(StoreError::Rejected(format!(
                        "Invalid {} option \"{name}\" for {}.",
                        field.tag, field.name
                    )));
                }
            }
        }
        let mut value = value.clone();
        let Some(map) = value.as_object_mut() else {
            return Err(StoreError::Rejected(format!(
                "{} should be an object.",
                field.name
            )));
        };
        map.insert("type".into(), Value::String(field.tag.clone()));
        Ok(value)
    }

    fn normalize(&self, properties: Properties) -> Result<Properties, StoreError> {
        properties
            .into_iter()
            .map(|(name, value)| {
                let field = self.schema.field(&name).ok_or_else(|| {
                    StoreError::Rejected(format!("{name} is not a property that exists."))
                })?;
                Ok((name, self.tag(field, &value)?))
            })
            .collect()
    }
}

fn not_found(id: &str) -> StoreError {
    StoreError::Status {
        status: 404,
        message: format!("Could not find page with ID: {id}."),
    }
}

fn matches(record: &Record, filter: &Filter) -> bool {
    match filter {
        Filter::TitleEquals { property, value } => record
            .property(property)
            .and_then(property::title_text)
            .is_some_and(|t| &t == value),
        Filter::ChoiceNotEquals {
            property, value, ..
        } => record
            .property(property)
            .and_then(property::choice_name)
            .is_none_or(|name| &name != value),
        Filter::PersonContains { property, user_id } => record
            .property(property)
            .and_then(|p| p.get("people"))
            .and_then(Value::as_array)
            .is_some_and(|people| {
                people
                    .iter()
                    .any(|p| p.get("id").and_then(Value::as_str) == Some(user_id))
            }),
        Filter::And(all) => all.iter().all(|f| matches(record, f)),
    }
}

/// Sort key for one property; dates sort by their ISO form, absent values last.
fn sort_key(record: &Record, property: &str) -> Option<String> {
    let prop = record.property(property)?;
    match property::PropertyType::from_tag(prop.get("type")?.as_str()?) {
        PropertyType::Date => prop
            .get("date")?
            .get("start")?
            .as_str()
            .map(str::to_string),
        PropertyType::Unknown => None,
        _ => Some(property::render(prop)),
    }
}

fn compare(a: &Record, b: &Record, sorts: &[Sort]) -> Ordering {
    for sort in sorts {
        let ord = match (sort_key(a, &sort.property), sort_key(b, &sort.property)) {
            (Some(x), Some(y)) if sort.ascending => x.cmp(&y),
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn schema(&self) -> Result<Schema, StoreError> {
        Ok(self.schema.clone())
    }

    async fn create(&self, properties: Properties) -> Result<Record, StoreError> {
        *self.mutations.lock().await += 1;
        let record = Record {
            id: uuid::Uuid::new_v4().to_string(),
            properties: self.normalize(properties)?,
        };
        self.records.lock().await.push(record.clone());
        Ok(record)
    }

    async fn query(
        &self,
        filter: Option<&Filter>,
        sorts: &[Sort],
    ) -> Result<Vec<Record>, StoreError> {
        let mut found: Vec<Record> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| filter.is_none_or(|f| matches(r, f)))
            .cloned()
            .collect();
        found.sort_by(|a, b| compare(a, b, sorts));
        Ok(found)
    }

    async fn update(&self, id: &str, properties: Properties) -> Result<Record, StoreError> {
        *self.mutations.lock().await += 1;
        let properties = self.normalize(properties)?;
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| not_found(id))?;
        record.properties.extend(properties);
        Ok(record.clone())
    }

    async fn retrieve(&self, id: &str) -> Result<Record, StoreError> {
        self.records
            .lock()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .with_field("Task name", "title")
            .with_field("Status", "status")
            .with_field("Due Date", "date")
    }

    fn task(name: &str, status: &str, due: Option<&str>) -> Properties {
        let mut props = Properties::new();
        props.insert(
            "Task name".into(),
            json!({ "title": [{ "text": { "content": name } }] }),
        );
        props.insert("Status".into(), json!({ "status": { "name": status } }));
        if let Some(due) = due {
            props.insert("Due Date".into(), json!({ "date": { "start": due } }));
        }
        props
    }

    #[tokio::test]
    async fn tags_properties_with_schema_type() {
        let store = InMemoryRecordStore::new(schema());
        let rec = store.create(task("A", "Not started", None)).await.unwrap();
        assert_eq!(rec.properties["Status"]["type"], "status");
    }

    #[tokio::test]
    async fn rejects_unknown_field() {
        let store = InMemoryRecordStore::new(schema());
        let mut props = task("A", "Not started", None);
        props.insert("Mood".into(), json!({ "select": { "name": "x" } }));
        let err = store.create(props).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn filters_and_sorts() {
        let store = InMemoryRecordStore::new(schema());
        store
            .create(task("Later", "Not started", Some("2025-07-01")))
            .await
            .unwrap();
        store
            .create(task("Finished", "Done", Some("2025-01-01")))
            .await
            .unwrap();
        store.create(task("Undated", "In progress", None)).await.unwrap();
        store
            .create(task("Sooner", "Not started", Some("2025-06-01")))
            .await
            .unwrap();
        let filter = Filter::ChoiceNotEquals {
            property: "Status".into(),
            tag: "status".into(),
            value: "Done".into(),
        };
        let found = store
            .query(Some(&filter), &[Sort::ascending("Due Date")])
            .await
            .unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|r| property::render(&r.properties["Task name"]))
            .collect();
        assert_eq!(names, vec!["Sooner", "Later", "Undated"]);
    }

    #[tokio::test]
    async fn retrieve_missing_is_404() {
        let store = InMemoryRecordStore::new(schema());
        let err = store.retrieve("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::Status { status: 404, .. }));
    }
}
