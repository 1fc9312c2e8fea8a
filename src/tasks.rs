//! Record operation translator: turns parsed task commands into record store
//! calls and renders the results for chat.

use crate::config::TasksConfig;
use crate::error::{StoreError, TaskError, TaskResult};
use crate::property::{self, FieldSchema, MISSING, PropertyType, Schema, USER_DATE_FORMAT};
use crate::record_store::{Filter, Properties, Record, RecordStore, Sort};
use std::sync::Arc;
use tracing::debug;

/// Task operations against a [`RecordStore`].
#[derive(Clone)]
pub struct TaskBook {
    store: Arc<dyn RecordStore>,
    fields: TasksConfig,
}

impl TaskBook {
    pub fn new(store: Arc<dyn RecordStore>, fields: TasksConfig) -> Self {
        Self { store, fields }
    }

    fn field<'a>(&self, schema: &'a Schema, name: &str) -> TaskResult<&'a FieldSchema> {
        schema
            .field(name)
            .filter(|f| f.kind != PropertyType::Unknown)
            .ok_or_else(|| TaskError::UnsupportedField(name.to_string()))
    }

    /// Creates a task in the initial status with a `MM/DD/YYYY` due date.
    pub async fn create(&self, title: &str, due: &str) -> TaskResult<String> {
        let title = title.trim();
        if title.is_empty() {
            return Err(TaskError::Validation("Task name cannot be empty.".into()));
        }
        let date = property::parse_user_date(due)?;
        let schema = self.store.schema().await?;
        let f = &self.fields;
        let mut props = Properties::new();
        for (name, raw) in [
            (&f.title_property, title),
            (&f.status_property, f.initial_status.as_str()),
            (&f.due_property, due.trim()),
        ] {
            let field = self.field(&schema, name)?;
            props.insert(name.clone(), property::encode(field, raw)?);
        }
        let record = self.store.create(props).await?;
        debug!(id = %record.id, %title, "task created");
        Ok(format!(
            "✅ Task '{title}' created in Notion, due {}.",
            date.format(USER_DATE_FORMAT)
        ))
    }

    /// Lists every task not in the done status, soonest due first.
    pub async fn list(&self) -> TaskResult<String> {
        let schema = self.store.schema().await?;
        let f = &self.fields;
        let status = self.field(&schema, &f.status_property)?;
        let mut filter = Filter::ChoiceNotEquals {
            property: status.name.clone(),
            tag: status.tag.clone(),
            value: f.done_status.clone(),
        };
        if let (Some(property), Some(user_id)) = (&f.assignee_property, &f.assignee_id) {
            filter = Filter::And(vec![
                filter,
                Filter::PersonContains {
                    property: property.clone(),
                    user_id: user_id.clone(),
                },
            ]);
        }
        let sorts = [
            Sort::ascending(f.due_property.clone()),
            Sort::ascending(f.title_property.clone()),
        ];
        let records = self.store.query(Some(&filter), &sorts).await?;
        if records.is_empty() {
            return Ok("🎉 No active tasks found.".into());
        }
        let mut out = String::from("📋 Active Tasks:\n");
        for record in &records {
            out.push_str(&format!(
                "• {} | Status: {} | Due: {}\n",
                self.title_of(record),
                record
                    .property(&f.status_property)
                    .and_then(property::choice_name)
                    .unwrap_or_else(|| MISSING.into()),
                record
                    .property(&f.due_property)
                    .and_then(property::date_text)
                    .unwrap_or_else(|| MISSING.into()),
            ));
        }
        Ok(out)
    }

    /// Sets one field of a task. The encoding follows the field's type as the
    /// store declares it.
    pub async fn update(&self, identity: &str, field_name: &str, value: &str) -> TaskResult<String> {
        let schema = self.store.schema().await?;
        let field = self.field(&schema, field_name.trim())?;
        let record = self.resolve(identity).await?;
        let mut props = Properties::new();
        props.insert(field.name.clone(), property::encode(field, value.trim())?);
        match self.store.update(&record.id, props).await {
            Ok(_) => {}
            Err(StoreError::Rejected(reason)) => {
                return Err(TaskError::UnsupportedValue {
                    field: field.name.clone(),
                    value: value.trim().to_string(),
                    reason,
                });
            }
            Err(e) => return Err(e.into()),
        }
        debug!(id = %record.id, field = %field.name, "task updated");
        Ok(format!(
            "✅ Task '{}' updated: {} is now {}.",
            self.title_of(&record),
            field.name,
            value.trim()
        ))
    }

    /// Renders every property of a task, one line each in name order.
    pub async fn details(&self, identity: &str) -> TaskResult<String> {
        let record = self.resolve(identity).await?;
        let mut out = format!("🗂 Details for {}:\n", self.title_of(&record));
        for (name, prop) in &record.properties {
            out.push_str(&format!("• {name}: {}\n", property::render(prop)));
        }
        Ok(out)
    }

    /// Finds the record a user means, by store id or by exact title.
    ///
    /// Several records sharing the title is reported as
    /// [`TaskError::AmbiguousTitle`] instead of picking one.
    pub async fn resolve(&self, identity: &str) -> TaskResult<Record> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(TaskError::Validation("Task name cannot be empty.".into()));
        }
        if uuid::Uuid::parse_str(identity).is_ok() {
            return match self.store.retrieve(identity).await {
                Ok(record) => Ok(record),
                Err(StoreError::Status { status: 404, .. }) => {
                    Err(TaskError::NotFound(identity.to_string()))
                }
                Err(e) => Err(e.into()),
            };
        }
        let filter = Filter::TitleEquals {
            property: self.fields.title_property.clone(),
            value: identity.to_string(),
        };
        let mut matches = self.store.query(Some(&filter), &[]).await?;
        match matches.len() {
            0 => Err(TaskError::NotFound(identity.to_string())),
            1 => Ok(matches.remove(0)),
            count => Err(TaskError::AmbiguousTitle {
                title: identity.to_string(),
                count,
                ids: matches.into_iter().map(|r| r.id).collect(),
            }),
        }
    }

    fn title_of(&self, record: &Record) -> String {
        record
            .property(&self.fields.title_property)
            .and_then(property::title_text)
            .unwrap_or_else(|| "Untitled".into())
    }
}
