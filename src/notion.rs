use crate::config::NotionConfig;
use crate::error::StoreError;
use crate::property::{FieldSchema, Schema};
use crate::record_store::{Filter, Properties, Record, RecordStore, Sort};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, trace};

/// [`RecordStore`] backed by a Notion database over the public REST API.
#[derive(Clone)]
pub struct NotionStore {
    http: Client,
    base_url: String,
    token: String,
    database_id: String,
    version: String,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct QueryPage {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

impl NotionStore {
    pub fn new(cfg: &NotionConfig, token: impl Into<String>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.api_base.trim_end_matches('/').to_string(),
            token: token.into(),
            database_id: cfg.database_id.clone(),
            version: cfg.version.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        trace!(target = "notion", %method, %url, "notion request");
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.version)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Value, StoreError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let body = resp.text().await.unwrap_or_default();
        let err: ApiError = serde_json::from_str(&body).unwrap_or(ApiError {
            code: String::new(),
            message: body,
        });
        debug!(target = "notion", %status, code = %err.code, "notion error");
        if status == StatusCode::BAD_REQUEST && err.code == "validation_error" {
            return Err(StoreError::Rejected(err.message));
        }
        Err(StoreError::Status {
            status: status.as_u16(),
            message: err.message,
        })
    }
}

fn parse_record(page: Value) -> Result<Record, StoreError> {
    let id = page
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Malformed("page without id".into()))?
        .to_string();
    let properties = match page.get("properties") {
        Some(Value::Object(map)) => map.clone().into_iter().collect(),
        _ => return Err(StoreError::Malformed(format!("page {id} without properties"))),
    };
    Ok(Record { id, properties })
}

fn parse_schema(database: &Value) -> Result<Schema, StoreError> {
    let Some(Value::Object(props)) = database.get("properties") else {
        return Err(StoreError::Malformed("database without properties".into()));
    };
    let mut schema = Schema::new();
    for (name, prop) in props {
        let tag = prop.get("type").and_then(Value::as_str).unwrap_or_default();
        schema.insert(FieldSchema::new(name.clone(), tag));
    }
    Ok(schema)
}

/// Renders a [`Filter`] in Notion's query filter syntax.
pub fn filter_json(filter: &Filter) -> Value {
    match filter {
        Filter::TitleEquals { property, value } => {
            json!({ "property": property, "title": { "equals": value } })
        }
        Filter::ChoiceNotEquals {
            property,
            tag,
            value,
        } => {
            let mut cond = Map::new();
            cond.insert("property".into(), json!(property));
            cond.insert(tag.clone(), json!({ "does_not_equal": value }));
            Value::Object(cond)
        }
        Filter::PersonContains { property, user_id } => {
            json!({ "property": property, "people": { "contains": user_id } })
        }
        Filter::And(all) => json!({ "and": all.iter().map(filter_json).collect::<Vec<_>>() }),
    }
}

fn sort_json(sort: &Sort) -> Value {
    let direction = if sort.ascending { "ascending" } else { "descending" };
    json!({ "property": sort.property, "direction": direction })
}

#[async_trait]
impl RecordStore for NotionStore {
    async fn schema(&self) -> Result<Schema, StoreError> {
        let path = format!("databases/{}", self.database_id);
        let db = self.send(self.request(reqwest::Method::GET, &path)).await?;
        parse_schema(&db)
    }

    async fn create(&self, properties: Properties) -> Result<Record, StoreError> {
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": properties,
        });
        let page = self
            .send(self.request(reqwest::Method::POST, "pages").json(&body))
            .await?;
        parse_record(page)
    }

    async fn query(
        &self,
        filter: Option<&Filter>,
        sorts: &[Sort],
    ) -> Result<Vec<Record>, StoreError> {
        let path = format!("databases/{}/query", self.database_id);
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({ "sorts": sorts.iter().map(sort_json).collect::<Vec<_>>() });
            if let Some(f) = filter {
                body["filter"] = filter_json(f);
            }
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }
            let value = self
                .send(self.request(reqwest::Method::POST, &path).json(&body))
                .await?;
            let page: QueryPage = serde_json::from_value(value)
                .map_err(|e| StoreError::Malformed(e.to_string()))?;
            for result in page.results {
                out.push(parse_record(result)?);
            }
            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }
        debug!(target = "notion", count = out.len(), "queried records");
        Ok(out)
    }

    async fn update(&self, id: &str, properties: Properties) -> Result<Record, StoreError> {
        let body = json!({ "properties": properties });
        let page = self
            .send(
                self.request(reqwest::Method::PATCH, &format!("pages/{id}"))
                    .json(&body),
            )
            .await?;
        parse_record(page)
    }

    async fn retrieve(&self, id: &str) -> Result<Record, StoreError> {
        let page = self
            .send(self.request(reqwest::Method::GET, &format!("pages/{id}")))
            .await?;
        parse_record(page)
    }
}
