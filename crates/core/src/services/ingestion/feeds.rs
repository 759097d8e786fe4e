//! Passive event feeds: banking aggregator webhooks and database change
//! streams.
//!
//! Events arrive scoped to an external resource id. The owner is looked up
//! in `feed_connection`, never taken from the payload.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use herald_common::{AppError, AppResult, IdGenerator};
use herald_db::entities::feed_connection;
use herald_db::repositories::FeedConnectionRepository;
use sea_orm::Set;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::services::event::Priority;

/// A feed whose events are pushed to us without a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedSource {
    /// Banking aggregator webhooks
    Banking,
    /// Database change feed
    Database,
}

impl FeedSource {
    /// Name stored on connection rows
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Banking => "banking",
            Self::Database => "database",
        }
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedSource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "banking" => Ok(Self::Banking),
            "database" => Ok(Self::Database),
            "calendar" => Err(AppError::BadRequest(
                "calendar is connected through a watch channel".to_string(),
            )),
            other => Err(AppError::BadRequest(format!("unknown feed source: {other}"))),
        }
    }
}

/// Title, body and priority of a mapped event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Notification title
    pub title: String,
    /// Notification body
    pub body: String,
    /// Notification priority
    pub priority: Priority,
}

impl Template {
    fn new(title: &str, body: impl Into<String>, priority: Priority) -> Self {
        Self {
            title: title.to_string(),
            body: body.into(),
            priority,
        }
    }
}

/// Banking aggregator webhook body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankingPayload {
    /// Event name such as `transactions/created`
    #[serde(alias = "eventType")]
    pub event: String,
    /// Aggregator event id, used for dedup
    pub event_id: Option<String>,
    /// Connected bank item
    pub item_id: String,
    /// Event-specific data
    #[serde(default)]
    pub data: Value,
}

/// Template for a banking event, or `None` for events we do not notify.
#[must_use]
pub fn banking_template(event: &str, data: &Value) -> Option<Template> {
    let template = match event {
        "item/created" => Template::new(
            "Bank connected",
            "Your bank account was connected.",
            Priority::Low,
        ),
        "item/updated" => Template::new(
            "Bank data updated",
            "Your bank data was synchronized.",
            Priority::Low,
        ),
        "item/error" => Template::new(
            "Bank connection error",
            "We could not sync your bank account. Please review the connection.",
            Priority::High,
        ),
        "item/waiting_user_input" => Template::new(
            "Action required",
            "Your bank is asking for additional confirmation to keep syncing.",
            Priority::High,
        ),
        "item/login_succeeded" => Template::new(
            "Bank login succeeded",
            "Your bank credentials were accepted.",
            Priority::Low,
        ),
        "item/deleted" => Template::new(
            "Bank disconnected",
            "A bank connection was removed.",
            Priority::Normal,
        ),
        "transactions/created" => {
            let body = match data.get("transactionsCount").and_then(Value::as_u64) {
                Some(1) => "1 new transaction was imported.".to_string(),
                Some(n) => format!("{n} new transactions were imported."),
                None => "New transactions were imported.".to_string(),
            };
            Template::new("New transactions", body, Priority::Normal)
        }
        "transactions/updated" => Template::new(
            "Transactions updated",
            "Some transactions were updated.",
            Priority::Low,
        ),
        "transactions/deleted" => Template::new(
            "Transactions removed",
            "Some transactions were removed.",
            Priority::Low,
        ),
        _ => return None,
    };
    Some(template)
}

/// Database change feed body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangePayload {
    /// `INSERT`, `UPDATE` or `DELETE`
    #[serde(rename = "type")]
    pub change: String,
    /// Table the row belongs to
    pub table: String,
    /// Schema of the table
    #[serde(default)]
    pub schema: Option<String>,
    /// Row after the change
    #[serde(default)]
    pub record: Option<Value>,
    /// Row before the change
    #[serde(default)]
    pub old_record: Option<Value>,
    /// Commit time reported by the feed
    #[serde(default)]
    pub commit_timestamp: Option<String>,
}

impl ChangePayload {
    /// Id of the affected row, from the new row or, for deletes, the old one.
    #[must_use]
    pub fn record_id(&self) -> Option<String> {
        [self.record.as_ref(), self.old_record.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|row| match row.get("id") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
    }
}

/// `client_orders` -> `Client orders`.
#[must_use]
pub fn humanize_table(table: &str) -> String {
    let words = table
        .split(['_', '-'])
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let mut chars = words.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Template for a row change, or `None` for unsupported change types.
#[must_use]
pub fn change_template(payload: &ChangePayload) -> Option<Template> {
    let table = humanize_table(&payload.table);
    let template = match payload.change.as_str() {
        "INSERT" => Template::new(
            "New record",
            format!("A new record was added to {table}."),
            Priority::Normal,
        ),
        "UPDATE" => Template::new(
            "Record updated",
            format!("A record in {table} was updated."),
            Priority::Low,
        ),
        "DELETE" => Template::new(
            "Record deleted",
            format!("A record was removed from {table}."),
            Priority::Normal,
        ),
        _ => return None,
    };
    Some(template)
}

/// Data attached to a change notification.
#[must_use]
pub fn change_data(payload: &ChangePayload) -> Value {
    json!({
        "table": payload.table,
        "schema": payload.schema,
        "change": payload.change,
        "recordId": payload.record_id(),
    })
}

/// Connects external feed resources to their owners.
#[derive(Clone)]
pub struct FeedConnections {
    repo: FeedConnectionRepository,
    id_gen: IdGenerator,
}

impl FeedConnections {
    /// Create a new feed connection service.
    #[must_use]
    pub const fn new(repo: FeedConnectionRepository) -> Self {
        Self {
            repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Route a feed resource's events to `(user, tenant)`.
    ///
    /// A resource has exactly one owner. Connecting one that another owner
    /// already holds is a conflict; reconnecting your own returns the
    /// existing row and its signing secret unchanged.
    pub async fn connect(
        &self,
        user_id: &str,
        tenant_id: &str,
        source: FeedSource,
        external_id: &str,
    ) -> AppResult<feed_connection::Model> {
        if external_id.is_empty() || external_id.len() > 256 {
            return Err(AppError::Validation("externalId must be 1-256 characters".to_string()));
        }

        let inserted = self
            .repo
            .insert_if_absent(feed_connection::ActiveModel {
                source: Set(source.as_str().to_string()),
                external_id: Set(external_id.to_string()),
                user_id: Set(user_id.to_string()),
                tenant_id: Set(tenant_id.to_string()),
                signing_secret: Set(self.id_gen.generate_secret()),
                created_at: Set(Utc::now().into()),
            })
            .await?;

        let connection = self
            .repo
            .find(source.as_str(), external_id)
            .await?
            .ok_or_else(|| AppError::Internal("feed connection vanished after insert".to_string()))?;

        if connection.user_id != user_id || connection.tenant_id != tenant_id {
            tracing::warn!(
                user_id = %user_id,
                tenant_id = %tenant_id,
                source = %source,
                external_id = %external_id,
                "Refused to connect a feed resource owned by someone else"
            );
            return Err(AppError::Conflict(
                "this resource is already connected to another account".to_string(),
            ));
        }

        if inserted > 0 {
            tracing::info!(
                user_id = %user_id,
                tenant_id = %tenant_id,
                source = %source,
                external_id = %external_id,
                "Feed connected"
            );
        }
        Ok(connection)
    }

    /// Stop routing a resource. Only its owner can disconnect it.
    pub async fn disconnect(
        &self,
        user_id: &str,
        tenant_id: &str,
        source: FeedSource,
        external_id: &str,
    ) -> AppResult<bool> {
        let removed = self
            .repo
            .delete_owned(source.as_str(), external_id, user_id, tenant_id)
            .await?;
        Ok(removed > 0)
    }

    /// Feeds connected by one owner.
    pub async fn list(&self, user_id: &str, tenant_id: &str) -> AppResult<Vec<feed_connection::Model>> {
        self.repo.find_by_owner(user_id, tenant_id).await
    }

    /// Owner of a feed resource.
    pub async fn owner(
        &self,
        source: FeedSource,
        external_id: &str,
    ) -> AppResult<Option<feed_connection::Model>> {
        self.repo.find(source.as_str(), external_id).await
    }
}
