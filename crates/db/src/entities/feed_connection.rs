//! Feed connection entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Maps an external resource id of a passive feed to its owner.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "feed_connection")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Feed source ("banking", "database")
    #[sea_orm(primary_key, auto_increment = false)]
    pub source: String,

    /// Bank item id, change-feed id, ...
    #[sea_orm(primary_key, auto_increment = false)]
    pub external_id: String,

    /// Owning user
    #[sea_orm(indexed)]
    pub user_id: String,

    /// Owning tenant
    pub tenant_id: String,

    /// HMAC key the feed signs its deliveries with
    #[serde(skip_serializing)]
    pub signing_secret: String,

    /// Timestamp when the resource was connected
    pub created_at: DateTimeWithTimeZone,
}

/// Relationships (none).
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
