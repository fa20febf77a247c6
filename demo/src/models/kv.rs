//! Key/value model

use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, QueryOrder};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "kv")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    pub value: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

// ============================================================================
// READ OPERATIONS
// ============================================================================

impl Model {
    /// Look up a single entry
    pub async fn find_by_key<C: ConnectionTrait>(db: &C, key: &str) -> Result<Option<Self>, DbErr> {
        Entity::find_by_id(key.to_string()).one(db).await
    }

    /// Every entry, ordered by key
    pub async fn all<C: ConnectionTrait>(db: &C) -> Result<Vec<Self>, DbErr> {
        Entity::find().order_by_asc(Column::Key).all(db).await
    }
}

// ============================================================================
// WRITE OPERATIONS
// ============================================================================

impl ActiveModel {
    /// Insert a new entry
    pub async fn put<C: ConnectionTrait>(db: &C, key: &str, value: &str) -> Result<Model, DbErr> {
        Self {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
        }
        .insert(db)
        .await
    }
}
