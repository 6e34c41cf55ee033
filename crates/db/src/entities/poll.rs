//! Poll row.
//!
//! Identity, lifecycle and ownership live in plain columns; the questions,
//! voters and responses live together in the `document` column so that one
//! row update commits a whole vote.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "poll")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Uppercase session code, unique among undeleted rows.
    pub session_code: String,

    #[sea_orm(nullable)]
    pub title: Option<String>,

    /// Admin subject that created the poll.
    pub created_by: String,

    pub is_active: bool,

    pub expires_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub closed_at: Option<DateTimeWithTimeZone>,

    /// Set on soft delete.
    #[sea_orm(nullable)]
    pub deleted_at: Option<DateTimeWithTimeZone>,

    /// Compare-and-swap token.
    pub revision: i64,

    /// Questions, voters and responses.
    #[sea_orm(column_type = "JsonBinary")]
    pub document: JsonValue,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
