use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One stored track document. `document` holds the whole track, comments
/// included, serialized as JSON; `track_id` mirrors its public id.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "track")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub track_id: String,
    #[sea_orm(column_type = "Text")]
    pub document: String,
    pub created: DateTimeUtc,
    pub modified: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
