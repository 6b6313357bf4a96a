use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::lifecycle::ReportState;

/// Which field template a report follows. The template itself (and schema
/// validation of `data` against it) belongs to the parsing collaborator;
/// the core only gates who may create which type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(50))")]
#[serde(rename_all = "snake_case")]
pub enum SchemaType {
    #[sea_orm(string_value = "incident")]
    Incident,
    #[sea_orm(string_value = "medical_chart")]
    MedicalChart,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "reports")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub created_by: Uuid,
    pub assigned_to: Uuid,
    pub state: ReportState,
    pub schema_type: SchemaType,
    /// Open key->value map; populated by callers (often the transcription
    /// parser). The core stores it verbatim.
    #[sea_orm(column_type = "JsonBinary")]
    pub data: Json,
    /// Bumped by exactly 1 on every committed mutation, mirrored by one
    /// history entry each. Starts at 1.
    pub version: i32,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::organization::Entity",
        from = "Column::OrganizationId",
        to = "super::organization::Column::Id"
    )]
    Organization,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::CreatedBy",
        to = "super::user::Column::Id"
    )]
    Creator,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::AssignedTo",
        to = "super::user::Column::Id"
    )]
    Assignee,
    #[sea_orm(has_many = "super::report_history::Entity")]
    History,
}

impl Related<super::organization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
