use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The closed set of responder roles. Capabilities per role live in the
/// compiled-in table in [`crate::policy`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(50))")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[sea_orm(string_value = "system_admin")]
    SystemAdmin,
    #[sea_orm(string_value = "dispatcher")]
    Dispatcher,
    #[sea_orm(string_value = "police_worker")]
    PoliceWorker,
    #[sea_orm(string_value = "police_chief")]
    PoliceChief,
    #[sea_orm(string_value = "triage_nurse")]
    TriageNurse,
    #[sea_orm(string_value = "er_doctor")]
    ErDoctor,
    #[sea_orm(string_value = "er_paramedic")]
    ErParamedic,
    #[sea_orm(string_value = "er_attending")]
    ErAttending,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Fixed at creation; no cross-org reassignment.
    pub organization_id: Uuid,
    #[sea_orm(column_type = "String(StringLen::N(255))", unique)]
    pub email: String,
    pub role: Role,
    /// Upward reference into the supervision chain, nullable.
    pub supervisor_id: Option<Uuid>,
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
        belongs_to = "Entity",
        from = "Column::SupervisorId",
        to = "Column::Id"
    )]
    Supervisor,
}

impl Related<super::organization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
