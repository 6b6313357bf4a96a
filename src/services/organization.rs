use crate::{
    error::{AppError, AppResult},
    models::{organization, Organization, OrganizationModel, OrgKind},
};
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder,
};
use uuid::Uuid;

pub struct OrganizationService {
    db: DatabaseConnection,
}

impl OrganizationService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, name: &str, kind: OrgKind) -> AppResult<OrganizationModel> {
        let now = chrono::Utc::now().naive_utc();
        let model = organization::ActiveModel {
            id: sea_orm::ActiveValue::Set(Uuid::new_v4()),
            name: sea_orm::ActiveValue::Set(name.to_string()),
            kind: sea_orm::ActiveValue::Set(kind),
            created_at: sea_orm::ActiveValue::Set(now),
            updated_at: sea_orm::ActiveValue::Set(now),
        };

        let saved = model.insert(&self.db).await?;
        Ok(saved)
    }

    pub async fn get_by_id(&self, organization_id: Uuid) -> AppResult<OrganizationModel> {
        Organization::find_by_id(organization_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn list(&self, page: u64, per_page: u64) -> AppResult<(Vec<OrganizationModel>, u64)> {
        let paginator = Organization::find()
            .order_by_desc(organization::Column::CreatedAt)
            .paginate(&self.db, per_page);

        let total = paginator.num_items().await?;
        let organizations = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((organizations, total))
    }

    /// Rename only. The kind is fixed at creation; no operation changes it.
    pub async fn rename(&self, organization_id: Uuid, name: &str) -> AppResult<OrganizationModel> {
        let existing = self.get_by_id(organization_id).await?;

        let now = chrono::Utc::now().naive_utc();
        let mut active: organization::ActiveModel = existing.into();
        active.name = sea_orm::ActiveValue::Set(name.to_string());
        active.updated_at = sea_orm::ActiveValue::Set(now);

        let updated = active.update(&self.db).await?;
        Ok(updated)
    }
}
