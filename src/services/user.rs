use std::collections::HashMap;

use crate::{
    error::{AppError, AppResult},
    models::{report, user, Organization, Report, Role, User, UserModel},
    policy::supervisor_would_cycle,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use uuid::Uuid;

pub struct UserService {
    db: DatabaseConnection,
}

impl UserService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        organization_id: Uuid,
        email: &str,
        role: Role,
        supervisor_id: Option<Uuid>,
    ) -> AppResult<UserModel> {
        Organization::find_by_id(organization_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        let existing = User::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            return Err(AppError::Conflict("Email already in use".to_string()));
        }

        if let Some(supervisor_id) = supervisor_id {
            let supervisor = User::find_by_id(supervisor_id)
                .one(&self.db)
                .await?
                .ok_or(AppError::NotFound)?;
            self.check_supervisor(&supervisor, organization_id, role)?;
        }

        let now = chrono::Utc::now().naive_utc();
        let model = user::ActiveModel {
            id: sea_orm::ActiveValue::Set(Uuid::new_v4()),
            organization_id: sea_orm::ActiveValue::Set(organization_id),
            email: sea_orm::ActiveValue::Set(email.to_string()),
            role: sea_orm::ActiveValue::Set(role),
            supervisor_id: sea_orm::ActiveValue::Set(supervisor_id),
            created_at: sea_orm::ActiveValue::Set(now),
            updated_at: sea_orm::ActiveValue::Set(now),
        };

        let saved = model.insert(&self.db).await?;
        Ok(saved)
    }

    pub async fn get_by_id(&self, user_id: Uuid) -> AppResult<UserModel> {
        User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn list_by_organization(
        &self,
        organization_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> AppResult<(Vec<UserModel>, u64)> {
        let paginator = User::find()
            .filter(user::Column::OrganizationId.eq(organization_id))
            .order_by_desc(user::Column::CreatedAt)
            .paginate(&self.db, per_page);

        let total = paginator.num_items().await?;
        let users = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((users, total))
    }

    /// Admin update of role and/or supervisor. The organization is fixed at
    /// creation and cannot be patched.
    pub async fn update(
        &self,
        user_id: Uuid,
        role: Option<Role>,
        supervisor_id: Option<Option<Uuid>>,
    ) -> AppResult<UserModel> {
        let existing = self.get_by_id(user_id).await?;

        let new_role = role.unwrap_or(existing.role);
        let new_supervisor = supervisor_id.unwrap_or(existing.supervisor_id);

        if let Some(supervisor_id) = new_supervisor {
            let supervisor = User::find_by_id(supervisor_id)
                .one(&self.db)
                .await?
                .ok_or(AppError::NotFound)?;
            self.check_supervisor(&supervisor, existing.organization_id, new_role)?;

            // Cycle check against the organization's current edges, with
            // this user's edge replaced by the proposed one.
            let colleagues = User::find()
                .filter(user::Column::OrganizationId.eq(existing.organization_id))
                .all(&self.db)
                .await?;
            let edges: HashMap<Uuid, Option<Uuid>> =
                colleagues.iter().map(|u| (u.id, u.supervisor_id)).collect();
            if supervisor_would_cycle(&edges, user_id, supervisor_id) {
                return Err(AppError::Validation(
                    "Supervisor assignment would create a cycle".to_string(),
                ));
            }
        }

        let now = chrono::Utc::now().naive_utc();
        let mut active: user::ActiveModel = existing.into();
        active.role = sea_orm::ActiveValue::Set(new_role);
        active.supervisor_id = sea_orm::ActiveValue::Set(new_supervisor);
        active.updated_at = sea_orm::ActiveValue::Set(now);

        let updated = active.update(&self.db).await?;
        Ok(updated)
    }

    /// Refuses while the user still owns or is assigned reports; cascading
    /// that state belongs to the archival collaborator.
    pub async fn delete(&self, user_id: Uuid) -> AppResult<()> {
        self.get_by_id(user_id).await?;

        let owning = Report::find()
            .filter(
                sea_orm::Condition::any()
                    .add(report::Column::CreatedBy.eq(user_id))
                    .add(report::Column::AssignedTo.eq(user_id)),
            )
            .count(&self.db)
            .await?;
        if owning > 0 {
            return Err(AppError::Validation(
                "User still owns or is assigned reports".to_string(),
            ));
        }

        User::delete_by_id(user_id).exec(&self.db).await?;
        Ok(())
    }

    fn check_supervisor(
        &self,
        supervisor: &UserModel,
        organization_id: Uuid,
        subordinate_role: Role,
    ) -> AppResult<()> {
        if supervisor.organization_id != organization_id {
            return Err(AppError::Validation(
                "Supervisor must belong to the same organization".to_string(),
            ));
        }
        if !supervisor.role.supervises_role(subordinate_role) {
            return Err(AppError::Validation(format!(
                "Role {:?} is not entitled to supervise {:?}",
                supervisor.role, subordinate_role
            )));
        }
        Ok(())
    }
}
