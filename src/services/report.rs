use std::collections::HashMap;

use crate::{
    error::{AppError, AppResult},
    lifecycle::{transition_gate, ReportState, TransitionGate},
    models::{report, report_history, user, Report, ReportHistoryEntry, ReportHistoryModel,
        ReportModel, Role, SchemaType, User, UserModel},
    policy::{supervisor_chain_contains, Identity, PermissionPolicy, MAX_SUPERVISOR_HOPS},
    websocket::{events::ReportEvent, hub::BroadcastHub},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use uuid::Uuid;

/// Partial update to a report. At least one field must be present.
#[derive(Debug, Clone, Default)]
pub struct ReportPatch {
    pub data: Option<serde_json::Value>,
    pub state: Option<ReportState>,
    pub assigned_to: Option<Uuid>,
}

impl ReportPatch {
    pub fn is_empty(&self) -> bool {
        self.data.is_none() && self.state.is_none() && self.assigned_to.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportFilter {
    pub state: Option<ReportState>,
    pub assigned_to_me: bool,
}

/// The report lifecycle service: every mutation is one transaction writing
/// the report row and its history row together, guarded by the version
/// column so concurrent writers serialize (one commits, the other gets
/// Conflict).
pub struct ReportService {
    db: DatabaseConnection,
    hub: BroadcastHub,
    policy: PermissionPolicy,
}

impl ReportService {
    pub fn new(db: DatabaseConnection, hub: BroadcastHub) -> Self {
        Self::with_policy(db, hub, PermissionPolicy::standard())
    }

    pub fn with_policy(db: DatabaseConnection, hub: BroadcastHub, policy: PermissionPolicy) -> Self {
        Self { db, hub, policy }
    }

    pub async fn create(
        &self,
        actor: &Identity,
        schema_type: SchemaType,
        assigned_to: Uuid,
        data: serde_json::Value,
    ) -> AppResult<ReportModel> {
        if !self.policy.can_create(actor, schema_type) {
            tracing::debug!(
                "create denied: role {:?} cannot create {:?}",
                actor.role,
                schema_type
            );
            return Err(AppError::AccessDenied);
        }

        let assignee = User::find_by_id(assigned_to)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        if assignee.organization_id != actor.organization_id {
            return Err(AppError::Validation(
                "Cannot assign report to user in different organization".to_string(),
            ));
        }

        let now = chrono::Utc::now().naive_utc();
        let report_id = Uuid::new_v4();

        let txn = self.db.begin().await?;

        let model = report::ActiveModel {
            id: sea_orm::ActiveValue::Set(report_id),
            organization_id: sea_orm::ActiveValue::Set(actor.organization_id),
            created_by: sea_orm::ActiveValue::Set(actor.user_id),
            assigned_to: sea_orm::ActiveValue::Set(assignee.id),
            state: sea_orm::ActiveValue::Set(ReportState::Draft),
            schema_type: sea_orm::ActiveValue::Set(schema_type),
            data: sea_orm::ActiveValue::Set(data.clone()),
            version: sea_orm::ActiveValue::Set(1),
            created_at: sea_orm::ActiveValue::Set(now),
            updated_at: sea_orm::ActiveValue::Set(now),
        };
        let saved = model.insert(&txn).await?;

        let history = report_history::ActiveModel {
            id: sea_orm::ActiveValue::Set(Uuid::new_v4()),
            report_id: sea_orm::ActiveValue::Set(report_id),
            modified_by: sea_orm::ActiveValue::Set(actor.user_id),
            data: sea_orm::ActiveValue::Set(data),
            version: sea_orm::ActiveValue::Set(1),
            created_at: sea_orm::ActiveValue::Set(now),
        };
        history.insert(&txn).await?;

        txn.commit().await?;

        self.notify(
            saved.organization_id,
            ReportEvent::created(saved.id, actor.user_id),
        );
        Ok(saved)
    }

    pub async fn get(&self, actor: &Identity, report_id: Uuid) -> AppResult<ReportModel> {
        let report = self.find_report(report_id).await?;
        self.require_view(actor, &report).await?;
        Ok(report)
    }

    /// All reports the actor may view, most recent first. Non-admins are
    /// scoped to their organization; visibility is then decided per report
    /// against a preloaded supervisor-edge map.
    pub async fn list(&self, actor: &Identity, filter: ReportFilter) -> AppResult<Vec<ReportModel>> {
        let mut query = Report::find();
        if actor.role != Role::SystemAdmin {
            query = query.filter(report::Column::OrganizationId.eq(actor.organization_id));
        }
        if let Some(state) = filter.state {
            query = query.filter(report::Column::State.eq(state));
        }
        if filter.assigned_to_me {
            query = query.filter(report::Column::AssignedTo.eq(actor.user_id));
        }

        let mut reports = query
            .order_by_desc(report::Column::CreatedAt)
            .all(&self.db)
            .await?;

        if actor.role != Role::SystemAdmin {
            let colleagues = User::find()
                .filter(user::Column::OrganizationId.eq(actor.organization_id))
                .all(&self.db)
                .await?;
            let edges: HashMap<Uuid, Option<Uuid>> =
                colleagues.iter().map(|u| (u.id, u.supervisor_id)).collect();

            reports.retain(|r| {
                let supervises =
                    supervisor_chain_contains(&edges, r.assigned_to, actor.user_id);
                self.policy.can_view(actor, r, supervises)
            });
        }

        Ok(reports)
    }

    /// Apply a patch: state change first (transition table + gate), then
    /// data and reassignment under the report's current, pre-transition
    /// state. Exactly one version is added per committed call.
    pub async fn update(
        &self,
        actor: &Identity,
        report_id: Uuid,
        patch: ReportPatch,
    ) -> AppResult<ReportModel> {
        if patch.is_empty() {
            return Err(AppError::Validation("Empty patch".to_string()));
        }

        let txn = self.db.begin().await?;

        let report = Report::find_by_id(report_id)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?;

        let assignee = User::find_by_id(report.assigned_to)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?;
        let supervises = self.supervises(&txn, actor, &assignee).await?;

        let mut next_state = report.state;
        if let Some(target) = patch.state {
            let gate = transition_gate(report.state, target).ok_or(
                AppError::InvalidTransition {
                    from: report.state,
                    to: target,
                },
            )?;
            let allowed = match gate {
                TransitionGate::Edit => self.policy.can_edit(actor, &report, supervises),
                TransitionGate::Review => self.policy.can_review(actor, &report),
            };
            if !allowed {
                tracing::debug!(
                    "transition {} -> {} denied for {:?} on report {}",
                    report.state,
                    target,
                    actor.role,
                    report.id
                );
                return Err(AppError::AccessDenied);
            }
            next_state = target;
        }

        if patch.data.is_some() && !self.policy.can_edit(actor, &report, supervises) {
            tracing::debug!(
                "data edit denied for {:?} on report {} in state {}",
                actor.role,
                report.id,
                report.state
            );
            return Err(AppError::AccessDenied);
        }

        let mut next_assignee = report.assigned_to;
        if let Some(new_assignee_id) = patch.assigned_to {
            if !self.policy.can_edit(actor, &report, supervises) {
                return Err(AppError::AccessDenied);
            }
            let new_assignee = User::find_by_id(new_assignee_id)
                .one(&txn)
                .await?
                .ok_or(AppError::NotFound)?;
            if new_assignee.organization_id != report.organization_id {
                return Err(AppError::Validation(
                    "Cannot assign report to user in different organization".to_string(),
                ));
            }
            next_assignee = new_assignee.id;
        }

        let next_data = patch.data.clone().unwrap_or_else(|| report.data.clone());
        let new_version = report.version + 1;
        let now = chrono::Utc::now().naive_utc();

        // Guarded write: if a concurrent update committed since our read,
        // the version no longer matches and zero rows are affected.
        let active = report::ActiveModel {
            data: sea_orm::ActiveValue::Set(next_data.clone()),
            state: sea_orm::ActiveValue::Set(next_state),
            assigned_to: sea_orm::ActiveValue::Set(next_assignee),
            version: sea_orm::ActiveValue::Set(new_version),
            updated_at: sea_orm::ActiveValue::Set(now),
            ..Default::default()
        };
        let result = Report::update_many()
            .set(active)
            .filter(report::Column::Id.eq(report.id))
            .filter(report::Column::Version.eq(report.version))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::Conflict(
                "Report was modified concurrently".to_string(),
            ));
        }

        let history = report_history::ActiveModel {
            id: sea_orm::ActiveValue::Set(Uuid::new_v4()),
            report_id: sea_orm::ActiveValue::Set(report.id),
            modified_by: sea_orm::ActiveValue::Set(actor.user_id),
            data: sea_orm::ActiveValue::Set(next_data.clone()),
            version: sea_orm::ActiveValue::Set(new_version),
            created_at: sea_orm::ActiveValue::Set(now),
        };
        history.insert(&txn).await?;

        txn.commit().await?;

        self.notify(
            report.organization_id,
            ReportEvent::updated(report.id, actor.user_id, new_version, change_summary(&patch)),
        );

        Ok(report::Model {
            data: next_data,
            state: next_state,
            assigned_to: next_assignee,
            version: new_version,
            updated_at: now,
            ..report
        })
    }

    /// Draft reports only, for every role. Cascades to history rows.
    pub async fn delete(&self, actor: &Identity, report_id: Uuid) -> AppResult<()> {
        let report = self.find_report(report_id).await?;

        if report.state != ReportState::Draft {
            return Err(AppError::Validation(
                "Only draft reports can be deleted".to_string(),
            ));
        }

        let assignee = User::find_by_id(report.assigned_to)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;
        let supervises = self.supervises(&self.db, actor, &assignee).await?;

        if !self.policy.can_delete(actor, &report, supervises) {
            tracing::debug!(
                "delete denied for {:?} on report {}",
                actor.role,
                report.id
            );
            return Err(AppError::AccessDenied);
        }

        let txn = self.db.begin().await?;
        ReportHistoryEntry::delete_many()
            .filter(report_history::Column::ReportId.eq(report.id))
            .exec(&txn)
            .await?;
        Report::delete_by_id(report.id).exec(&txn).await?;
        txn.commit().await?;

        self.notify(
            report.organization_id,
            ReportEvent::deleted(report.id, actor.user_id, report.version),
        );
        Ok(())
    }

    /// Version history, ascending, paginated. View permission applies to
    /// the whole sequence.
    pub async fn history(
        &self,
        actor: &Identity,
        report_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> AppResult<(Vec<ReportHistoryModel>, u64)> {
        let report = self.find_report(report_id).await?;
        self.require_view(actor, &report).await?;

        let paginator = ReportHistoryEntry::find()
            .filter(report_history::Column::ReportId.eq(report_id))
            .order_by_asc(report_history::Column::Version)
            .paginate(&self.db, per_page);

        let total = paginator.num_items().await?;
        let entries = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((entries, total))
    }

    /// Read-only snapshot for the PDF export collaborator: the report plus
    /// its complete ordered history.
    pub async fn export(
        &self,
        actor: &Identity,
        report_id: Uuid,
    ) -> AppResult<(ReportModel, Vec<ReportHistoryModel>)> {
        let report = self.find_report(report_id).await?;
        self.require_view(actor, &report).await?;

        let entries = ReportHistoryEntry::find()
            .filter(report_history::Column::ReportId.eq(report_id))
            .order_by_asc(report_history::Column::Version)
            .all(&self.db)
            .await?;
        Ok((report, entries))
    }

    async fn find_report(&self, report_id: Uuid) -> AppResult<ReportModel> {
        Report::find_by_id(report_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn require_view(&self, actor: &Identity, report: &ReportModel) -> AppResult<()> {
        let assignee = User::find_by_id(report.assigned_to)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;
        let supervises = self.supervises(&self.db, actor, &assignee).await?;
        if !self.policy.can_view(actor, report, supervises) {
            tracing::debug!(
                "view denied for {:?} on report {}",
                actor.role,
                report.id
            );
            return Err(AppError::AccessDenied);
        }
        Ok(())
    }

    /// Walk the assignee's supervisor chain upward looking for the actor,
    /// bounded by MAX_SUPERVISOR_HOPS.
    async fn supervises<C: ConnectionTrait>(
        &self,
        conn: &C,
        actor: &Identity,
        assignee: &UserModel,
    ) -> AppResult<bool> {
        if actor.user_id == assignee.id {
            return Ok(false);
        }
        let mut current = assignee.supervisor_id;
        let mut hops = 0;
        while let Some(supervisor_id) = current {
            if supervisor_id == actor.user_id {
                return Ok(true);
            }
            hops += 1;
            if hops >= MAX_SUPERVISOR_HOPS {
                return Ok(false);
            }
            current = User::find_by_id(supervisor_id)
                .one(conn)
                .await?
                .and_then(|u| u.supervisor_id);
        }
        Ok(false)
    }

    /// Fire-and-forget, after commit. Cannot fail the caller's request.
    fn notify(&self, organization_id: Uuid, event: ReportEvent) {
        tracing::debug!(
            "broadcast {} v{} for report {}",
            event.kind,
            event.version,
            event.report_id
        );
        self.hub.broadcast_to_org(organization_id, &event.payload());
    }
}

fn change_summary(patch: &ReportPatch) -> Vec<&'static str> {
    let mut summary = Vec::new();
    if patch.data.is_some() {
        summary.push("data");
    }
    if patch.state.is_some() {
        summary.push("state");
    }
    if patch.assigned_to.is_some() {
        summary.push("assigned_to");
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_patch_is_detected() {
        assert!(ReportPatch::default().is_empty());
        let patch = ReportPatch {
            data: Some(json!({"field": 1})),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn summary_names_changed_fields_in_order() {
        let patch = ReportPatch {
            data: Some(json!({})),
            state: Some(ReportState::InProgress),
            assigned_to: None,
        };
        assert_eq!(change_summary(&patch), vec!["data", "state"]);

        let patch = ReportPatch {
            data: None,
            state: None,
            assigned_to: Some(Uuid::new_v4()),
        };
        assert_eq!(change_summary(&patch), vec!["assigned_to"]);
    }
}
