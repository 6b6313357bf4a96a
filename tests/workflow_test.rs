//! Drives report workflows through the pure policy and lifecycle layers:
//! the same decisions the service makes per request, without a store.

use std::collections::HashMap;

use fieldreport::lifecycle::{transition_gate, ReportState, TransitionGate};
use fieldreport::models::{report, Role, SchemaType};
use fieldreport::policy::{supervisor_chain_contains, Identity, PermissionPolicy};
use serde_json::json;
use uuid::Uuid;

struct Member {
    identity: Identity,
}

fn member(role: Role, org: Uuid) -> Member {
    Member {
        identity: Identity {
            user_id: Uuid::new_v4(),
            organization_id: org,
            role,
        },
    }
}

/// In-memory stand-in for one report row plus its history versions.
struct ReportSim {
    model: report::Model,
    history: Vec<i32>,
}

impl ReportSim {
    fn create(org: Uuid, creator: &Member, assignee: &Member, schema_type: SchemaType) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            model: report::Model {
                id: Uuid::new_v4(),
                organization_id: org,
                created_by: creator.identity.user_id,
                assigned_to: assignee.identity.user_id,
                state: ReportState::Draft,
                schema_type,
                data: json!({}),
                version: 1,
                created_at: now,
                updated_at: now,
            },
            history: vec![1],
        }
    }

    fn commit(&mut self) {
        self.model.version += 1;
        self.history.push(self.model.version);
    }
}

fn supervises(edges: &HashMap<Uuid, Option<Uuid>>, actor: &Member, sim: &ReportSim) -> bool {
    supervisor_chain_contains(edges, sim.model.assigned_to, actor.identity.user_id)
}

/// Attempt a state transition the way the service does: transition table
/// first, then the gate's permission. Commits on success.
fn try_transition(
    policy: &PermissionPolicy,
    edges: &HashMap<Uuid, Option<Uuid>>,
    actor: &Member,
    sim: &mut ReportSim,
    target: ReportState,
) -> bool {
    let Some(gate) = transition_gate(sim.model.state, target) else {
        return false;
    };
    let sup = supervises(edges, actor, sim);
    let allowed = match gate {
        TransitionGate::Edit => policy.can_edit(&actor.identity, &sim.model, sup),
        TransitionGate::Review => policy.can_review(&actor.identity, &sim.model),
    };
    if !allowed {
        return false;
    }
    sim.model.state = target;
    sim.commit();
    true
}

fn try_data_edit(
    policy: &PermissionPolicy,
    edges: &HashMap<Uuid, Option<Uuid>>,
    actor: &Member,
    sim: &mut ReportSim,
    data: serde_json::Value,
) -> bool {
    let sup = supervises(edges, actor, sim);
    if !policy.can_edit(&actor.identity, &sim.model, sup) {
        return false;
    }
    sim.model.data = data;
    sim.commit();
    true
}

#[test]
fn incident_report_runs_draft_to_locked() {
    let policy = PermissionPolicy::standard();
    let org = Uuid::new_v4();

    let dispatcher = member(Role::Dispatcher, org);
    let worker = member(Role::PoliceWorker, org);
    let chief = member(Role::PoliceChief, org);

    // Chief supervises the worker; the dispatcher reports to the chief too.
    let edges = HashMap::from([
        (worker.identity.user_id, Some(chief.identity.user_id)),
        (dispatcher.identity.user_id, Some(chief.identity.user_id)),
        (chief.identity.user_id, None),
    ]);

    assert!(policy.can_create(&dispatcher.identity, SchemaType::Incident));
    let mut sim = ReportSim::create(org, &dispatcher, &worker, SchemaType::Incident);
    assert_eq!(sim.model.version, 1);
    assert_eq!(sim.model.state, ReportState::Draft);

    assert!(try_transition(&policy, &edges, &worker, &mut sim, ReportState::InProgress));
    assert_eq!(sim.model.version, 2);

    assert!(try_transition(&policy, &edges, &worker, &mut sim, ReportState::UnderReview));
    assert_eq!(sim.model.version, 3);

    assert!(try_transition(&policy, &edges, &chief, &mut sim, ReportState::Locked));
    assert_eq!(sim.model.version, 4);

    // Locked: further data edits denied, for the assignee and everyone else.
    assert!(!try_data_edit(&policy, &edges, &worker, &mut sim, json!({"late": true})));
    assert!(!try_data_edit(&policy, &edges, &chief, &mut sim, json!({"late": true})));

    // History mirrors versions 1..=4 with no gaps.
    assert_eq!(sim.history.len() as i32, sim.model.version);
    assert_eq!(sim.history, vec![1, 2, 3, 4]);

    // Both the worker and the chief may still view it.
    assert!(policy.can_view(&worker.identity, &sim.model, false));
    assert!(policy.can_view(
        &chief.identity,
        &sim.model,
        supervises(&edges, &chief, &sim)
    ));
}

#[test]
fn worker_cannot_lock_without_review_role() {
    let policy = PermissionPolicy::standard();
    let org = Uuid::new_v4();
    let dispatcher = member(Role::Dispatcher, org);
    let worker = member(Role::PoliceWorker, org);
    let edges = HashMap::new();

    let mut sim = ReportSim::create(org, &dispatcher, &worker, SchemaType::Incident);
    assert!(try_transition(&policy, &edges, &worker, &mut sim, ReportState::InProgress));
    assert!(try_transition(&policy, &edges, &worker, &mut sim, ReportState::UnderReview));

    // The assignee holds no review permission.
    assert!(!try_transition(&policy, &edges, &worker, &mut sim, ReportState::Locked));
    assert_eq!(sim.model.state, ReportState::UnderReview);
    assert_eq!(sim.model.version, 3);
}

#[test]
fn reviewer_can_send_back_for_changes() {
    let policy = PermissionPolicy::standard();
    let org = Uuid::new_v4();
    let nurse = member(Role::TriageNurse, org);
    let paramedic = member(Role::ErParamedic, org);
    let attending = member(Role::ErAttending, org);
    let edges = HashMap::from([(
        paramedic.identity.user_id,
        Some(attending.identity.user_id),
    )]);

    let mut sim = ReportSim::create(org, &nurse, &paramedic, SchemaType::MedicalChart);
    assert!(try_transition(&policy, &edges, &paramedic, &mut sim, ReportState::InProgress));
    assert!(try_transition(&policy, &edges, &paramedic, &mut sim, ReportState::UnderReview));
    assert!(try_transition(&policy, &edges, &attending, &mut sim, ReportState::InProgress));
    assert_eq!(sim.model.state, ReportState::InProgress);
    assert_eq!(sim.history, vec![1, 2, 3, 4]);
}

#[test]
fn nurse_cannot_create_incident_reports() {
    let policy = PermissionPolicy::standard();
    let org = Uuid::new_v4();
    let nurse = member(Role::TriageNurse, org);
    assert!(!policy.can_create(&nurse.identity, SchemaType::Incident));
    assert!(policy.can_create(&nurse.identity, SchemaType::MedicalChart));
}

#[test]
fn doctor_delete_waits_for_draft_revert() {
    let policy = PermissionPolicy::standard();
    let org = Uuid::new_v4();
    let doctor = member(Role::ErDoctor, org);
    let paramedic = member(Role::ErParamedic, org);
    let edges = HashMap::from([(
        paramedic.identity.user_id,
        Some(doctor.identity.user_id),
    )]);

    let mut sim = ReportSim::create(org, &doctor, &paramedic, SchemaType::MedicalChart);
    assert!(try_transition(&policy, &edges, &paramedic, &mut sim, ReportState::InProgress));

    // In progress: no deletion, supervisor or not.
    assert!(!policy.can_delete(&doctor.identity, &sim.model, supervises(&edges, &doctor, &sim)));

    // Paramedic reverts to draft; now the supervising doctor may delete.
    assert!(try_transition(&policy, &edges, &paramedic, &mut sim, ReportState::Draft));
    assert!(policy.can_delete(&doctor.identity, &sim.model, supervises(&edges, &doctor, &sim)));
}

#[test]
fn transitive_supervisor_sees_the_chain() {
    let policy = PermissionPolicy::standard();
    let org = Uuid::new_v4();
    let nurse = member(Role::TriageNurse, org);
    let paramedic = member(Role::ErParamedic, org);
    let doctor = member(Role::ErDoctor, org);
    let attending = member(Role::ErAttending, org);

    // attending -> doctor -> paramedic
    let edges = HashMap::from([
        (paramedic.identity.user_id, Some(doctor.identity.user_id)),
        (doctor.identity.user_id, Some(attending.identity.user_id)),
        (attending.identity.user_id, None),
    ]);

    let sim = ReportSim::create(org, &nurse, &paramedic, SchemaType::MedicalChart);
    assert!(supervises(&edges, &doctor, &sim));
    assert!(supervises(&edges, &attending, &sim));
    assert!(policy.can_view(&attending.identity, &sim.model, supervises(&edges, &attending, &sim)));
    // Two hops up still grants edit to the attending.
    assert!(policy.can_edit(&attending.identity, &sim.model, supervises(&edges, &attending, &sim)));
}

#[test]
fn assignee_without_supervisor_blocks_chief_override() {
    let policy = PermissionPolicy::standard();
    let org = Uuid::new_v4();
    let dispatcher = member(Role::Dispatcher, org);
    let worker = member(Role::PoliceWorker, org);
    let chief = member(Role::PoliceChief, org);

    // No supervision edge for the worker.
    let edges: HashMap<Uuid, Option<Uuid>> = HashMap::from([(worker.identity.user_id, None)]);

    let mut sim = ReportSim::create(org, &dispatcher, &worker, SchemaType::Incident);
    assert!(!policy.can_edit(&chief.identity, &sim.model, supervises(&edges, &chief, &sim)));
    assert!(!policy.can_delete(&chief.identity, &sim.model, supervises(&edges, &chief, &sim)));
    // The assignee can still work it.
    assert!(try_data_edit(&policy, &edges, &worker, &mut sim, json!({"narrative": "..."})));
    assert_eq!(sim.model.version, 2);
    // And the chief can still see it (org-wide view).
    assert!(policy.can_view(&chief.identity, &sim.model, false));
}
