mod common;

use common::{alice, bob, fixture, manager};
use pjtk_core::model::milestone::{RequirementGroup, APPROVED_LABEL, SIGNOFF_LABEL};
use pjtk_core::model::notice::MessageLevel;
use pjtk_core::service::milestone_service::MilestoneService;
use pjtk_core::service::notice_service::NoticeService;
use pjtk_core::service::sister_service::SisterService;
use pjtk_core::ServiceError;

#[test]
fn approval_is_manager_only() {
    let fx = fixture();
    let milestones = MilestoneService::with_connection(&fx.conn);
    let project = fx.create(&alice(), "LHA_IA12_001", "Offshore Index");

    assert!(matches!(
        milestones.approve(&alice(), &project.slug),
        Err(ServiceError::PermissionDenied { .. })
    ));
    assert!(matches!(
        milestones.signoff(&bob(), &project.slug),
        Err(ServiceError::PermissionDenied { .. })
    ));

    milestones.approve(&manager(), &project.slug).unwrap();
    assert_eq!(
        milestones
            .milestone_complete(&project.slug, APPROVED_LABEL)
            .unwrap(),
        Some(true)
    );
    assert_eq!(
        milestones
            .milestone_complete(&project.slug, SIGNOFF_LABEL)
            .unwrap(),
        Some(false)
    );
    assert_eq!(
        milestones
            .milestone_complete(&project.slug, "Not A Milestone")
            .unwrap(),
        None
    );
}

#[test]
fn completion_notifies_owner_leader_and_supervisors() {
    let fx = fixture();
    let milestones = MilestoneService::with_connection(&fx.conn);
    let notices = NoticeService::with_connection(&fx.conn);
    let project = fx.create(&bob(), "LHA_IA12_001", "Offshore Index");

    milestones.approve(&manager(), &project.slug).unwrap();

    for username in ["bob", "alice", "boss"] {
        let inbox = notices.my_messages(username, false).unwrap();
        assert_eq!(inbox.len(), 1, "{username} should have one notice");
        assert_eq!(inbox[0].level, MessageLevel::Info);
        assert_eq!(inbox[0].milestone, APPROVED_LABEL);
        assert_eq!(inbox[0].prj_cd, "LHA_IA12_001");
    }
    assert!(notices.my_messages("dana", false).unwrap().is_empty());

    milestones.unapprove(&manager(), &project.slug).unwrap();
    let inbox = notices.my_messages("bob", false).unwrap();
    assert_eq!(inbox.len(), 2);
    assert_eq!(inbox[0].level, MessageLevel::ActionRequired);
}

#[test]
fn read_notices_drop_out_of_the_unread_inbox() {
    let fx = fixture();
    let notices = NoticeService::with_connection(&fx.conn);
    fx.create_approved("LHA_IA12_001", "Offshore Index");

    let inbox = notices.my_messages("alice", false).unwrap();
    notices
        .mark_message_as_read("alice", inbox[0].message_id)
        .unwrap();

    assert!(notices.my_messages("alice", false).unwrap().is_empty());
    let all = notices.my_messages("alice", true).unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].read_at.is_some());
    assert_eq!(notices.my_messages("boss", false).unwrap().len(), 1);
}

#[test]
fn repeated_approval_writes_nothing_new() {
    let fx = fixture();
    let milestones = MilestoneService::with_connection(&fx.conn);
    let notices = NoticeService::with_connection(&fx.conn);
    let project = fx.create_approved("LHA_IA12_001", "Offshore Index");

    milestones.approve(&manager(), &project.slug).unwrap();
    assert_eq!(notices.my_messages("alice", true).unwrap().len(), 1);
}

#[test]
fn unapprove_takes_the_project_out_of_its_family() {
    let fx = fixture();
    let milestones = MilestoneService::with_connection(&fx.conn);
    let sisters = SisterService::with_connection(&fx.conn);
    let first = fx.create_approved("LHA_IA12_001", "First");
    let second = fx.create_approved("LHA_IA12_002", "Second");
    sisters.add_sister(&first.slug, &second.slug).unwrap();
    assert!(sisters.has_sister(&first.slug).unwrap());

    milestones.unapprove(&manager(), &second.slug).unwrap();

    assert!(!sisters.has_sister(&first.slug).unwrap());
    assert_eq!(sisters.get_family(&second.slug).unwrap(), None);
}

#[test]
fn bulk_approval_applies_each_change() {
    let fx = fixture();
    let milestones = MilestoneService::with_connection(&fx.conn);
    let keep = fx.create(&alice(), "LHA_IA12_001", "Keep");
    let revoke = fx.create_approved("LHA_IA12_002", "Revoke");

    assert!(matches!(
        milestones.approve_projects(&alice(), &[(keep.slug.clone(), true)]),
        Err(ServiceError::PermissionDenied { .. })
    ));
    milestones
        .approve_projects(
            &manager(),
            &[(keep.slug.clone(), true), (revoke.slug.clone(), false)],
        )
        .unwrap();

    assert_eq!(
        milestones.milestone_complete(&keep.slug, APPROVED_LABEL).unwrap(),
        Some(true)
    );
    assert_eq!(
        milestones
            .milestone_complete(&revoke.slug, APPROVED_LABEL)
            .unwrap(),
        Some(false)
    );
}

#[test]
fn bulk_approval_is_all_or_nothing() {
    let fx = fixture();
    let milestones = MilestoneService::with_connection(&fx.conn);
    let first = fx.create(&alice(), "LHA_IA12_001", "First");
    let revoke = fx.create_approved("LHA_IA12_002", "Revoke");

    let err = milestones
        .approve_projects(
            &manager(),
            &[
                (first.slug.clone(), true),
                (revoke.slug.clone(), false),
                ("lha_zz12_999".to_string(), true),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::ProjectNotFound(_)));

    assert_eq!(
        milestones.milestone_complete(&first.slug, APPROVED_LABEL).unwrap(),
        Some(false)
    );
    assert_eq!(
        milestones
            .milestone_complete(&revoke.slug, APPROVED_LABEL)
            .unwrap(),
        Some(true)
    );
    assert!(fx.conn.is_autocommit());
}

#[test]
fn owners_cannot_toggle_protected_milestones() {
    let fx = fixture();
    let milestones = MilestoneService::with_connection(&fx.conn);
    let project = fx.create(&alice(), "LHA_IA12_001", "Offshore Index");
    let records = milestones.get_milestones(&project.slug).unwrap();
    let id_of = |label: &str| {
        records
            .iter()
            .find(|record| record.milestone.label == label)
            .map(|record| record.milestone.id)
            .unwrap()
    };
    let wanted = [id_of(APPROVED_LABEL), id_of("Field Work Conducted")];

    let changed = milestones
        .update_milestones(&alice(), &project.slug, &wanted)
        .unwrap();
    assert_eq!(changed, 1);
    assert_eq!(
        milestones
            .milestone_complete(&project.slug, APPROVED_LABEL)
            .unwrap(),
        Some(false)
    );
    assert_eq!(
        milestones
            .milestone_complete(&project.slug, "Field Work Conducted")
            .unwrap(),
        Some(true)
    );

    assert!(matches!(
        milestones.update_milestones(&bob(), &project.slug, &wanted),
        Err(ServiceError::PermissionDenied { .. })
    ));

    // An empty selection clears field work again.
    let changed = milestones
        .update_milestones(&manager(), &project.slug, &[])
        .unwrap();
    assert_eq!(changed, 1);
}

#[test]
fn reporting_requirements_split_outstanding_and_complete() {
    let fx = fixture();
    let milestones = MilestoneService::with_connection(&fx.conn);
    let project = fx.create(&alice(), "LHA_IA12_001", "Offshore Index");

    let outstanding = milestones.get_outstanding(&project.slug).unwrap();
    let labels: Vec<&str> = outstanding
        .iter()
        .map(|record| record.milestone.label.as_str())
        .collect();
    assert!(labels.contains(&"Completion Report"));
    assert!(labels.contains(&"Summary Report"));
    assert!(milestones.get_complete(&project.slug).unwrap().is_empty());
    assert_eq!(
        milestones.get_core_assignments(&project.slug).unwrap().len(),
        outstanding.len()
    );
    assert!(milestones
        .get_custom_assignments(&project.slug)
        .unwrap()
        .is_empty());
}

#[test]
fn requirement_edits_replace_one_group() {
    let fx = fixture();
    let milestones = MilestoneService::with_connection(&fx.conn);
    let project = fx.create(&alice(), "LHA_IA12_001", "Offshore Index");
    let custom = milestones
        .add_milestone(&manager(), "  creel  SUMMARY ", true)
        .unwrap();
    assert_eq!(custom.label, "Creel Summary");

    let options = milestones.reporting_options(&project.slug).unwrap();
    let core = options
        .iter()
        .find(|option| option.group == RequirementGroup::Core)
        .unwrap();
    let completion = core
        .choices
        .iter()
        .find(|milestone| milestone.label == "Completion Report")
        .unwrap()
        .id;
    assert!(core.assigned.contains(&completion));

    milestones
        .update_requirements(&manager(), &project.slug, RequirementGroup::Core, &[completion])
        .unwrap();
    milestones
        .update_requirements(
            &manager(),
            &project.slug,
            RequirementGroup::Custom,
            &[custom.id],
        )
        .unwrap();

    let core_labels: Vec<String> = milestones
        .get_core_assignments(&project.slug)
        .unwrap()
        .into_iter()
        .map(|record| record.milestone.label)
        .collect();
    assert_eq!(core_labels, vec!["Completion Report".to_string()]);
    assert_eq!(
        milestones.get_custom_assignments(&project.slug).unwrap()[0]
            .milestone
            .label,
        "Creel Summary"
    );

    // A milestone from another group is rejected.
    assert!(matches!(
        milestones.update_requirements(
            &manager(),
            &project.slug,
            RequirementGroup::Core,
            &[custom.id]
        ),
        Err(ServiceError::MilestoneNotFound(_))
    ));
    assert!(matches!(
        milestones.update_requirements(&alice(), &project.slug, RequirementGroup::Core, &[]),
        Err(ServiceError::PermissionDenied { .. })
    ));
}

#[test]
fn add_milestone_reuses_existing_labels() {
    let fx = fixture();
    let milestones = MilestoneService::with_connection(&fx.conn);

    let first = milestones
        .add_milestone(&manager(), "gear audit", false)
        .unwrap();
    let again = milestones
        .add_milestone(&manager(), "GEAR AUDIT", false)
        .unwrap();
    assert_eq!(first.id, again.id);
    assert!(matches!(
        milestones.add_milestone(&alice(), "another", false),
        Err(ServiceError::PermissionDenied { .. })
    ));
}

#[test]
fn default_catalogue_install_is_idempotent() {
    let fx = fixture();
    let milestones = MilestoneService::with_connection(&fx.conn);
    assert_eq!(milestones.install_default_milestones().unwrap(), 0);
}
