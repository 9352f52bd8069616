mod common;

use common::{alice, bob, dba, fixture, manager};
use pjtk_core::model::project::{project_year, ProjectValidationError};
use pjtk_core::service::milestone_service::MilestoneService;
use pjtk_core::service::project_service::ProjectService;
use pjtk_core::ServiceError;

#[test]
fn create_derives_slug_year_and_assigns_core_milestones() {
    let fx = fixture();
    let project = fx.create(&alice(), "LHA_IA12_001", "Offshore Index");

    assert_eq!(project.slug, "lha_ia12_001");
    assert_eq!(project.year, 2012);
    assert_eq!(project.owner, "alice");

    let milestones = MilestoneService::with_connection(&fx.conn);
    let assigned = milestones.get_milestones(&project.slug).unwrap();
    let labels: Vec<&str> = assigned.iter().map(|r| r.milestone.label.as_str()).collect();
    assert!(labels.contains(&"Approved"));
    assert!(labels.contains(&"Sign off"));
    assert!(assigned.iter().all(|record| record.required && !record.is_complete()));
    assert_eq!(
        milestones
            .milestone_complete(&project.slug, "Approved")
            .unwrap(),
        Some(false)
    );
}

#[test]
fn owner_is_forced_unless_actor_may_assign_it() {
    let fx = fixture();
    let service = ProjectService::with_connection(&fx.conn);

    let mut draft = fx.draft("LHA_IA12_002", "Forced Owner");
    draft.owner = Some("bob".to_string());
    let created = service.create_project(&alice(), &draft).unwrap();
    assert_eq!(created.owner, "alice");

    let mut draft = fx.draft("LHA_IA12_003", "Assigned Owner");
    draft.owner = Some("bob".to_string());
    let created = service.create_project(&dba(), &draft).unwrap();
    assert_eq!(created.owner, "bob");
}

#[test]
fn invalid_and_duplicate_codes_are_rejected() {
    let fx = fixture();
    let service = ProjectService::with_connection(&fx.conn);

    let err = service
        .create_project(&alice(), &fx.draft("LHA_IA12_001", "First"))
        .map(|_| ())
        .and_then(|_| service.create_project(&alice(), &fx.draft("LHA_IA12_001", "Again")))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    let mut draft = fx.draft("LHA_IA12_004", "Bad dates");
    draft.prj_date1 = draft.prj_date0.pred_opt().unwrap();
    assert!(matches!(
        service.create_project(&alice(), &draft),
        Err(ServiceError::Validation(ProjectValidationError::EndBeforeStart))
    ));
}

#[test]
fn codes_with_non_ascii_digits_are_invalid() {
    let fx = fixture();
    let code = "LHA_IA\u{0966}\u{0966}_001";

    assert_eq!(
        project_year(code),
        Err(ProjectValidationError::InvalidCode(code.to_string()))
    );

    let mut draft = fx.draft("LHA_IA12_005", "Devanagari year");
    draft.prj_cd = code.to_string();
    assert!(matches!(
        ProjectService::with_connection(&fx.conn).create_project(&alice(), &draft),
        Err(ServiceError::Validation(ProjectValidationError::InvalidCode(_)))
    ));
}

#[test]
fn edit_keeps_code_and_requires_owner_or_manager() {
    let fx = fixture();
    let service = ProjectService::with_connection(&fx.conn);
    let project = fx.create(&alice(), "LHA_IA12_001", "Offshore Index");

    let mut draft = project.to_draft();
    draft.prj_cd = "LHA_IA12_999".to_string();
    draft.prj_nm = "Renamed Index".to_string();

    assert!(matches!(
        service.edit_project(&bob(), &project.slug, &draft),
        Err(ServiceError::PermissionDenied { .. })
    ));

    let edited = service.edit_project(&alice(), &project.slug, &draft).unwrap();
    assert_eq!(edited.prj_cd, "LHA_IA12_001");
    assert_eq!(edited.prj_nm, "Renamed Index");
    assert_eq!(
        service.get_project(&project.slug).unwrap().prj_nm,
        "Renamed Index"
    );
}

#[test]
fn copy_creates_a_fresh_project_owned_by_the_actor() {
    let fx = fixture();
    let service = ProjectService::with_connection(&fx.conn);
    let original = fx.create_approved("LHA_IA12_001", "Offshore Index");

    let mut draft = original.to_draft();
    draft.prj_cd = "LHA_IA12_010".to_string();
    let copy = service.copy_project(&bob(), &original.slug, &draft).unwrap();

    assert_eq!(copy.owner, "bob");
    assert_eq!(copy.prj_nm, original.prj_nm);
    let milestones = MilestoneService::with_connection(&fx.conn);
    assert_eq!(
        milestones.milestone_complete(&copy.slug, "Approved").unwrap(),
        Some(false)
    );
}

#[test]
fn tags_are_normalized_and_searchable() {
    let fx = fixture();
    let service = ProjectService::with_connection(&fx.conn);
    let project = fx.create(&alice(), "LHA_IA12_001", "Offshore Index");

    service
        .set_tags(
            &alice(),
            &project.slug,
            &["Walleye".to_string(), " walleye ".to_string(), "Lake Trout".to_string()],
        )
        .unwrap();

    assert_eq!(
        service.project_tags(&project.slug).unwrap(),
        vec!["lake trout".to_string(), "walleye".to_string()]
    );
    assert_eq!(service.list_tags().unwrap().len(), 2);
    let tagged = service.projects_with_tag("WALLEYE").unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].prj_cd, "LHA_IA12_001");
}

#[test]
fn bookmarks_are_idempotent_and_define_watchers() {
    let fx = fixture();
    let service = ProjectService::with_connection(&fx.conn);
    let project = fx.create(&alice(), "LHA_IA12_001", "Offshore Index");

    service.bookmark(&bob(), &project.slug).unwrap();
    service.bookmark(&bob(), &project.slug).unwrap();
    assert_eq!(service.bookmarks("bob").unwrap().len(), 1);
    assert_eq!(service.watchers(&project.slug).unwrap(), vec!["bob".to_string()]);

    service.unbookmark(&bob(), &project.slug).unwrap();
    assert!(service.watchers(&project.slug).unwrap().is_empty());
}

#[test]
fn overview_groups_the_employee_subtree_by_status() {
    let fx = fixture();
    let service = ProjectService::with_connection(&fx.conn);
    let milestones = MilestoneService::with_connection(&fx.conn);

    let submitted = fx.create(&bob(), "LHA_IA12_001", "Submitted");
    let approved = fx.create(&alice(), "LHA_IA12_002", "Approved");
    let complete = fx.create(&alice(), "LHA_IA12_003", "Complete");
    milestones.approve(&manager(), &approved.slug).unwrap();
    milestones.approve(&manager(), &complete.slug).unwrap();
    milestones.signoff(&manager(), &complete.slug).unwrap();

    let overview = service.my_projects(&alice()).unwrap();
    assert_eq!(overview.employees, vec!["alice".to_string(), "bob".to_string()]);
    assert!(overview.boss);
    assert_eq!(overview.submitted[0].slug, submitted.slug);
    assert_eq!(overview.approved[0].slug, approved.slug);
    assert_eq!(overview.complete[0].slug, complete.slug);
    assert!(!overview.notices.is_empty());

    let bobs = service.my_projects(&bob()).unwrap();
    assert!(!bobs.boss);
    assert_eq!(bobs.submitted.len(), 1);
    assert!(bobs.approved.is_empty());
}

#[test]
fn employee_overview_is_manager_only() {
    let fx = fixture();
    let service = ProjectService::with_connection(&fx.conn);
    fx.create(&bob(), "LHA_IA12_001", "Submitted");

    assert!(matches!(
        service.employee_projects(&alice(), "bob"),
        Err(ServiceError::PermissionDenied { .. })
    ));
    let overview = service.employee_projects(&manager(), "bob").unwrap();
    assert_eq!(overview.submitted.len(), 1);
    assert!(overview.notices.is_empty());
}
