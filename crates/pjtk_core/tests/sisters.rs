mod common;

use common::{alice, fixture};
use pjtk_core::service::project_service::ProjectService;
use pjtk_core::service::sister_service::SisterService;
use pjtk_core::ServiceError;

fn codes(projects: &[pjtk_core::Project]) -> Vec<&str> {
    projects.iter().map(|p| p.prj_cd.as_str()).collect()
}

#[test]
fn candidates_are_approved_and_comparable() {
    let fx = fixture();
    let sisters = SisterService::with_connection(&fx.conn);
    let projects = ProjectService::with_connection(&fx.conn);

    let parent = fx.create_approved("LHA_IA12_001", "Parent");
    fx.create_approved("LHA_IA12_002", "Comparable");
    fx.create(&alice(), "LHA_IA12_003", "Not approved");
    fx.create_approved("LHA_IA13_004", "Other year");

    let mut other_lake = fx.draft("LHA_IA12_005", "Other lake");
    other_lake.lake_id = fx.erie;
    let other_lake = projects.create_project(&alice(), &other_lake).unwrap();
    pjtk_core::MilestoneService::with_connection(&fx.conn)
        .approve(&common::manager(), &other_lake.slug)
        .unwrap();

    let candidates = sisters.sister_candidates(&parent.slug).unwrap();
    assert_eq!(codes(&candidates), vec!["LHA_IA12_002"]);

    let unapproved = projects.get_project("lha_ia12_003").unwrap();
    assert!(sisters
        .sister_candidates(&unapproved.slug)
        .unwrap()
        .is_empty());
}

#[test]
fn add_sister_rejects_non_candidates() {
    let fx = fixture();
    let sisters = SisterService::with_connection(&fx.conn);
    let parent = fx.create_approved("LHA_IA12_001", "Parent");
    let pending = fx.create(&alice(), "LHA_IA12_002", "Pending");

    let err = sisters.add_sister(&parent.slug, &pending.slug).unwrap_err();
    assert!(matches!(err, ServiceError::NotASisterCandidate { .. }));
    assert!(!sisters.has_sister(&parent.slug).unwrap());
}

#[test]
fn sisters_are_symmetric_and_transitive() {
    let fx = fixture();
    let sisters = SisterService::with_connection(&fx.conn);
    let a = fx.create_approved("LHA_IA12_001", "A");
    let b = fx.create_approved("LHA_IA12_002", "B");
    let c = fx.create_approved("LHA_IA12_003", "C");

    let family = sisters.add_sister(&a.slug, &b.slug).unwrap();
    assert_eq!(sisters.add_sister(&b.slug, &c.slug).unwrap(), family);

    assert_eq!(
        codes(&sisters.get_sisters(&c.slug, true).unwrap()),
        vec!["LHA_IA12_001", "LHA_IA12_002"]
    );
    assert_eq!(sisters.get_sisters(&a.slug, false).unwrap().len(), 3);
    assert!(sisters.sister_candidates(&a.slug).unwrap().is_empty());
}

#[test]
fn linking_two_families_merges_them() {
    let fx = fixture();
    let sisters = SisterService::with_connection(&fx.conn);
    let a = fx.create_approved("LHA_IA12_001", "A");
    let b = fx.create_approved("LHA_IA12_002", "B");
    let c = fx.create_approved("LHA_IA12_003", "C");
    let d = fx.create_approved("LHA_IA12_004", "D");

    sisters.add_sister(&a.slug, &b.slug).unwrap();
    sisters.add_sister(&c.slug, &d.slug).unwrap();
    let merged = sisters.add_sister(&b.slug, &c.slug).unwrap();

    for project in [&a, &b, &c, &d] {
        assert_eq!(sisters.get_family(&project.slug).unwrap(), Some(merged));
    }
}

#[test]
fn removing_the_last_sister_dissolves_the_family() {
    let fx = fixture();
    let sisters = SisterService::with_connection(&fx.conn);
    let a = fx.create_approved("LHA_IA12_001", "A");
    let b = fx.create_approved("LHA_IA12_002", "B");
    let c = fx.create_approved("LHA_IA12_003", "C");
    sisters.add_sister(&a.slug, &b.slug).unwrap();

    // Not sisters: nothing happens.
    sisters.delete_sister(&a.slug, &c.slug).unwrap();
    assert!(sisters.has_sister(&a.slug).unwrap());

    sisters.delete_sister(&a.slug, &b.slug).unwrap();
    assert_eq!(sisters.get_family(&a.slug).unwrap(), None);
    assert_eq!(sisters.get_family(&b.slug).unwrap(), None);
}

#[test]
fn disown_leaves_the_rest_of_the_family_intact() {
    let fx = fixture();
    let sisters = SisterService::with_connection(&fx.conn);
    let a = fx.create_approved("LHA_IA12_001", "A");
    let b = fx.create_approved("LHA_IA12_002", "B");
    let c = fx.create_approved("LHA_IA12_003", "C");
    sisters.add_sister(&a.slug, &b.slug).unwrap();
    sisters.add_sister(&a.slug, &c.slug).unwrap();

    sisters.disown(&a.slug).unwrap();

    assert_eq!(sisters.get_family(&a.slug).unwrap(), None);
    assert_eq!(
        codes(&sisters.get_sisters(&b.slug, true).unwrap()),
        vec!["LHA_IA12_003"]
    );
}

#[test]
fn update_sisters_applies_the_form_selection() {
    let fx = fixture();
    let sisters = SisterService::with_connection(&fx.conn);
    let a = fx.create_approved("LHA_IA12_001", "A");
    let b = fx.create_approved("LHA_IA12_002", "B");
    let c = fx.create_approved("LHA_IA12_003", "C");

    sisters
        .update_sisters(&a.slug, &["LHA_IA12_002".to_string()])
        .unwrap();
    assert_eq!(
        codes(&sisters.get_sisters(&a.slug, true).unwrap()),
        vec!["LHA_IA12_002"]
    );

    // Swapping b for c adds c before dropping b, so a stays in a family.
    sisters
        .update_sisters(&a.slug, &[c.slug.clone()])
        .unwrap();
    assert_eq!(
        codes(&sisters.get_sisters(&a.slug, true).unwrap()),
        vec!["LHA_IA12_003"]
    );
    assert_eq!(sisters.get_family(&b.slug).unwrap(), None);

    sisters.update_sisters(&a.slug, &[]).unwrap();
    assert!(!sisters.has_sister(&a.slug).unwrap());
    assert!(!sisters.has_sister(&c.slug).unwrap());
}

#[test]
fn listing_marks_current_sisters_checked() {
    let fx = fixture();
    let sisters = SisterService::with_connection(&fx.conn);
    let a = fx.create_approved("LHA_IA12_001", "A");
    let b = fx.create_approved("LHA_IA12_002", "B");
    fx.create_approved("LHA_IA12_003", "C");
    sisters.add_sister(&a.slug, &b.slug).unwrap();

    let listing = sisters.sister_listing(&a.slug).unwrap();
    let rows: Vec<(&str, bool)> = listing
        .iter()
        .map(|choice| (choice.prj_cd.as_str(), choice.checked))
        .collect();
    assert_eq!(rows, vec![("LHA_IA12_002", true), ("LHA_IA12_003", false)]);
}
