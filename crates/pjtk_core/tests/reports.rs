mod common;

use common::{alice, bob, fixture, manager};
use pjtk_core::model::milestone::RequirementGroup;
use pjtk_core::service::milestone_service::MilestoneService;
use pjtk_core::service::notice_service::NoticeService;
use pjtk_core::service::report_service::ReportService;
use pjtk_core::service::sister_service::SisterService;
use pjtk_core::ServiceError;

#[test]
fn upload_completes_the_milestone_and_notifies() {
    let fx = fixture();
    let reports = ReportService::with_connection(&fx.conn);
    let milestones = MilestoneService::with_connection(&fx.conn);
    let project = fx.create(&alice(), "LHA_IA12_001", "Offshore Index");

    let report = reports
        .upload_report(
            &alice(),
            &project.slug,
            "Project Proposal",
            "reports/LHA_IA12_001/proposal.pdf",
        )
        .unwrap();
    assert!(report.current);
    assert_eq!(report.report_hash.len(), 64);

    let complete: Vec<String> = milestones
        .get_complete(&project.slug)
        .unwrap()
        .into_iter()
        .map(|record| record.milestone.label)
        .collect();
    assert_eq!(complete, vec!["Project Proposal".to_string()]);
    assert!(!milestones
        .get_outstanding(&project.slug)
        .unwrap()
        .iter()
        .any(|record| record.milestone.label == "Project Proposal"));

    let inbox = NoticeService::with_connection(&fx.conn)
        .my_messages("boss", false)
        .unwrap();
    assert_eq!(inbox[0].milestone, "Project Proposal");
}

#[test]
fn a_new_upload_demotes_the_previous_report() {
    let fx = fixture();
    let reports = ReportService::with_connection(&fx.conn);
    let project = fx.create(&alice(), "LHA_IA12_001", "Offshore Index");

    reports
        .upload_report(&alice(), &project.slug, "Completion Report", "v1.pdf")
        .unwrap();
    reports
        .upload_report(&alice(), &project.slug, "Completion Report", "v2.pdf")
        .unwrap();

    let current = reports.uploaded_reports(&project.slug).unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].report.report_path, "v2.pdf");
    assert_eq!(current[0].milestone_label, "Completion Report");

    let assignment = reports
        .assignments_with_paths(&project.slug, true)
        .unwrap()
        .into_iter()
        .find(|a| a.project_milestone.milestone.label == "Completion Report")
        .unwrap();
    assert_eq!(assignment.report.unwrap().report_path, "v2.pdf");
}

#[test]
fn upload_rules_are_enforced() {
    let fx = fixture();
    let reports = ReportService::with_connection(&fx.conn);
    let milestones = MilestoneService::with_connection(&fx.conn);
    let project = fx.create(&alice(), "LHA_IA12_001", "Offshore Index");

    assert!(matches!(
        reports.upload_report(&bob(), &project.slug, "Completion Report", "x.pdf"),
        Err(ServiceError::PermissionDenied { .. })
    ));
    assert!(matches!(
        reports.upload_report(&alice(), &project.slug, "No Such Report", "x.pdf"),
        Err(ServiceError::MilestoneNotFound(_))
    ));

    let custom = milestones
        .add_milestone(&manager(), "Creel Summary", true)
        .unwrap();
    assert!(matches!(
        reports.upload_report(&alice(), &project.slug, &custom.label, "x.pdf"),
        Err(ServiceError::MilestoneNotAssigned { .. })
    ));
}

#[test]
fn shared_reports_reach_every_sister() {
    let fx = fixture();
    let reports = ReportService::with_connection(&fx.conn);
    let milestones = MilestoneService::with_connection(&fx.conn);
    let sisters = SisterService::with_connection(&fx.conn);
    let a = fx.create_approved("LHA_IA12_001", "A");
    let b = fx.create_approved("LHA_IA12_002", "B");
    let c = fx.create_approved("LHA_IA12_003", "C");
    sisters.add_sister(&a.slug, &b.slug).unwrap();

    reports
        .upload_report(&alice(), &a.slug, "Summary Report", "summary.pdf")
        .unwrap();
    reports
        .upload_report(&alice(), &a.slug, "Project Proposal", "proposal.pdf")
        .unwrap();

    let b_reports: Vec<String> = reports
        .uploaded_reports(&b.slug)
        .unwrap()
        .into_iter()
        .map(|linked| linked.milestone_label)
        .collect();
    assert_eq!(b_reports, vec!["Summary Report".to_string()]);
    assert!(reports.uploaded_reports(&c.slug).unwrap().is_empty());
    assert_eq!(
        milestones.milestone_complete(&b.slug, "Summary Report").unwrap(),
        Some(true)
    );
}

#[test]
fn shared_upload_assigns_missing_sister_requirements() {
    let fx = fixture();
    let reports = ReportService::with_connection(&fx.conn);
    let milestones = MilestoneService::with_connection(&fx.conn);
    let sisters = SisterService::with_connection(&fx.conn);
    let a = fx.create_approved("LHA_IA12_001", "A");
    let b = fx.create_approved("LHA_IA12_002", "B");
    sisters.add_sister(&a.slug, &b.slug).unwrap();

    let shared = milestones
        .add_milestone(&manager(), "Genetics Summary", true)
        .unwrap();
    milestones
        .update_requirements(&manager(), &a.slug, RequirementGroup::Custom, &[shared.id])
        .unwrap();
    fx.conn
        .execute(
            "UPDATE milestones SET shared = 1 WHERE id = ?1;",
            [shared.id],
        )
        .unwrap();

    reports
        .upload_report(&alice(), &a.slug, "Genetics Summary", "genetics.pdf")
        .unwrap();

    let custom = reports.assignments_with_paths(&b.slug, false).unwrap();
    assert_eq!(custom.len(), 1);
    assert!(custom[0].project_milestone.required);
    assert_eq!(
        custom[0].report.as_ref().map(|r| r.report_path.as_str()),
        Some("genetics.pdf")
    );
}

#[test]
fn failed_shared_upload_leaves_sister_requirements_untouched() {
    let fx = fixture();
    let reports = ReportService::with_connection(&fx.conn);
    let milestones = MilestoneService::with_connection(&fx.conn);
    let sisters = SisterService::with_connection(&fx.conn);
    let a = fx.create_approved("LHA_IA12_001", "A");
    let b = fx.create_approved("LHA_IA12_002", "B");
    sisters.add_sister(&a.slug, &b.slug).unwrap();

    let shared = milestones
        .add_milestone(&manager(), "Genetics Summary", true)
        .unwrap();
    milestones
        .update_requirements(&manager(), &a.slug, RequirementGroup::Custom, &[shared.id])
        .unwrap();
    fx.conn
        .execute_batch(&format!(
            "UPDATE milestones SET shared = 1 WHERE id = {id};
             CREATE TEMP TRIGGER reject_reports BEFORE INSERT ON reports
             BEGIN SELECT RAISE(ABORT, 'storage offline'); END;",
            id = shared.id
        ))
        .unwrap();

    assert!(reports
        .upload_report(&alice(), &a.slug, "Genetics Summary", "genetics.pdf")
        .is_err());

    assert!(reports.assignments_with_paths(&b.slug, false).unwrap().is_empty());
    assert!(fx.conn.is_autocommit());
}

#[test]
fn associated_files_are_listed_per_project() {
    let fx = fixture();
    let reports = ReportService::with_connection(&fx.conn);
    let project = fx.create(&alice(), "LHA_IA12_001", "Offshore Index");
    let other = fx.create(&alice(), "LHA_IA12_002", "Other");

    assert!(matches!(
        reports.upload_associated_file(&bob(), &project.slug, "catch.xlsx"),
        Err(ServiceError::PermissionDenied { .. })
    ));
    let file = reports
        .upload_associated_file(&alice(), &project.slug, "files/catch.xlsx")
        .unwrap();
    reports
        .upload_associated_file(&manager(), &project.slug, "files/effort.xlsx")
        .unwrap();

    let files = reports.associated_files(&project.slug).unwrap();
    assert_eq!(files.len(), 2);
    assert!(files.iter().any(|f| f.uuid == file.uuid && f.uploaded_by == "alice"));
    assert!(reports.associated_files(&other.slug).unwrap().is_empty());
}
