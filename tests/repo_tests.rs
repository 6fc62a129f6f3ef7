use serial_test::serial;

use artmod::auth::Role;
use artmod::models::*;
use artmod::repo::inmem::InMemRepo;
use artmod::repo::{ContentRepo, ReportRepo, RepoError, UserRepo};

fn setup() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("ARTMOD_DATA_DIR", dir.path());
    dir
}

fn new_row(reporter: Id, content_type: ContentType, content_id: Id, target: Id) -> NewReportRow {
    NewReportRow {
        reporter_id: reporter,
        content_type,
        content_id,
        reason: ReportReason::Spam,
        description: "وصف تجريبي طويل بما يكفي".into(),
        priority: ReportPriority::Medium,
        target_user_id: target,
        content_title: Some("Sample".into()),
    }
}

#[actix_rt::test]
#[serial]
async fn open_duplicates_are_refused_at_the_store() {
    let _guard = setup();
    let repo = InMemRepo::new();
    let alice = repo.seed_user("Alice", "alice@example.com", Role::User);
    let bob = repo.seed_user("Bob", "bob@example.com", Role::User);
    let art = repo.seed_artwork(bob, "Dup Target");

    let first = repo
        .create_report(new_row(alice, ContentType::Artwork, art, bob))
        .await
        .unwrap();
    assert_eq!(first.status, ReportStatus::Pending);

    let second = repo
        .create_report(new_row(alice, ContentType::Artwork, art, bob))
        .await;
    assert!(matches!(second, Err(RepoError::Conflict)));

    // Once the first report is closed the same tuple is insertable again.
    repo.update_status(
        first.id,
        StatusUpdate {
            status: ReportStatus::Rejected,
            admin_notes: None,
            action_taken: None,
            reviewed_by: bob,
        },
    )
    .await
    .unwrap();
    assert!(repo
        .create_report(new_row(alice, ContentType::Artwork, art, bob))
        .await
        .is_ok());
}

#[actix_rt::test]
#[serial]
async fn state_survives_a_restart() {
    let _guard = setup();
    let report_id = {
        let repo = InMemRepo::new();
        let alice = repo.seed_user("Alice", "alice@example.com", Role::User);
        let bob = repo.seed_user("Bob", "bob@example.com", Role::User);
        let art = repo.seed_artwork(bob, "Persistent");
        repo.create_report(new_row(alice, ContentType::Artwork, art, bob))
            .await
            .unwrap()
            .id
    };

    // A fresh instance over the same data directory sees the report.
    let repo = InMemRepo::new();
    let report = repo.get_report(report_id).await.unwrap();
    assert_eq!(report.content_title.as_deref(), Some("Sample"));
    assert_eq!(repo.list_admin_ids().await.unwrap(), Vec::<Id>::new());
}

#[actix_rt::test]
#[serial]
async fn related_reports_exclude_self_and_honor_the_limit() {
    let _guard = setup();
    let repo = InMemRepo::new();
    let bob = repo.seed_user("Bob", "bob@example.com", Role::User);
    let art = repo.seed_artwork(bob, "Hot Content");

    let mut ids = Vec::new();
    for i in 0..4 {
        let reporter = repo.seed_user(&format!("R{i}"), &format!("r{i}@example.com"), Role::User);
        ids.push(
            repo.create_report(new_row(reporter, ContentType::Artwork, art, bob))
                .await
                .unwrap()
                .id,
        );
    }

    let related = repo
        .related_reports(ContentType::Artwork, art, ids[0], 2)
        .await
        .unwrap();
    assert_eq!(related.len(), 2);
    assert!(related.iter().all(|r| r.id != ids[0]));
    // Newest first.
    assert_eq!(related[0].id, ids[3]);
    assert_eq!(related[1].id, ids[2]);
}

#[actix_rt::test]
#[serial]
async fn status_counts_scope_to_one_reporter() {
    let _guard = setup();
    let repo = InMemRepo::new();
    let alice = repo.seed_user("Alice", "alice@example.com", Role::User);
    let carol = repo.seed_user("Carol", "carol@example.com", Role::User);
    let bob = repo.seed_user("Bob", "bob@example.com", Role::User);
    let art1 = repo.seed_artwork(bob, "A");
    let art2 = repo.seed_artwork(bob, "B");

    repo.create_report(new_row(alice, ContentType::Artwork, art1, bob))
        .await
        .unwrap();
    repo.create_report(new_row(carol, ContentType::Artwork, art2, bob))
        .await
        .unwrap();

    let all = repo.status_counts(None).await.unwrap();
    assert_eq!(StatusSummary::from_counts(&all).total(), 2);
    let mine = repo.status_counts(Some(alice)).await.unwrap();
    let mine = StatusSummary::from_counts(&mine);
    assert_eq!(mine.pending, 1);
    assert_eq!(mine.total(), 1);
}

#[actix_rt::test]
#[serial]
async fn content_resolution_takes_title_snapshots() {
    let _guard = setup();
    let repo = InMemRepo::new();
    let bob = repo.seed_user("Bob", "bob@example.com", Role::User);
    let long_body = "كلمة ".repeat(30);
    let comment = repo.seed_comment(bob, &long_body);

    let target = repo
        .resolve_content(ContentType::Comment, comment)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(target.owner_id, bob);
    // Comment snapshots are capped at 60 characters.
    assert_eq!(target.title.unwrap().chars().count(), 60);

    // Reporting a user resolves to the user themselves.
    let target = repo
        .resolve_content(ContentType::User, bob)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(target.owner_id, bob);
    assert_eq!(target.title.as_deref(), Some("Bob"));

    // Missing content is None, not an error.
    assert!(repo
        .resolve_content(ContentType::Image, 9999)
        .await
        .unwrap()
        .is_none());
}

#[actix_rt::test]
#[serial]
async fn list_reports_paginates_newest_first() {
    let _guard = setup();
    let repo = InMemRepo::new();
    let bob = repo.seed_user("Bob", "bob@example.com", Role::User);
    let mut ids = Vec::new();
    for i in 0..5 {
        let reporter = repo.seed_user(&format!("R{i}"), &format!("r{i}@example.com"), Role::User);
        let art = repo.seed_artwork(bob, &format!("Piece {i}"));
        ids.push(
            repo.create_report(new_row(reporter, ContentType::Artwork, art, bob))
                .await
                .unwrap()
                .id,
        );
    }

    let filter = ReportFilter::default();
    let (page1, total) = repo
        .list_reports(&filter, PageParams::new(Some(1), Some(2)))
        .await
        .unwrap();
    assert_eq!(total, 5);
    assert_eq!(page1.iter().map(|r| r.id).collect::<Vec<_>>(), vec![ids[4], ids[3]]);

    let (page3, _) = repo
        .list_reports(&filter, PageParams::new(Some(3), Some(2)))
        .await
        .unwrap();
    assert_eq!(page3.iter().map(|r| r.id).collect::<Vec<_>>(), vec![ids[0]]);
}
