use std::sync::Arc;
use std::time::Duration;

use actix_web::{test, web, App};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use serial_test::serial;

use artmod::auth::{create_jwt, Role};
use artmod::models::*;
use artmod::notify::RecordingNotifier;
use artmod::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use artmod::repo::inmem::InMemRepo;
use artmod::repo::{ContentRepo, ReportRepo, RepoResult, UserRepo};
use artmod::{config, AppState};

fn setup() -> tempfile::TempDir {
    std::env::set_var("JWT_SECRET", "integration-test-secret-0123456789abcdef");
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("ARTMOD_DATA_DIR", dir.path());
    dir
}

fn app_state(repo: &Arc<InMemRepo>, notifier: &Arc<RecordingNotifier>) -> AppState {
    AppState {
        repo: repo.clone(),
        notifier: notifier.clone(),
        rate_limiter: RateLimiterFacade::new(
            InMemoryRateLimiter::new(false),
            RateLimitConfig {
                report_limit: 5,
                report_window: Duration::from_secs(3600),
            },
        ),
    }
}

fn bearer(user_id: Id, role: Role) -> (&'static str, String) {
    let token = create_jwt(user_id, role).unwrap();
    ("Authorization", format!("Bearer {token}"))
}

async fn read_json(resp: actix_web::dev::ServiceResponse) -> Value {
    test::read_body_json(resp).await
}

async fn drain_notifications() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Files one report and yields its id.
macro_rules! file_report {
    ($app:expr, $reporter:expr, $kind:expr, $content:expr, $reason:expr, $desc:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/v1/reports")
            .insert_header(bearer($reporter, Role::User))
            .set_json(json!({
                "contentType": $kind,
                "contentId": $content,
                "reason": $reason,
                "description": $desc,
            }))
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), 201);
        let body: Value = test::read_body_json(resp).await;
        body["data"]["report"]["id"].as_i64().unwrap()
    }};
}

#[actix_web::test]
#[serial]
async fn admin_listing_applies_filters() {
    let _guard = setup();
    let repo = Arc::new(InMemRepo::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let admin = repo.seed_user("Mona", "mona@example.com", Role::Admin);
    let alice = repo.seed_user("Alice", "alice@example.com", Role::User);
    let carol = repo.seed_user("Carol", "carol@example.com", Role::User);
    let bob = repo.seed_user("Bob", "bob@example.com", Role::User);
    let artwork = repo.seed_artwork(bob, "Gallery Opening");
    let image = repo.seed_image(bob, Some("Backstage"));

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(&repo, &notifier)))
            .configure(config),
    )
    .await;

    file_report!(app, alice, "artwork", artwork, "spam", "إعلان مكرر في صفحة المعرض");
    file_report!(app, carol, "image", image, "copyright", "الصورة منسوخة من موقع آخر");

    // Unfiltered: both reports, newest first.
    let req = test::TestRequest::get()
        .uri("/api/v1/reports/admin/all")
        .insert_header(bearer(admin, Role::Admin))
        .to_request();
    let body = read_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["reports"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["pagination"]["total"], json!(2));
    assert_eq!(body["data"]["reports"][0]["reason"], json!("copyright"));

    // Filter by reason.
    let req = test::TestRequest::get()
        .uri("/api/v1/reports/admin/all?reason=spam")
        .insert_header(bearer(admin, Role::Admin))
        .to_request();
    let body = read_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["reports"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["reports"][0]["contentType"], json!("artwork"));

    // Substring search hits the denormalized title too.
    let req = test::TestRequest::get()
        .uri("/api/v1/reports/admin/all?search=Backstage")
        .insert_header(bearer(admin, Role::Admin))
        .to_request();
    let body = read_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["reports"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["reports"][0]["contentType"], json!("image"));

    // A future-only date range matches nothing.
    let req = test::TestRequest::get()
        .uri("/api/v1/reports/admin/all?dateFrom=2099-01-01")
        .insert_header(bearer(admin, Role::Admin))
        .to_request();
    let body = read_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["pagination"]["total"], json!(0));
    assert_eq!(body["data"]["pagination"]["totalPages"], json!(0));
}

#[actix_web::test]
#[serial]
async fn stats_aggregate_by_dimension() {
    let _guard = setup();
    let repo = Arc::new(InMemRepo::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let admin = repo.seed_user("Mona", "mona@example.com", Role::Admin);
    let alice = repo.seed_user("Alice", "alice@example.com", Role::User);
    let carol = repo.seed_user("Carol", "carol@example.com", Role::User);
    let bob = repo.seed_user("Bob", "bob@example.com", Role::User);
    let artwork = repo.seed_artwork(bob, "Morning Light");
    let image = repo.seed_image(bob, None);
    let comment = repo.seed_comment(bob, "تعليق عدواني على منشور أليس");

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(&repo, &notifier)))
            .configure(config),
    )
    .await;

    file_report!(app, alice, "artwork", artwork, "spam", "محتوى ترويجي خارج السياق");
    file_report!(app, carol, "image", image, "spam", "نفس الصورة منشورة عدة مرات");
    let escalate_me =
        file_report!(app, alice, "comment", comment, "harassment", "تعليق يتضمن تهديداً مباشراً");

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/reports/admin/{escalate_me}/status"))
        .insert_header(bearer(admin, Role::Admin))
        .set_json(json!({ "status": "escalated" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    // Default grouping is by content type.
    let req = test::TestRequest::get()
        .uri("/api/v1/reports/admin/stats")
        .insert_header(bearer(admin, Role::Admin))
        .to_request();
    let body = read_json(test::call_service(&app, req).await).await;
    let stats = &body["data"];
    assert_eq!(stats["total"], json!(3));
    assert_eq!(stats["byStatus"]["pending"], json!(2));
    assert_eq!(stats["byStatus"]["escalated"], json!(1));
    assert_eq!(stats["grouped"].as_array().unwrap().len(), 3);
    assert_eq!(stats["topReasons"][0]["reason"], json!("spam"));
    assert_eq!(stats["topReasons"][0]["count"], json!(2));
    assert_eq!(stats["daily"].as_array().unwrap().len(), 1);

    // Group by reason instead.
    let req = test::TestRequest::get()
        .uri("/api/v1/reports/admin/stats?groupBy=reason")
        .insert_header(bearer(admin, Role::Admin))
        .to_request();
    let body = read_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["grouped"][0]["key"], json!("spam"));
    assert_eq!(body["data"]["grouped"][0]["count"], json!(2));

    // A window in the past sees nothing.
    let req = test::TestRequest::get()
        .uri("/api/v1/reports/admin/stats?dateFrom=2020-01-01&dateTo=2020-12-31")
        .insert_header(bearer(admin, Role::Admin))
        .to_request();
    let body = read_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["total"], json!(0));
}

#[actix_web::test]
#[serial]
async fn repeated_status_update_refreshes_the_review_trail() {
    let _guard = setup();
    let repo = Arc::new(InMemRepo::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let admin = repo.seed_user("Mona", "mona@example.com", Role::Admin);
    let second_admin = repo.seed_user("Nadia", "nadia@example.com", Role::Admin);
    let alice = repo.seed_user("Alice", "alice@example.com", Role::User);
    let bob = repo.seed_user("Bob", "bob@example.com", Role::User);
    let artwork = repo.seed_artwork(bob, "Quiet Harbor");

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(&repo, &notifier)))
            .configure(config),
    )
    .await;

    let id = file_report!(app, alice, "artwork", artwork, "other", "بلاغ يحتاج إلى مراجعة يدوية");

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/reports/admin/{id}/status"))
        .insert_header(bearer(admin, Role::Admin))
        .set_json(json!({ "status": "investigating", "adminNotes": "قيد الفحص" }))
        .to_request();
    let body = read_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["report"]["reviewedBy"]["id"], json!(admin));
    assert_eq!(body["data"]["report"]["adminNotes"], json!("قيد الفحص"));

    // Same status again by another admin: notes survive, the reviewer moves.
    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/reports/admin/{id}/status"))
        .insert_header(bearer(second_admin, Role::Admin))
        .set_json(json!({ "status": "investigating" }))
        .to_request();
    let body = read_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["report"]["status"], json!("investigating"));
    assert_eq!(body["data"]["report"]["reviewedBy"]["id"], json!(second_admin));
    assert_eq!(body["data"]["report"]["adminNotes"], json!("قيد الفحص"));

    // Every transition notifies the reporter, even a no-op one.
    drain_notifications().await;
    let to_alice: Vec<_> = notifier.sent().into_iter().filter(|(u, _)| *u == alice).collect();
    assert_eq!(to_alice.len(), 2);

    // Unknown report id.
    let req = test::TestRequest::patch()
        .uri("/api/v1/reports/admin/777777/status")
        .insert_header(bearer(admin, Role::Admin))
        .set_json(json!({ "status": "resolved" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
#[serial]
async fn bulk_update_counts_matches_and_notifies_reporters() {
    let _guard = setup();
    let repo = Arc::new(InMemRepo::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let admin = repo.seed_user("Mona", "mona@example.com", Role::Admin);
    let alice = repo.seed_user("Alice", "alice@example.com", Role::User);
    let carol = repo.seed_user("Carol", "carol@example.com", Role::User);
    let bob = repo.seed_user("Bob", "bob@example.com", Role::User);
    let artwork = repo.seed_artwork(bob, "Red Square");
    let image = repo.seed_image(bob, Some("Outtake"));

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(&repo, &notifier)))
            .configure(config),
    )
    .await;

    let r1 = file_report!(app, alice, "artwork", artwork, "spam", "بلاغ جماعي أول للمعالجة");
    let r2 = file_report!(app, carol, "image", image, "spam", "بلاغ جماعي ثان للمعالجة");
    drain_notifications().await;
    let already_sent = notifier.sent().len();

    // Numeric strings are accepted; an id that matches nothing just lowers
    // matchedCount.
    let req = test::TestRequest::patch()
        .uri("/api/v1/reports/admin/bulk-update")
        .insert_header(bearer(admin, Role::Admin))
        .set_json(json!({
            "reportIds": [r1, r2.to_string(), 987654],
            "status": "rejected",
            "adminNotes": "تمت المراجعة الجماعية",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body = read_json(resp).await;
    assert_eq!(body["data"]["matchedCount"], json!(2));
    assert_eq!(body["data"]["modifiedCount"], json!(2));

    // Both reporters hear about the transition, exactly once each.
    drain_notifications().await;
    let sent = notifier.sent();
    let new: Vec<_> = sent[already_sent..].to_vec();
    assert_eq!(new.len(), 2);
    let mut recipients: Vec<Id> = new.iter().map(|(u, _)| *u).collect();
    recipients.sort_unstable();
    assert_eq!(recipients, vec![alice, carol]);

    // The update really landed.
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/reports/{r1}"))
        .insert_header(bearer(admin, Role::Admin))
        .to_request();
    let body = read_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["report"]["status"], json!("rejected"));
    assert_eq!(body["data"]["report"]["adminNotes"], json!("تمت المراجعة الجماعية"));
}

#[actix_web::test]
#[serial]
async fn bulk_update_rejects_bad_input() {
    let _guard = setup();
    let repo = Arc::new(InMemRepo::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let admin = repo.seed_user("Mona", "mona@example.com", Role::Admin);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(&repo, &notifier)))
            .configure(config),
    )
    .await;

    // Malformed ids are named in the failure, nothing is written.
    let req = test::TestRequest::patch()
        .uri("/api/v1/reports/admin/bulk-update")
        .insert_header(bearer(admin, Role::Admin))
        .set_json(json!({
            "reportIds": [1, "xyz", -4],
            "status": "resolved",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body = read_json(resp).await;
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("xyz"));
    assert!(message.contains("-4"));

    // Empty list.
    let req = test::TestRequest::patch()
        .uri("/api/v1/reports/admin/bulk-update")
        .insert_header(bearer(admin, Role::Admin))
        .set_json(json!({ "reportIds": [], "status": "resolved" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body = read_json(resp).await;
    assert_eq!(body["message"], json!("قائمة التقارير فارغة"));

    // Well-formed ids that match nothing.
    let req = test::TestRequest::patch()
        .uri("/api/v1/reports/admin/bulk-update")
        .insert_header(bearer(admin, Role::Admin))
        .set_json(json!({ "reportIds": [111, 222], "status": "resolved" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    let body = read_json(resp).await;
    assert_eq!(body["message"], json!("لم يتم العثور على أي تقرير مطابق"));

    drain_notifications().await;
    assert!(notifier.sent().is_empty());
}

#[actix_web::test]
#[serial]
async fn content_scoped_listing_counts_reports_per_target() {
    let _guard = setup();
    let repo = Arc::new(InMemRepo::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let admin = repo.seed_user("Mona", "mona@example.com", Role::Admin);
    let alice = repo.seed_user("Alice", "alice@example.com", Role::User);
    let carol = repo.seed_user("Carol", "carol@example.com", Role::User);
    let bob = repo.seed_user("Bob", "bob@example.com", Role::User);
    let artwork = repo.seed_artwork(bob, "Winter Series");
    let other = repo.seed_artwork(bob, "Unrelated Piece");

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(&repo, &notifier)))
            .configure(config),
    )
    .await;

    file_report!(app, alice, "artwork", artwork, "offensive", "بلاغ أليس على سلسلة الشتاء");
    file_report!(app, carol, "artwork", artwork, "spam", "بلاغ كارول على سلسلة الشتاء");
    file_report!(app, alice, "artwork", other, "spam", "بلاغ على عمل آخر غير مرتبط");

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/reports/content/artwork/{artwork}"))
        .insert_header(bearer(admin, Role::Admin))
        .to_request();
    let body = read_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["reports"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["summary"]["contentType"], json!("artwork"));
    assert_eq!(body["data"]["summary"]["contentId"], json!(artwork));
    assert_eq!(body["data"]["summary"]["totalReports"], json!(2));

    // Unknown kind and malformed id.
    let req = test::TestRequest::get()
        .uri("/api/v1/reports/content/video/1")
        .insert_header(bearer(admin, Role::Admin))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body = read_json(resp).await;
    assert_eq!(body["message"], json!("نوع المحتوى غير صالح"));

    let req = test::TestRequest::get()
        .uri("/api/v1/reports/content/artwork/zero")
        .insert_header(bearer(admin, Role::Admin))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body = read_json(resp).await;
    assert_eq!(body["message"], json!("معرف المحتوى غير صالح"));
}

// ---------------- the admin guard itself ----------------

/// A store that aborts the test if any method is reached. Admin-only
/// handlers must reject non-admin callers before touching it.
struct UnreachableRepo;

#[async_trait]
impl ReportRepo for UnreachableRepo {
    async fn create_report(&self, _new: NewReportRow) -> RepoResult<Report> {
        unreachable!("guard must run before the store")
    }
    async fn get_report(&self, _id: Id) -> RepoResult<Report> {
        unreachable!("guard must run before the store")
    }
    async fn get_reports_by_ids(&self, _ids: &[Id]) -> RepoResult<Vec<Report>> {
        unreachable!("guard must run before the store")
    }
    async fn has_open_report(
        &self,
        _reporter_id: Id,
        _content_type: ContentType,
        _content_id: Id,
    ) -> RepoResult<bool> {
        unreachable!("guard must run before the store")
    }
    async fn list_reports(
        &self,
        _filter: &ReportFilter,
        _page: PageParams,
    ) -> RepoResult<(Vec<Report>, i64)> {
        unreachable!("guard must run before the store")
    }
    async fn all_reports(&self, _filter: &ReportFilter) -> RepoResult<Vec<Report>> {
        unreachable!("guard must run before the store")
    }
    async fn status_counts(
        &self,
        _reporter_id: Option<Id>,
    ) -> RepoResult<Vec<(ReportStatus, i64)>> {
        unreachable!("guard must run before the store")
    }
    async fn related_reports(
        &self,
        _content_type: ContentType,
        _content_id: Id,
        _exclude: Id,
        _limit: i64,
    ) -> RepoResult<Vec<Report>> {
        unreachable!("guard must run before the store")
    }
    async fn update_status(&self, _id: Id, _upd: StatusUpdate) -> RepoResult<Report> {
        unreachable!("guard must run before the store")
    }
    async fn bulk_update_status(
        &self,
        _ids: &[Id],
        _status: ReportStatus,
        _admin_notes: Option<String>,
        _reviewed_by: Id,
    ) -> RepoResult<BulkOutcome> {
        unreachable!("guard must run before the store")
    }
    async fn delete_pending_report(&self, _id: Id, _reporter_id: Id) -> RepoResult<()> {
        unreachable!("guard must run before the store")
    }
    async fn report_stats(
        &self,
        _date_from: Option<NaiveDate>,
        _date_to: Option<NaiveDate>,
        _group_by: StatsDimension,
        _top_n: i64,
    ) -> RepoResult<ReportStats> {
        unreachable!("guard must run before the store")
    }
}

#[async_trait]
impl ContentRepo for UnreachableRepo {
    async fn resolve_content(
        &self,
        _kind: ContentType,
        _id: Id,
    ) -> RepoResult<Option<ContentTarget>> {
        unreachable!("guard must run before the store")
    }
}

#[async_trait]
impl UserRepo for UnreachableRepo {
    async fn get_user_summary(&self, _id: Id) -> RepoResult<Option<UserSummary>> {
        unreachable!("guard must run before the store")
    }
    async fn get_user_summaries(&self, _ids: &[Id]) -> RepoResult<Vec<UserSummary>> {
        unreachable!("guard must run before the store")
    }
    async fn list_admin_ids(&self) -> RepoResult<Vec<Id>> {
        unreachable!("guard must run before the store")
    }
}

#[actix_web::test]
#[serial]
async fn non_admin_callers_never_reach_the_store() {
    let _guard = setup();
    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState {
        repo: Arc::new(UnreachableRepo),
        notifier: notifier.clone(),
        rate_limiter: RateLimiterFacade::new(
            InMemoryRateLimiter::new(false),
            RateLimitConfig {
                report_limit: 5,
                report_window: Duration::from_secs(3600),
            },
        ),
    };
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(config),
    )
    .await;

    let user = bearer(42, Role::User);

    let gets = [
        "/api/v1/reports/admin/all",
        "/api/v1/reports/admin/stats",
        "/api/v1/reports/admin/export",
        "/api/v1/reports/content/artwork/1",
    ];
    for uri in gets {
        let req = test::TestRequest::get()
            .uri(uri)
            .insert_header(user.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 403, "expected 403 for {uri}");
        let body = read_json(resp).await;
        assert_eq!(body["message"], json!("غير مصرح لك بتنفيذ هذا الإجراء"));
    }

    let req = test::TestRequest::patch()
        .uri("/api/v1/reports/admin/1/status")
        .insert_header(user.clone())
        .set_json(json!({ "status": "resolved" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::patch()
        .uri("/api/v1/reports/admin/bulk-update")
        .insert_header(user.clone())
        .set_json(json!({ "reportIds": [1], "status": "resolved" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
}
