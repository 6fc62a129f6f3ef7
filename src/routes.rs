use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::export;
use crate::models::*;
use crate::notify::{self, Notification, NotificationKind, Notifier};
use crate::rate_limit::RateLimiterFacade;
use crate::repo::{Repo, RepoError};

/// How many other reports against the same content an admin sees on the
/// detail view.
const RELATED_REPORTS_LIMIT: i64 = 5;
/// How many reasons the stats endpoint ranks.
const TOP_REASONS_LIMIT: i64 = 5;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            // Envelope-shaped 400s for malformed bodies and query strings.
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                ApiError::bad_request(format!("بيانات الطلب غير صالحة: {err}")).into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                ApiError::bad_request(format!("معاملات الطلب غير صالحة: {err}")).into()
            }))
            .service(web::resource("/reports").route(web::post().to(create_report)))
            .service(web::resource("/reports/my").route(web::get().to(my_reports)))
            // Fixed segments before the {reportId} catch-all.
            .service(web::resource("/reports/admin/all").route(web::get().to(admin_all_reports)))
            .service(web::resource("/reports/admin/stats").route(web::get().to(admin_report_stats)))
            .service(web::resource("/reports/admin/export").route(web::get().to(admin_export_reports)))
            .service(
                web::resource("/reports/admin/bulk-update")
                    .route(web::patch().to(admin_bulk_update)),
            )
            .service(
                web::resource("/reports/admin/{reportId}/status")
                    .route(web::patch().to(admin_update_status)),
            )
            .service(
                web::resource("/reports/content/{contentType}/{contentId}")
                    .route(web::get().to(admin_content_reports)),
            )
            .service(
                web::resource("/reports/{reportId}")
                    .route(web::get().to(get_report))
                    .route(web::delete().to(delete_report)),
            )
            .service(web::resource("/auth/me").route(web::get().to(auth_me))),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub notifier: Arc<dyn Notifier>,
    pub rate_limiter: RateLimiterFacade,
}

// ---------------- response envelope -----------------------

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    message: String,
    data: T,
}

fn ok_envelope<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope {
        success: true,
        message: message.to_string(),
        data,
    })
}

fn created_envelope<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Created().json(Envelope {
        success: true,
        message: message.to_string(),
        data,
    })
}

// ---------------- admin guard + id parsing -----------------

macro_rules! ensure_admin {
    ($auth:expr) => {
        if !$auth.is_admin() {
            return Err(ApiError::Forbidden);
        }
    };
}

fn parse_report_id(raw: &str) -> Result<Id, ApiError> {
    raw.parse::<Id>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request("معرف التقرير غير صالح"))
}

fn parse_id_value(v: &serde_json::Value) -> Option<Id> {
    match v {
        serde_json::Value::Number(n) => n.as_i64().filter(|id| *id > 0),
        serde_json::Value::String(s) => s.parse::<Id>().ok().filter(|id| *id > 0),
        _ => None,
    }
}

// ---------------- view population --------------------------

fn make_view(r: &Report, users: &HashMap<Id, UserSummary>) -> ReportView {
    ReportView {
        id: r.id,
        content_type: r.content_type,
        content_id: r.content_id,
        reason: r.reason,
        description: r.description.clone(),
        priority: r.priority,
        status: r.status,
        admin_notes: r.admin_notes.clone(),
        action_taken: r.action_taken.clone(),
        content_title: r.content_title.clone(),
        reporter: users.get(&r.reporter_id).cloned(),
        target_user: users.get(&r.target_user_id).cloned(),
        reviewed_by: r.reviewed_by.and_then(|id| users.get(&id).cloned()),
        created_at: r.created_at,
        updated_at: r.updated_at,
    }
}

/// Batch-resolve every party referenced by the given reports.
async fn party_map(
    repo: &dyn Repo,
    reports: &[Report],
) -> Result<HashMap<Id, UserSummary>, ApiError> {
    let mut ids: HashSet<Id> = HashSet::new();
    for r in reports {
        ids.insert(r.reporter_id);
        ids.insert(r.target_user_id);
        if let Some(rb) = r.reviewed_by {
            ids.insert(rb);
        }
    }
    let ids: Vec<Id> = ids.into_iter().collect();
    let summaries = repo.get_user_summaries(&ids).await?;
    Ok(summaries.into_iter().map(|u| (u.id, u)).collect())
}

async fn populate_one(repo: &dyn Repo, report: &Report) -> Result<ReportView, ApiError> {
    let users = party_map(repo, std::slice::from_ref(report)).await?;
    Ok(make_view(report, &users))
}

async fn populate_many(repo: &dyn Repo, reports: &[Report]) -> Result<Vec<ReportView>, ApiError> {
    let users = party_map(repo, reports).await?;
    Ok(reports.iter().map(|r| make_view(r, &users)).collect())
}

fn pagination_json(page: PageParams, total: i64) -> serde_json::Value {
    let total_pages = if total == 0 {
        0
    } else {
        (total + page.limit - 1) / page.limit
    };
    json!({
        "page": page.page,
        "limit": page.limit,
        "total": total,
        "totalPages": total_pages,
    })
}

// ---------------- reporter endpoints ------------------------

#[utoipa::path(
    post,
    path = "/api/v1/reports",
    request_body = NewReport,
    responses(
        (status = 201, description = "Report filed"),
        (status = 400, description = "Invalid input / self-report"),
        (status = 404, description = "Reported content missing"),
        (status = 409, description = "Open duplicate exists"),
        (status = 429, description = "Report rate limit hit")
    )
)]
pub async fn create_report(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewReport>,
) -> Result<HttpResponse, ApiError> {
    let reporter_id = auth.user_id();
    if !data.rate_limiter.allow_report(reporter_id) {
        return Err(ApiError::TooManyRequests);
    }

    let input = payload.into_inner();
    if input.content_id < 1 {
        return Err(ApiError::bad_request("معرف المحتوى غير صالح"));
    }
    let description = input.description.trim().to_string();
    let len = description.chars().count();
    if !(10..=500).contains(&len) {
        return Err(ApiError::bad_request(
            "يجب أن يكون وصف البلاغ بين 10 و500 حرف",
        ));
    }

    // Resolve the reported content to its owner. A backend failure here is
    // reported with a fixed message instead of the raw driver error.
    let target = data
        .repo
        .resolve_content(input.content_type, input.content_id)
        .await
        .map_err(|e| {
            log::error!("content lookup failed: {e}");
            ApiError::internal("حدث خطأ أثناء التحقق من المحتوى")
        })?
        .ok_or_else(|| ApiError::not_found("المحتوى المبلغ عنه غير موجود"))?;

    if target.owner_id == reporter_id {
        return Err(ApiError::bad_request("لا يمكنك الإبلاغ عن محتواك الخاص"));
    }

    // Friendly duplicate check; the store enforces the invariant too, so the
    // race between two concurrent creates still ends in a 409.
    if data
        .repo
        .has_open_report(reporter_id, input.content_type, input.content_id)
        .await?
    {
        return Err(ApiError::conflict(
            "لديك بلاغ قيد المراجعة على هذا المحتوى بالفعل",
        ));
    }

    let report = data
        .repo
        .create_report(NewReportRow {
            reporter_id,
            content_type: input.content_type,
            content_id: input.content_id,
            reason: input.reason,
            description,
            priority: input.priority,
            target_user_id: target.owner_id,
            content_title: target.title,
        })
        .await
        .map_err(|e| match e {
            RepoError::Conflict => {
                ApiError::conflict("لديك بلاغ قيد المراجعة على هذا المحتوى بالفعل")
            }
            other => other.into(),
        })?;

    metrics::counter!("artmod_reports_created_total", 1);

    // Tell the moderation team. Best effort: a failed lookup or delivery is
    // logged and the reporter still gets their 201.
    match data.repo.list_admin_ids().await {
        Ok(admin_ids) => {
            let recipients = admin_ids
                .into_iter()
                .map(|admin_id| {
                    (
                        admin_id,
                        Notification {
                            kind: NotificationKind::ReportCreated,
                            report_id: report.id,
                            message: format!("بلاغ جديد على {}", report.content_type.as_str()),
                        },
                    )
                })
                .collect();
            notify::dispatch_fan_out(data.notifier.clone(), recipients);
        }
        Err(e) => log::warn!("admin lookup for report notification failed: {e}"),
    }

    let view = populate_one(data.repo.as_ref(), &report).await?;
    Ok(created_envelope(
        "تم إرسال البلاغ بنجاح",
        json!({ "report": view }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/my",
    responses((status = 200, description = "Caller's reports plus status summary"))
)]
pub async fn my_reports(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<MyReportsQuery>,
) -> Result<HttpResponse, ApiError> {
    let q = query.into_inner();
    let page = PageParams::new(q.page, q.limit);
    let filter = ReportFilter {
        reporter_id: Some(auth.user_id()),
        status: q.status,
        search: q.search,
        ..Default::default()
    };
    let (reports, total) = data.repo.list_reports(&filter, page).await?;
    // Summary spans ALL of the caller's reports, independent of the filter.
    let counts = data.repo.status_counts(Some(auth.user_id())).await?;
    let stats = StatusSummary::from_counts(&counts);
    let views = populate_many(data.repo.as_ref(), &reports).await?;
    Ok(ok_envelope(
        "تم جلب بلاغاتك بنجاح",
        json!({
            "reports": views,
            "stats": stats,
            "pagination": pagination_json(page, total),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/{reportId}",
    params(("reportId" = String, Path, description = "Report id")),
    responses(
        (status = 200, description = "Report detail"),
        (status = 403, description = "Not the reporter and not an admin"),
        (status = 404, description = "No such report")
    )
)]
pub async fn get_report(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_report_id(&path.into_inner())?;
    let report = match data.repo.get_report(id).await {
        Ok(r) => r,
        Err(RepoError::NotFound) => return Err(ApiError::not_found("التقرير غير موجود")),
        Err(e) => return Err(e.into()),
    };
    if report.reporter_id != auth.user_id() && !auth.is_admin() {
        return Err(ApiError::Forbidden);
    }

    let view = populate_one(data.repo.as_ref(), &report).await?;
    let mut body = json!({ "report": view });
    if auth.is_admin() {
        // Other reports on the same content help triage decisions.
        let related = data
            .repo
            .related_reports(
                report.content_type,
                report.content_id,
                report.id,
                RELATED_REPORTS_LIMIT,
            )
            .await?;
        let related_views = populate_many(data.repo.as_ref(), &related).await?;
        body["relatedReports"] = serde_json::to_value(related_views).unwrap_or_default();
    }
    Ok(ok_envelope("تم جلب التقرير بنجاح", body))
}

#[utoipa::path(
    delete,
    path = "/api/v1/reports/{reportId}",
    params(("reportId" = String, Path, description = "Report id")),
    responses(
        (status = 200, description = "Report deleted"),
        (status = 404, description = "Missing, not owned, or no longer pending")
    )
)]
pub async fn delete_report(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_report_id(&path.into_inner())?;
    // One message for "missing" and "not deletable": other users' reports
    // stay invisible.
    match data.repo.delete_pending_report(id, auth.user_id()).await {
        Ok(()) => {
            metrics::counter!("artmod_reports_deleted_total", 1);
            Ok(ok_envelope("تم حذف البلاغ بنجاح", json!(null)))
        }
        Err(RepoError::NotFound) => Err(ApiError::not_found(
            "التقرير غير موجود أو لا يمكن حذفه",
        )),
        Err(e) => Err(e.into()),
    }
}

// ---------------- admin endpoints ---------------------------

#[utoipa::path(
    get,
    path = "/api/v1/reports/admin/all",
    responses(
        (status = 200, description = "Filtered report listing"),
        (status = 403, description = "Admins only")
    )
)]
pub async fn admin_all_reports(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<AdminReportsQuery>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth);
    let q = query.into_inner();
    let page = PageParams::new(q.page, q.limit);
    let filter = ReportFilter {
        status: q.status,
        content_type: q.content_type,
        reason: q.reason,
        priority: q.priority,
        date_from: q.date_from,
        date_to: q.date_to,
        search: q.search,
        ..Default::default()
    };
    let (reports, total) = data.repo.list_reports(&filter, page).await?;
    let views = populate_many(data.repo.as_ref(), &reports).await?;
    Ok(ok_envelope(
        "تم جلب التقارير بنجاح",
        json!({
            "reports": views,
            "pagination": pagination_json(page, total),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/admin/stats",
    responses(
        (status = 200, description = "Moderation statistics"),
        (status = 403, description = "Admins only")
    )
)]
pub async fn admin_report_stats(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<StatsQuery>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth);
    let q = query.into_inner();
    let stats = data
        .repo
        .report_stats(
            q.date_from,
            q.date_to,
            q.group_by.unwrap_or(StatsDimension::ContentType),
            TOP_REASONS_LIMIT,
        )
        .await?;
    Ok(ok_envelope("تم جلب الإحصائيات بنجاح", stats))
}

#[utoipa::path(
    patch,
    path = "/api/v1/reports/admin/{reportId}/status",
    request_body = StatusUpdateBody,
    params(("reportId" = String, Path, description = "Report id")),
    responses(
        (status = 200, description = "Status updated"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "No such report")
    )
)]
pub async fn admin_update_status(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<StatusUpdateBody>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth);
    let id = parse_report_id(&path.into_inner())?;
    let body = payload.into_inner();
    let updated = match data
        .repo
        .update_status(
            id,
            StatusUpdate {
                status: body.status,
                admin_notes: body.admin_notes,
                action_taken: body.action_taken,
                reviewed_by: auth.user_id(),
            },
        )
        .await
    {
        Ok(r) => r,
        Err(RepoError::NotFound) => return Err(ApiError::not_found("التقرير غير موجود")),
        Err(e) => return Err(e.into()),
    };

    metrics::counter!("artmod_report_status_updates_total", 1);
    notify::dispatch(
        data.notifier.clone(),
        updated.reporter_id,
        Notification {
            kind: NotificationKind::ReportStatusUpdated,
            report_id: updated.id,
            message: format!("تم تحديث حالة بلاغك إلى {}", updated.status.as_str()),
        },
    );

    let view = populate_one(data.repo.as_ref(), &updated).await?;
    Ok(ok_envelope(
        "تم تحديث حالة البلاغ بنجاح",
        json!({ "report": view }),
    ))
}

#[utoipa::path(
    patch,
    path = "/api/v1/reports/admin/bulk-update",
    request_body = BulkUpdateBody,
    responses(
        (status = 200, description = "Bulk transition applied"),
        (status = 400, description = "Malformed report ids"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "No report matched")
    )
)]
pub async fn admin_bulk_update(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<BulkUpdateBody>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth);
    let body = payload.into_inner();

    let mut ids: Vec<Id> = Vec::with_capacity(body.report_ids.len());
    let mut bad: Vec<String> = Vec::new();
    for raw in &body.report_ids {
        match parse_id_value(raw) {
            Some(id) => ids.push(id),
            None => bad.push(raw.to_string()),
        }
    }
    if !bad.is_empty() {
        return Err(ApiError::bad_request(format!(
            "معرفات تقارير غير صالحة: {}",
            bad.join(", ")
        )));
    }
    if ids.is_empty() {
        return Err(ApiError::bad_request("قائمة التقارير فارغة"));
    }

    // Snapshot reporters before the write so the fan-out targets exactly the
    // reports that matched.
    let affected = data.repo.get_reports_by_ids(&ids).await?;
    let outcome = data
        .repo
        .bulk_update_status(&ids, body.status, body.admin_notes, auth.user_id())
        .await?;
    if outcome.matched_count == 0 {
        return Err(ApiError::not_found("لم يتم العثور على أي تقرير مطابق"));
    }

    metrics::counter!(
        "artmod_report_status_updates_total",
        outcome.modified_count
    );
    let recipients = affected
        .iter()
        .map(|r| {
            (
                r.reporter_id,
                Notification {
                    kind: NotificationKind::ReportStatusUpdated,
                    report_id: r.id,
                    message: format!("تم تحديث حالة بلاغك إلى {}", body.status.as_str()),
                },
            )
        })
        .collect();
    notify::dispatch_fan_out(data.notifier.clone(), recipients);

    Ok(ok_envelope("تم تحديث التقارير بنجاح", outcome))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/content/{contentType}/{contentId}",
    params(
        ("contentType" = String, Path, description = "artwork|image|user|comment|message"),
        ("contentId" = String, Path, description = "Content id")
    ),
    responses(
        (status = 200, description = "Reports for one piece of content"),
        (status = 403, description = "Admins only")
    )
)]
pub async fn admin_content_reports(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth);
    let (kind_raw, id_raw) = path.into_inner();
    let kind = ContentType::parse(&kind_raw)
        .ok_or_else(|| ApiError::bad_request("نوع المحتوى غير صالح"))?;
    let content_id = id_raw
        .parse::<Id>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request("معرف المحتوى غير صالح"))?;

    let q = query.into_inner();
    let page = PageParams::new(q.page, q.limit);
    let filter = ReportFilter {
        content_type: Some(kind),
        content_id: Some(content_id),
        ..Default::default()
    };
    let (reports, total) = data.repo.list_reports(&filter, page).await?;
    let views = populate_many(data.repo.as_ref(), &reports).await?;
    Ok(ok_envelope(
        "تم جلب تقارير المحتوى بنجاح",
        json!({
            "reports": views,
            "summary": {
                "contentType": kind,
                "contentId": content_id,
                "totalReports": total,
            },
            "pagination": pagination_json(page, total),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/admin/export",
    responses(
        (status = 200, description = "CSV or JSON export of matching reports"),
        (status = 400, description = "Unsupported format"),
        (status = 403, description = "Admins only")
    )
)]
pub async fn admin_export_reports(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<ExportQuery>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth);
    let q = query.into_inner();
    let format = q.format.as_deref().unwrap_or("json");
    if format != "csv" && format != "json" {
        return Err(ApiError::bad_request("تنسيق التصدير غير مدعوم حالياً"));
    }

    let filter = ReportFilter {
        status: q.status,
        content_type: q.content_type,
        reason: q.reason,
        priority: q.priority,
        date_from: q.date_from,
        date_to: q.date_to,
        search: q.search,
        ..Default::default()
    };
    // Unpaginated by design; acceptable at current volumes.
    let reports = data.repo.all_reports(&filter).await?;
    let users = party_map(data.repo.as_ref(), &reports).await?;
    let rows = export::flatten_reports(&reports, &users);
    metrics::counter!("artmod_reports_exported_total", rows.len() as u64);

    if format == "json" {
        // The flattened array is the body; the envelope is suspended here.
        return Ok(HttpResponse::Ok().json(rows));
    }

    let bytes = export::to_csv(&rows).map_err(|e| {
        log::error!("csv serialization failed: {e}");
        ApiError::internal("حدث خطأ أثناء تجهيز ملف التصدير")
    })?;
    Ok(HttpResponse::Ok()
        .insert_header(("Content-Type", "text/csv; charset=utf-8"))
        .insert_header((
            "Content-Disposition",
            format!(
                "attachment; filename=\"{}\"",
                export::export_filename(Utc::now())
            ),
        ))
        .body(bytes))
}

// ---------------- token introspection -----------------------

#[derive(Serialize, utoipa::ToSchema)]
struct MeResponse {
    id: Id,
    role: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current caller"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn auth_me(auth: Auth) -> Result<HttpResponse, ApiError> {
    let me = MeResponse {
        id: auth.user_id(),
        role: auth.0.role.as_str().to_string(),
    };
    Ok(ok_envelope("تم جلب بيانات المستخدم", me))
}
