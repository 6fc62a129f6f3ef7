use crate::models::{
    AdminReportsQuery, BulkOutcome, BulkUpdateBody, ContentType, ExportQuery, MyReportsQuery,
    NewReport, Report, ReportPriority, ReportReason, ReportStats, ReportStatus, ReportView,
    StatsQuery, StatusSummary, StatusUpdateBody, UserSummary,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::create_report,
        crate::routes::my_reports,
        crate::routes::get_report,
        crate::routes::delete_report,
        crate::routes::admin_all_reports,
        crate::routes::admin_report_stats,
        crate::routes::admin_update_status,
        crate::routes::admin_bulk_update,
        crate::routes::admin_content_reports,
        crate::routes::admin_export_reports,
        crate::routes::auth_me,
    ),
    components(schemas(
        Report, ReportView, UserSummary, NewReport, StatusUpdateBody, BulkUpdateBody,
        BulkOutcome, ReportStats, StatusSummary,
        ContentType, ReportReason, ReportPriority, ReportStatus,
        MyReportsQuery, AdminReportsQuery, StatsQuery, ExportQuery
    )),
    tags(
        (name = "reports", description = "Report lifecycle operations"),
        (name = "moderation", description = "Admin moderation operations"),
    )
)]
pub struct ApiDoc;
