use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Always i64 ids now (Postgres bigserial / inmem counter)
pub type Id = i64;

/// Kind of entity a report points at. Closed enum so content dispatch is
/// exhaustive at compile time instead of branching on strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "postgres-store", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres-store",
    sqlx(type_name = "content_type", rename_all = "lowercase")
)]
pub enum ContentType {
    Artwork,
    Image,
    User,
    Comment,
    Message,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Artwork => "artwork",
            ContentType::Image => "image",
            ContentType::User => "user",
            ContentType::Comment => "comment",
            ContentType::Message => "message",
        }
    }

    /// Parse a path segment. Lowercase only, mirroring the JSON wire form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "artwork" => Some(ContentType::Artwork),
            "image" => Some(ContentType::Image),
            "user" => Some(ContentType::User),
            "comment" => Some(ContentType::Comment),
            "message" => Some(ContentType::Message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "postgres-store", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres-store",
    sqlx(type_name = "report_reason", rename_all = "lowercase")
)]
pub enum ReportReason {
    Inappropriate,
    Copyright,
    Spam,
    Offensive,
    Harassment,
    Other,
}

impl ReportReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportReason::Inappropriate => "inappropriate",
            ReportReason::Copyright => "copyright",
            ReportReason::Spam => "spam",
            ReportReason::Offensive => "offensive",
            ReportReason::Harassment => "harassment",
            ReportReason::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "postgres-store", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres-store",
    sqlx(type_name = "report_priority", rename_all = "lowercase")
)]
pub enum ReportPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl ReportPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportPriority::Low => "low",
            ReportPriority::Medium => "medium",
            ReportPriority::High => "high",
        }
    }
}

/// Full five-value status vocabulary; the single-update and bulk-update
/// paths both validate against the same enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "postgres-store", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres-store",
    sqlx(type_name = "report_status", rename_all = "lowercase")
)]
pub enum ReportStatus {
    Pending,
    Investigating,
    Resolved,
    Rejected,
    Escalated,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Investigating => "investigating",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Rejected => "rejected",
            ReportStatus::Escalated => "escalated",
        }
    }

    /// Reporter-initiated deletion is only allowed while pending; the
    /// duplicate check treats the non-terminal statuses as "open".
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReportStatus::Resolved | ReportStatus::Rejected | ReportStatus::Escalated
        )
    }

    pub const ALL: [ReportStatus; 5] = [
        ReportStatus::Pending,
        ReportStatus::Investigating,
        ReportStatus::Resolved,
        ReportStatus::Rejected,
        ReportStatus::Escalated,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Report {
    pub id: Id,
    pub reporter_id: Id,
    pub content_type: ContentType,
    pub content_id: Id,
    pub reason: ReportReason,
    pub description: String,
    pub priority: ReportPriority,
    pub status: ReportStatus,
    pub admin_notes: Option<String>,
    pub action_taken: Option<String>,
    pub reviewed_by: Option<Id>,
    pub content_title: Option<String>, // denormalized snapshot, searched without a join
    pub target_user_id: Id,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Minimal user projection used when populating report views.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct UserSummary {
    pub id: Id,
    pub display_name: String,
    pub email: String,
}

/// A report with its parties resolved, as returned to API clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub id: Id,
    pub content_type: ContentType,
    pub content_id: Id,
    pub reason: ReportReason,
    pub description: String,
    pub priority: ReportPriority,
    pub status: ReportStatus,
    pub admin_notes: Option<String>,
    pub action_taken: Option<String>,
    pub content_title: Option<String>,
    pub reporter: Option<UserSummary>,
    pub target_user: Option<UserSummary>,
    pub reviewed_by: Option<UserSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------- request bodies ----------------

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    pub content_type: ContentType,
    pub content_id: Id,
    pub reason: ReportReason,
    pub description: String,
    #[serde(default)]
    pub priority: ReportPriority,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateBody {
    pub status: ReportStatus,
    pub admin_notes: Option<String>,
    pub action_taken: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdateBody {
    /// Ids accepted as JSON numbers or numeric strings; every entry is
    /// validated and the whole call is rejected naming the bad ones.
    #[schema(value_type = Vec<String>)]
    pub report_ids: Vec<serde_json::Value>,
    pub status: ReportStatus,
    pub admin_notes: Option<String>,
}

// ---------------- query strings ----------------

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MyReportsQuery {
    pub status: Option<ReportStatus>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminReportsQuery {
    pub status: Option<ReportStatus>,
    pub content_type: Option<ContentType>,
    pub reason: Option<ReportReason>,
    pub priority: Option<ReportPriority>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum StatsDimension {
    ContentType,
    Reason,
    Priority,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub group_by: Option<StatsDimension>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportQuery {
    pub status: Option<ReportStatus>,
    pub content_type: Option<ContentType>,
    pub reason: Option<ReportReason>,
    pub priority: Option<ReportPriority>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub search: Option<String>,
    /// "csv" or "json"; validated in the handler so the failure message
    /// matches the rest of the API.
    pub format: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// ---------------- repo-facing values ----------------

/// Filter assembly shared by listing, content-scoped listing and export.
/// Present fields are ANDed; `search` is a case-insensitive substring
/// match over the description OR the denormalized content title.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub reporter_id: Option<Id>,
    pub status: Option<ReportStatus>,
    pub content_type: Option<ContentType>,
    pub content_id: Option<Id>,
    pub reason: Option<ReportReason>,
    pub priority: Option<ReportPriority>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub search: Option<String>,
}

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy)]
pub struct PageParams {
    pub page: i64,
    pub limit: i64,
}

impl PageParams {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

#[derive(Debug, Clone)]
pub struct NewReportRow {
    pub reporter_id: Id,
    pub content_type: ContentType,
    pub content_id: Id,
    pub reason: ReportReason,
    pub description: String,
    pub priority: ReportPriority,
    pub target_user_id: Id,
    pub content_title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: ReportStatus,
    pub admin_notes: Option<String>,
    pub action_taken: Option<String>,
    pub reviewed_by: Id,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Resolved target of a report: who owns the content, plus a title
/// snapshot taken at creation time.
#[derive(Debug, Clone)]
pub struct ContentTarget {
    pub owner_id: Id,
    pub title: Option<String>,
}

// ---------------- marketplace entities ----------------
// Just enough of each reportable entity to resolve its owner and take a
// title snapshot. The full records belong to the marketplace service.

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserRecord {
    pub id: Id,
    pub display_name: String,
    pub email: String,
    pub role: crate::auth::Role,
}

impl UserRecord {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            display_name: self.display_name.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Artwork {
    pub id: Id,
    pub artist_id: Id,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImagePost {
    pub id: Id,
    pub owner_id: Id,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Comment {
    pub id: Id,
    pub author_id: Id,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DirectMessage {
    pub id: Id,
    pub sender_id: Id,
    pub body: String,
}

/// Title snapshot for text content: the leading slice of the body.
pub fn excerpt(body: &str) -> String {
    body.chars().take(60).collect()
}

// ---------------- statistics ----------------

#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema)]
pub struct StatusSummary {
    pub pending: i64,
    pub investigating: i64,
    pub resolved: i64,
    pub rejected: i64,
    pub escalated: i64,
}

impl StatusSummary {
    pub fn from_counts(counts: &[(ReportStatus, i64)]) -> Self {
        let mut s = StatusSummary::default();
        for (status, n) in counts {
            match status {
                ReportStatus::Pending => s.pending = *n,
                ReportStatus::Investigating => s.investigating = *n,
                ReportStatus::Resolved => s.resolved = *n,
                ReportStatus::Rejected => s.rejected = *n,
                ReportStatus::Escalated => s.escalated = *n,
            }
        }
        s
    }

    pub fn total(&self) -> i64 {
        self.pending + self.investigating + self.resolved + self.rejected + self.escalated
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DimensionCount {
    pub key: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReasonCount {
    pub reason: ReportReason,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DayCount {
    pub day: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportStats {
    pub total: i64,
    pub by_status: StatusSummary,
    pub grouped: Vec<DimensionCount>,
    pub top_reasons: Vec<ReasonCount>,
    pub daily: Vec<DayCount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_params_clamp() {
        let p = PageParams::new(None, None);
        assert_eq!((p.page, p.limit), (1, DEFAULT_PAGE_SIZE));
        let p = PageParams::new(Some(0), Some(1000));
        assert_eq!((p.page, p.limit), (1, MAX_PAGE_SIZE));
        let p = PageParams::new(Some(3), Some(10));
        assert_eq!(p.offset(), 20);
    }

    #[test]
    fn status_terminality() {
        assert!(!ReportStatus::Pending.is_terminal());
        assert!(!ReportStatus::Investigating.is_terminal());
        assert!(ReportStatus::Resolved.is_terminal());
        assert!(ReportStatus::Rejected.is_terminal());
        assert!(ReportStatus::Escalated.is_terminal());
    }

    #[test]
    fn status_summary_from_counts() {
        let s = StatusSummary::from_counts(&[
            (ReportStatus::Pending, 4),
            (ReportStatus::Resolved, 2),
        ]);
        assert_eq!(s.pending, 4);
        assert_eq!(s.resolved, 2);
        assert_eq!(s.total(), 6);
    }

    #[test]
    fn content_type_parse_roundtrip() {
        for s in ["artwork", "image", "user", "comment", "message"] {
            assert_eq!(ContentType::parse(s).unwrap().as_str(), s);
        }
        assert!(ContentType::parse("Artwork").is_none());
        assert!(ContentType::parse("video").is_none());
    }
}
