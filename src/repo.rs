use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("internal: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;
use chrono::NaiveDate;

#[async_trait]
pub trait ReportRepo: Send + Sync {
    async fn create_report(&self, new: NewReportRow) -> RepoResult<Report>;
    async fn get_report(&self, id: Id) -> RepoResult<Report>;
    async fn get_reports_by_ids(&self, ids: &[Id]) -> RepoResult<Vec<Report>>;
    /// True when the reporter already has an open (non-terminal) report
    /// against the same content.
    async fn has_open_report(
        &self,
        reporter_id: Id,
        content_type: ContentType,
        content_id: Id,
    ) -> RepoResult<bool>;
    /// Filtered page of reports, newest first, plus the total match count.
    async fn list_reports(
        &self,
        filter: &ReportFilter,
        page: PageParams,
    ) -> RepoResult<(Vec<Report>, i64)>;
    /// Every matching report, unpaginated. Export only.
    async fn all_reports(&self, filter: &ReportFilter) -> RepoResult<Vec<Report>>;
    /// Count per status, optionally scoped to one reporter. Statuses with
    /// zero reports are omitted.
    async fn status_counts(&self, reporter_id: Option<Id>) -> RepoResult<Vec<(ReportStatus, i64)>>;
    /// Most recent other reports against the same content, for triage.
    async fn related_reports(
        &self,
        content_type: ContentType,
        content_id: Id,
        exclude: Id,
        limit: i64,
    ) -> RepoResult<Vec<Report>>;
    async fn update_status(&self, id: Id, upd: StatusUpdate) -> RepoResult<Report>;
    async fn bulk_update_status(
        &self,
        ids: &[Id],
        status: ReportStatus,
        admin_notes: Option<String>,
        reviewed_by: Id,
    ) -> RepoResult<BulkOutcome>;
    /// Hard delete, only when the report belongs to the reporter and is
    /// still pending. Anything else is NotFound so that existence of other
    /// users' reports is not leaked.
    async fn delete_pending_report(&self, id: Id, reporter_id: Id) -> RepoResult<()>;
    async fn report_stats(
        &self,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
        group_by: StatsDimension,
        top_n: i64,
    ) -> RepoResult<ReportStats>;
}

#[async_trait]
pub trait ContentRepo: Send + Sync {
    /// Resolve reported content to its owner plus a title snapshot.
    /// `Ok(None)` means the content does not exist; `Err(Internal)` means
    /// the lookup itself failed.
    async fn resolve_content(&self, kind: ContentType, id: Id)
        -> RepoResult<Option<ContentTarget>>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user_summary(&self, id: Id) -> RepoResult<Option<UserSummary>>;
    async fn get_user_summaries(&self, ids: &[Id]) -> RepoResult<Vec<UserSummary>>;
    async fn list_admin_ids(&self) -> RepoResult<Vec<Id>>;
}

pub trait Repo: ReportRepo + ContentRepo + UserRepo {}

impl<T> Repo for T where T: ReportRepo + ContentRepo + UserRepo {}

/// Shared predicate for the inmem backend; the pg backend renders the same
/// conjunction as SQL.
pub(crate) fn filter_matches(f: &ReportFilter, r: &Report) -> bool {
    if let Some(v) = f.reporter_id {
        if r.reporter_id != v {
            return false;
        }
    }
    if let Some(v) = f.status {
        if r.status != v {
            return false;
        }
    }
    if let Some(v) = f.content_type {
        if r.content_type != v {
            return false;
        }
    }
    if let Some(v) = f.content_id {
        if r.content_id != v {
            return false;
        }
    }
    if let Some(v) = f.reason {
        if r.reason != v {
            return false;
        }
    }
    if let Some(v) = f.priority {
        if r.priority != v {
            return false;
        }
    }
    if let Some(from) = f.date_from {
        if r.created_at.date_naive() < from {
            return false;
        }
    }
    if let Some(to) = f.date_to {
        if r.created_at.date_naive() > to {
            return false;
        }
    }
    if let Some(ref needle) = f.search {
        let needle = needle.to_lowercase();
        let in_description = r.description.to_lowercase().contains(&needle);
        let in_title = r
            .content_title
            .as_deref()
            .map(|t| t.to_lowercase().contains(&needle))
            .unwrap_or(false);
        if !(in_description || in_title) {
            return false;
        }
    }
    true
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use crate::auth::Role as AuthRole;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, UserRecord>,
        artworks: HashMap<Id, Artwork>,
        images: HashMap<Id, ImagePost>,
        comments: HashMap<Id, Comment>,
        messages: HashMap<Id, DirectMessage>,
        reports: HashMap<Id, Report>,
        next_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn data_dir() -> PathBuf {
            std::env::var("ARTMOD_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data"))
        }

        fn snapshot_path() -> PathBuf {
            if std::env::var("ARTMOD_DATA_DIR").is_ok() {
                let mut p = Self::data_dir();
                p.push("state.json");
                p
            } else {
                PathBuf::from(SNAPSHOT_PATH)
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("[inmem] loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!(
                            "[inmem] failed to parse snapshot '{}': {e}. Starting empty.",
                            path.display()
                        );
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    log::warn!("[inmem] failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }

        // ---- seed helpers (local dev + tests) ----

        pub fn seed_user(&self, display_name: &str, email: &str, role: AuthRole) -> Id {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            s.users.insert(
                id,
                UserRecord {
                    id,
                    display_name: display_name.to_string(),
                    email: email.to_string(),
                    role,
                },
            );
            id
        }

        pub fn seed_artwork(&self, artist_id: Id, title: &str) -> Id {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            s.artworks.insert(
                id,
                Artwork {
                    id,
                    artist_id,
                    title: title.to_string(),
                },
            );
            id
        }

        pub fn seed_image(&self, owner_id: Id, title: Option<&str>) -> Id {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            s.images.insert(
                id,
                ImagePost {
                    id,
                    owner_id,
                    title: title.map(|t| t.to_string()),
                },
            );
            id
        }

        pub fn seed_comment(&self, author_id: Id, body: &str) -> Id {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            s.comments.insert(
                id,
                Comment {
                    id,
                    author_id,
                    body: body.to_string(),
                },
            );
            id
        }

        pub fn seed_message(&self, sender_id: Id, body: &str) -> Id {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            s.messages.insert(
                id,
                DirectMessage {
                    id,
                    sender_id,
                    body: body.to_string(),
                },
            );
            id
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    fn sorted_newest_first(mut v: Vec<Report>) -> Vec<Report> {
        v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        v
    }

    #[async_trait]
    impl ReportRepo for InMemRepo {
        async fn create_report(&self, new: NewReportRow) -> RepoResult<Report> {
            let report = {
                let mut s = self.state.write().unwrap();
                // Open-duplicate invariant enforced under the write lock, the
                // same tuple the pg backend guards with a partial unique index.
                let duplicate = s.reports.values().any(|r| {
                    r.reporter_id == new.reporter_id
                        && r.content_type == new.content_type
                        && r.content_id == new.content_id
                        && !r.status.is_terminal()
                });
                if duplicate {
                    return Err(RepoError::Conflict);
                }
                let now = Utc::now();
                let id = Self::next_id(&mut s);
                let report = Report {
                    id,
                    reporter_id: new.reporter_id,
                    content_type: new.content_type,
                    content_id: new.content_id,
                    reason: new.reason,
                    description: new.description,
                    priority: new.priority,
                    status: ReportStatus::Pending,
                    admin_notes: None,
                    action_taken: None,
                    reviewed_by: None,
                    content_title: new.content_title,
                    target_user_id: new.target_user_id,
                    created_at: now,
                    updated_at: now,
                };
                s.reports.insert(id, report.clone());
                report
            };
            self.persist();
            Ok(report)
        }

        async fn get_report(&self, id: Id) -> RepoResult<Report> {
            let s = self.state.read().unwrap();
            s.reports.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_reports_by_ids(&self, ids: &[Id]) -> RepoResult<Vec<Report>> {
            let s = self.state.read().unwrap();
            Ok(ids
                .iter()
                .filter_map(|id| s.reports.get(id).cloned())
                .collect())
        }

        async fn has_open_report(
            &self,
            reporter_id: Id,
            content_type: ContentType,
            content_id: Id,
        ) -> RepoResult<bool> {
            let s = self.state.read().unwrap();
            Ok(s.reports.values().any(|r| {
                r.reporter_id == reporter_id
                    && r.content_type == content_type
                    && r.content_id == content_id
                    && !r.status.is_terminal()
            }))
        }

        async fn list_reports(
            &self,
            filter: &ReportFilter,
            page: PageParams,
        ) -> RepoResult<(Vec<Report>, i64)> {
            let s = self.state.read().unwrap();
            let matched: Vec<Report> = s
                .reports
                .values()
                .filter(|r| filter_matches(filter, r))
                .cloned()
                .collect();
            let total = matched.len() as i64;
            let sorted = sorted_newest_first(matched);
            let rows = sorted
                .into_iter()
                .skip(page.offset() as usize)
                .take(page.limit as usize)
                .collect();
            Ok((rows, total))
        }

        async fn all_reports(&self, filter: &ReportFilter) -> RepoResult<Vec<Report>> {
            let s = self.state.read().unwrap();
            let matched: Vec<Report> = s
                .reports
                .values()
                .filter(|r| filter_matches(filter, r))
                .cloned()
                .collect();
            Ok(sorted_newest_first(matched))
        }

        async fn status_counts(
            &self,
            reporter_id: Option<Id>,
        ) -> RepoResult<Vec<(ReportStatus, i64)>> {
            let s = self.state.read().unwrap();
            let mut counts: HashMap<ReportStatus, i64> = HashMap::new();
            for r in s.reports.values() {
                if let Some(owner) = reporter_id {
                    if r.reporter_id != owner {
                        continue;
                    }
                }
                *counts.entry(r.status).or_insert(0) += 1;
            }
            Ok(counts.into_iter().collect())
        }

        async fn related_reports(
            &self,
            content_type: ContentType,
            content_id: Id,
            exclude: Id,
            limit: i64,
        ) -> RepoResult<Vec<Report>> {
            let s = self.state.read().unwrap();
            let matched: Vec<Report> = s
                .reports
                .values()
                .filter(|r| {
                    r.content_type == content_type && r.content_id == content_id && r.id != exclude
                })
                .cloned()
                .collect();
            Ok(sorted_newest_first(matched)
                .into_iter()
                .take(limit as usize)
                .collect())
        }

        async fn update_status(&self, id: Id, upd: StatusUpdate) -> RepoResult<Report> {
            let updated = {
                let mut s = self.state.write().unwrap();
                let report = s.reports.get_mut(&id).ok_or(RepoError::NotFound)?;
                report.status = upd.status;
                if upd.admin_notes.is_some() {
                    report.admin_notes = upd.admin_notes;
                }
                if upd.action_taken.is_some() {
                    report.action_taken = upd.action_taken;
                }
                report.reviewed_by = Some(upd.reviewed_by);
                report.updated_at = Utc::now();
                report.clone()
            };
            self.persist();
            Ok(updated)
        }

        async fn bulk_update_status(
            &self,
            ids: &[Id],
            status: ReportStatus,
            admin_notes: Option<String>,
            reviewed_by: Id,
        ) -> RepoResult<BulkOutcome> {
            let outcome = {
                let mut s = self.state.write().unwrap();
                let mut matched = 0u64;
                let mut modified = 0u64;
                for id in ids {
                    let Some(report) = s.reports.get_mut(id) else {
                        continue;
                    };
                    matched += 1;
                    let changed = report.status != status
                        || (admin_notes.is_some() && report.admin_notes != admin_notes)
                        || report.reviewed_by != Some(reviewed_by);
                    report.status = status;
                    if admin_notes.is_some() {
                        report.admin_notes = admin_notes.clone();
                    }
                    report.reviewed_by = Some(reviewed_by);
                    report.updated_at = Utc::now();
                    if changed {
                        modified += 1;
                    }
                }
                BulkOutcome {
                    matched_count: matched,
                    modified_count: modified,
                }
            };
            self.persist();
            Ok(outcome)
        }

        async fn delete_pending_report(&self, id: Id, reporter_id: Id) -> RepoResult<()> {
            {
                let mut s = self.state.write().unwrap();
                let deletable = s
                    .reports
                    .get(&id)
                    .map(|r| r.reporter_id == reporter_id && r.status == ReportStatus::Pending)
                    .unwrap_or(false);
                if !deletable {
                    return Err(RepoError::NotFound);
                }
                s.reports.remove(&id);
            }
            self.persist();
            Ok(())
        }

        async fn report_stats(
            &self,
            date_from: Option<NaiveDate>,
            date_to: Option<NaiveDate>,
            group_by: StatsDimension,
            top_n: i64,
        ) -> RepoResult<ReportStats> {
            let s = self.state.read().unwrap();
            let range = ReportFilter {
                date_from,
                date_to,
                ..Default::default()
            };
            let in_range: Vec<&Report> = s
                .reports
                .values()
                .filter(|r| filter_matches(&range, r))
                .collect();

            let mut by_status: HashMap<ReportStatus, i64> = HashMap::new();
            let mut grouped: HashMap<String, i64> = HashMap::new();
            let mut reasons: HashMap<ReportReason, i64> = HashMap::new();
            let mut daily: std::collections::BTreeMap<NaiveDate, i64> =
                std::collections::BTreeMap::new();
            for r in &in_range {
                *by_status.entry(r.status).or_insert(0) += 1;
                let key = match group_by {
                    StatsDimension::ContentType => r.content_type.as_str(),
                    StatsDimension::Reason => r.reason.as_str(),
                    StatsDimension::Priority => r.priority.as_str(),
                };
                *grouped.entry(key.to_string()).or_insert(0) += 1;
                *reasons.entry(r.reason).or_insert(0) += 1;
                *daily.entry(r.created_at.date_naive()).or_insert(0) += 1;
            }

            let status_counts: Vec<(ReportStatus, i64)> = by_status.into_iter().collect();
            let mut grouped: Vec<DimensionCount> = grouped
                .into_iter()
                .map(|(key, count)| DimensionCount { key, count })
                .collect();
            grouped.sort_by(|a, b| b.count.cmp(&a.count).then(a.key.cmp(&b.key)));
            let mut top_reasons: Vec<ReasonCount> = reasons
                .into_iter()
                .map(|(reason, count)| ReasonCount { reason, count })
                .collect();
            top_reasons.sort_by(|a, b| {
                b.count
                    .cmp(&a.count)
                    .then(a.reason.as_str().cmp(b.reason.as_str()))
            });
            top_reasons.truncate(top_n as usize);

            Ok(ReportStats {
                total: in_range.len() as i64,
                by_status: StatusSummary::from_counts(&status_counts),
                grouped,
                top_reasons,
                daily: daily
                    .into_iter()
                    .map(|(day, count)| DayCount { day, count })
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl ContentRepo for InMemRepo {
        async fn resolve_content(
            &self,
            kind: ContentType,
            id: Id,
        ) -> RepoResult<Option<ContentTarget>> {
            let s = self.state.read().unwrap();
            let target = match kind {
                ContentType::Artwork => s.artworks.get(&id).map(|a| ContentTarget {
                    owner_id: a.artist_id,
                    title: Some(a.title.clone()),
                }),
                ContentType::Image => s.images.get(&id).map(|i| ContentTarget {
                    owner_id: i.owner_id,
                    title: i.title.clone(),
                }),
                ContentType::User => s.users.get(&id).map(|u| ContentTarget {
                    owner_id: u.id,
                    title: Some(u.display_name.clone()),
                }),
                ContentType::Comment => s.comments.get(&id).map(|c| ContentTarget {
                    owner_id: c.author_id,
                    title: Some(excerpt(&c.body)),
                }),
                ContentType::Message => s.messages.get(&id).map(|m| ContentTarget {
                    owner_id: m.sender_id,
                    title: Some(excerpt(&m.body)),
                }),
            };
            Ok(target)
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn get_user_summary(&self, id: Id) -> RepoResult<Option<UserSummary>> {
            let s = self.state.read().unwrap();
            Ok(s.users.get(&id).map(|u| u.summary()))
        }

        async fn get_user_summaries(&self, ids: &[Id]) -> RepoResult<Vec<UserSummary>> {
            let s = self.state.read().unwrap();
            Ok(ids
                .iter()
                .filter_map(|id| s.users.get(id).map(|u| u.summary()))
                .collect())
        }

        async fn list_admin_ids(&self) -> RepoResult<Vec<Id>> {
            let s = self.state.read().unwrap();
            let mut ids: Vec<Id> = s
                .users
                .values()
                .filter(|u| u.role == AuthRole::Admin)
                .map(|u| u.id)
                .collect();
            ids.sort_unstable();
            Ok(ids)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres, QueryBuilder};

    const REPORT_COLUMNS: &str = "id, reporter_id, content_type, content_id, reason, description, \
         priority, status, admin_notes, action_taken, reviewed_by, content_title, \
         target_user_id, created_at, updated_at";

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }
    }

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.to_string())
    }

    fn escape_like(s: &str) -> String {
        s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
    }

    /// Render the shared filter as a WHERE conjunction. Matches
    /// `filter_matches` exactly; the inclusive date range is expressed as
    /// `[from 00:00, to+1d 00:00)`.
    fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, f: &ReportFilter) {
        qb.push(" WHERE 1=1");
        if let Some(v) = f.reporter_id {
            qb.push(" AND reporter_id = ").push_bind(v);
        }
        if let Some(v) = f.status {
            qb.push(" AND status = ").push_bind(v);
        }
        if let Some(v) = f.content_type {
            qb.push(" AND content_type = ").push_bind(v);
        }
        if let Some(v) = f.content_id {
            qb.push(" AND content_id = ").push_bind(v);
        }
        if let Some(v) = f.reason {
            qb.push(" AND reason = ").push_bind(v);
        }
        if let Some(v) = f.priority {
            qb.push(" AND priority = ").push_bind(v);
        }
        if let Some(d) = f.date_from {
            let from = d.and_hms_opt(0, 0, 0).unwrap().and_utc();
            qb.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(d) = f.date_to {
            let to = (d + chrono::Duration::days(1))
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc();
            qb.push(" AND created_at < ").push_bind(to);
        }
        if let Some(ref s) = f.search {
            let pattern = format!("%{}%", escape_like(s));
            qb.push(" AND (description ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR content_title ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    #[async_trait]
    impl ReportRepo for PgRepo {
        async fn create_report(&self, new: NewReportRow) -> RepoResult<Report> {
            let sql = format!(
                "INSERT INTO reports (reporter_id, content_type, content_id, reason, description, \
                 priority, status, target_user_id, content_title) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9) RETURNING {REPORT_COLUMNS}"
            );
            sqlx::query_as::<_, Report>(&sql)
                .bind(new.reporter_id)
                .bind(new.content_type)
                .bind(new.content_id)
                .bind(new.reason)
                .bind(&new.description)
                .bind(new.priority)
                .bind(ReportStatus::Pending)
                .bind(new.target_user_id)
                .bind(&new.content_title)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| match &e {
                    // The partial unique index over open reports turns the
                    // duplicate race into a hard guarantee.
                    sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict,
                    _ => internal(e),
                })
        }

        async fn get_report(&self, id: Id) -> RepoResult<Report> {
            let sql = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1");
            sqlx::query_as::<_, Report>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn get_reports_by_ids(&self, ids: &[Id]) -> RepoResult<Vec<Report>> {
            let sql = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ANY($1)");
            sqlx::query_as::<_, Report>(&sql)
                .bind(ids)
                .fetch_all(&self.pool)
                .await
                .map_err(internal)
        }

        async fn has_open_report(
            &self,
            reporter_id: Id,
            content_type: ContentType,
            content_id: Id,
        ) -> RepoResult<bool> {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM reports WHERE reporter_id = $1 \
                 AND content_type = $2 AND content_id = $3 \
                 AND status IN ('pending','investigating'))",
            )
            .bind(reporter_id)
            .bind(content_type)
            .bind(content_id)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            Ok(exists)
        }

        async fn list_reports(
            &self,
            filter: &ReportFilter,
            page: PageParams,
        ) -> RepoResult<(Vec<Report>, i64)> {
            let mut count_qb: QueryBuilder<Postgres> =
                QueryBuilder::new("SELECT COUNT(*) FROM reports");
            push_filters(&mut count_qb, filter);
            let total: i64 = count_qb
                .build_query_scalar()
                .fetch_one(&self.pool)
                .await
                .map_err(internal)?;

            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("SELECT {REPORT_COLUMNS} FROM reports"));
            push_filters(&mut qb, filter);
            qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
                .push_bind(page.limit)
                .push(" OFFSET ")
                .push_bind(page.offset());
            let rows = qb
                .build_query_as::<Report>()
                .fetch_all(&self.pool)
                .await
                .map_err(internal)?;
            Ok((rows, total))
        }

        async fn all_reports(&self, filter: &ReportFilter) -> RepoResult<Vec<Report>> {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("SELECT {REPORT_COLUMNS} FROM reports"));
            push_filters(&mut qb, filter);
            qb.push(" ORDER BY created_at DESC, id DESC");
            qb.build_query_as::<Report>()
                .fetch_all(&self.pool)
                .await
                .map_err(internal)
        }

        async fn status_counts(
            &self,
            reporter_id: Option<Id>,
        ) -> RepoResult<Vec<(ReportStatus, i64)>> {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("SELECT status, COUNT(*) FROM reports WHERE 1=1");
            if let Some(owner) = reporter_id {
                qb.push(" AND reporter_id = ").push_bind(owner);
            }
            qb.push(" GROUP BY status");
            qb.build_query_as::<(ReportStatus, i64)>()
                .fetch_all(&self.pool)
                .await
                .map_err(internal)
        }

        async fn related_reports(
            &self,
            content_type: ContentType,
            content_id: Id,
            exclude: Id,
            limit: i64,
        ) -> RepoResult<Vec<Report>> {
            let sql = format!(
                "SELECT {REPORT_COLUMNS} FROM reports \
                 WHERE content_type = $1 AND content_id = $2 AND id <> $3 \
                 ORDER BY created_at DESC, id DESC LIMIT $4"
            );
            sqlx::query_as::<_, Report>(&sql)
                .bind(content_type)
                .bind(content_id)
                .bind(exclude)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(internal)
        }

        async fn update_status(&self, id: Id, upd: StatusUpdate) -> RepoResult<Report> {
            let sql = format!(
                "UPDATE reports SET status = $2, \
                 admin_notes = COALESCE($3, admin_notes), \
                 action_taken = COALESCE($4, action_taken), \
                 reviewed_by = $5, updated_at = now() \
                 WHERE id = $1 RETURNING {REPORT_COLUMNS}"
            );
            sqlx::query_as::<_, Report>(&sql)
                .bind(id)
                .bind(upd.status)
                .bind(&upd.admin_notes)
                .bind(&upd.action_taken)
                .bind(upd.reviewed_by)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn bulk_update_status(
            &self,
            ids: &[Id],
            status: ReportStatus,
            admin_notes: Option<String>,
            reviewed_by: Id,
        ) -> RepoResult<BulkOutcome> {
            let result = sqlx::query(
                "UPDATE reports SET status = $1, \
                 admin_notes = COALESCE($2, admin_notes), \
                 reviewed_by = $3, updated_at = now() \
                 WHERE id = ANY($4)",
            )
            .bind(status)
            .bind(&admin_notes)
            .bind(reviewed_by)
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
            let n = result.rows_affected();
            Ok(BulkOutcome {
                matched_count: n,
                modified_count: n,
            })
        }

        async fn delete_pending_report(&self, id: Id, reporter_id: Id) -> RepoResult<()> {
            let result = sqlx::query(
                "DELETE FROM reports WHERE id = $1 AND reporter_id = $2 AND status = $3",
            )
            .bind(id)
            .bind(reporter_id)
            .bind(ReportStatus::Pending)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
            if result.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn report_stats(
            &self,
            date_from: Option<NaiveDate>,
            date_to: Option<NaiveDate>,
            group_by: StatsDimension,
            top_n: i64,
        ) -> RepoResult<ReportStats> {
            let range = ReportFilter {
                date_from,
                date_to,
                ..Default::default()
            };

            let mut total_qb: QueryBuilder<Postgres> =
                QueryBuilder::new("SELECT COUNT(*) FROM reports");
            push_filters(&mut total_qb, &range);
            let total: i64 = total_qb
                .build_query_scalar()
                .fetch_one(&self.pool)
                .await
                .map_err(internal)?;

            let mut status_qb: QueryBuilder<Postgres> =
                QueryBuilder::new("SELECT status, COUNT(*) FROM reports");
            push_filters(&mut status_qb, &range);
            status_qb.push(" GROUP BY status");
            let status_counts = status_qb
                .build_query_as::<(ReportStatus, i64)>()
                .fetch_all(&self.pool)
                .await
                .map_err(internal)?;

            // Dimension column is picked from a closed enum, never from input.
            let column = match group_by {
                StatsDimension::ContentType => "content_type",
                StatsDimension::Reason => "reason",
                StatsDimension::Priority => "priority",
            };
            let mut grouped_qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("SELECT {column}::text, COUNT(*) FROM reports"));
            push_filters(&mut grouped_qb, &range);
            grouped_qb.push(format!(" GROUP BY {column} ORDER BY 2 DESC, 1 ASC"));
            let grouped = grouped_qb
                .build_query_as::<(String, i64)>()
                .fetch_all(&self.pool)
                .await
                .map_err(internal)?
                .into_iter()
                .map(|(key, count)| DimensionCount { key, count })
                .collect();

            let mut reasons_qb: QueryBuilder<Postgres> =
                QueryBuilder::new("SELECT reason, COUNT(*) FROM reports");
            push_filters(&mut reasons_qb, &range);
            reasons_qb
                .push(" GROUP BY reason ORDER BY 2 DESC, 1 ASC LIMIT ")
                .push_bind(top_n);
            let top_reasons = reasons_qb
                .build_query_as::<(ReportReason, i64)>()
                .fetch_all(&self.pool)
                .await
                .map_err(internal)?
                .into_iter()
                .map(|(reason, count)| ReasonCount { reason, count })
                .collect();

            let mut daily_qb: QueryBuilder<Postgres> =
                QueryBuilder::new("SELECT created_at::date AS day, COUNT(*) FROM reports");
            push_filters(&mut daily_qb, &range);
            daily_qb.push(" GROUP BY 1 ORDER BY 1 ASC");
            let daily = daily_qb
                .build_query_as::<(NaiveDate, i64)>()
                .fetch_all(&self.pool)
                .await
                .map_err(internal)?
                .into_iter()
                .map(|(day, count)| DayCount { day, count })
                .collect();

            Ok(ReportStats {
                total,
                by_status: StatusSummary::from_counts(&status_counts),
                grouped,
                top_reasons,
                daily,
            })
        }
    }

    #[async_trait]
    impl ContentRepo for PgRepo {
        async fn resolve_content(
            &self,
            kind: ContentType,
            id: Id,
        ) -> RepoResult<Option<ContentTarget>> {
            let sql = match kind {
                ContentType::Artwork => "SELECT artist_id, title FROM artworks WHERE id = $1",
                ContentType::Image => "SELECT owner_id, title FROM images WHERE id = $1",
                ContentType::User => "SELECT id, display_name FROM users WHERE id = $1",
                ContentType::Comment => "SELECT author_id, left(body, 60) FROM comments WHERE id = $1",
                ContentType::Message => "SELECT sender_id, left(body, 60) FROM messages WHERE id = $1",
            };
            let row: Option<(Id, Option<String>)> = sqlx::query_as(sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?;
            Ok(row.map(|(owner_id, title)| ContentTarget { owner_id, title }))
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn get_user_summary(&self, id: Id) -> RepoResult<Option<UserSummary>> {
            sqlx::query_as::<_, UserSummary>(
                "SELECT id, display_name, email FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)
        }

        async fn get_user_summaries(&self, ids: &[Id]) -> RepoResult<Vec<UserSummary>> {
            sqlx::query_as::<_, UserSummary>(
                "SELECT id, display_name, email FROM users WHERE id = ANY($1)",
            )
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn list_admin_ids(&self) -> RepoResult<Vec<Id>> {
            sqlx::query_scalar("SELECT id FROM users WHERE role = 'admin' ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(internal)
        }
    }
}
