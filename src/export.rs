use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Id, Report, UserSummary};

/// One flattened report as it appears in an export file. Party names and
/// emails are denormalized into the row so the file is self-contained.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
    pub id: Id,
    pub content_type: &'static str,
    pub content_id: Id,
    pub reason: &'static str,
    pub priority: &'static str,
    pub status: &'static str,
    pub description: String,
    pub content_title: Option<String>,
    pub reporter_name: Option<String>,
    pub reporter_email: Option<String>,
    pub target_name: Option<String>,
    pub target_email: Option<String>,
    pub admin_notes: Option<String>,
    pub action_taken: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Written explicitly so an empty export still carries the header line.
// Order must match the field order of `ExportRow`.
const HEADERS: [&str; 16] = [
    "id",
    "contentType",
    "contentId",
    "reason",
    "priority",
    "status",
    "description",
    "contentTitle",
    "reporterName",
    "reporterEmail",
    "targetName",
    "targetEmail",
    "adminNotes",
    "actionTaken",
    "createdAt",
    "updatedAt",
];

pub fn flatten_reports(reports: &[Report], users: &HashMap<Id, UserSummary>) -> Vec<ExportRow> {
    reports
        .iter()
        .map(|r| {
            let reporter = users.get(&r.reporter_id);
            let target = users.get(&r.target_user_id);
            ExportRow {
                id: r.id,
                content_type: r.content_type.as_str(),
                content_id: r.content_id,
                reason: r.reason.as_str(),
                priority: r.priority.as_str(),
                status: r.status.as_str(),
                description: r.description.clone(),
                content_title: r.content_title.clone(),
                reporter_name: reporter.map(|u| u.display_name.clone()),
                reporter_email: reporter.map(|u| u.email.clone()),
                target_name: target.map(|u| u.display_name.clone()),
                target_email: target.map(|u| u.email.clone()),
                admin_notes: r.admin_notes.clone(),
                action_taken: r.action_taken.clone(),
                created_at: r.created_at,
                updated_at: r.updated_at,
            }
        })
        .collect()
}

pub fn to_csv(rows: &[ExportRow]) -> anyhow::Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(HEADERS)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    Ok(wtr.into_inner()?)
}

pub fn export_filename(now: DateTime<Utc>) -> String {
    format!("reports_{}.csv", now.format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, ReportPriority, ReportReason, ReportStatus};

    fn sample_report(id: Id) -> Report {
        Report {
            id,
            reporter_id: 1,
            content_type: ContentType::Artwork,
            content_id: 7,
            reason: ReportReason::Spam,
            description: "contains, commas and \"quotes\"".into(),
            priority: ReportPriority::Medium,
            status: ReportStatus::Pending,
            admin_notes: None,
            action_taken: None,
            reviewed_by: None,
            content_title: Some("Sunset".into()),
            target_user_id: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn empty_export_is_header_only() {
        let bytes = to_csv(&[]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("id,contentType"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn one_line_per_report_with_quoting() {
        let users = HashMap::from([(
            1,
            UserSummary {
                id: 1,
                display_name: "Amina".into(),
                email: "amina@example.com".into(),
            },
        )]);
        let rows = flatten_reports(&[sample_report(10), sample_report(11)], &users);
        let bytes = to_csv(&rows).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("10,artwork,7,spam,medium,pending"));
        // csv escapes the embedded comma and quotes
        assert!(lines[1].contains("\"contains, commas and \"\"quotes\"\"\""));
        // target user 2 is unknown -> empty columns, not a failure
        assert!(lines[2].contains(",,"));
    }

    #[test]
    fn filename_carries_timestamp() {
        let now = "2026-03-01T10:20:30Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(export_filename(now), "reports_20260301102030.csv");
    }
}
