use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;

use crate::models::Id;

/// How many in-flight deliveries a bulk fan-out may hold at once.
const FAN_OUT_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ReportCreated,
    ReportStatusUpdated,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub report_id: Id,
    pub message: String,
}

/// Delivery collaborator. Failures are the dispatcher's problem, never the
/// calling request's.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: Id, note: Notification) -> anyhow::Result<()>;
}

/// Spawn a single best-effort delivery. The request that triggered it has
/// already been answered by the time this resolves.
pub fn dispatch(notifier: Arc<dyn Notifier>, user_id: Id, note: Notification) {
    actix_web::rt::spawn(async move {
        let kind = note.kind;
        if let Err(e) = notifier.notify(user_id, note).await {
            metrics::counter!("artmod_notification_failures_total", 1);
            log::warn!("notification {kind:?} to user {user_id} failed: {e}");
        } else {
            metrics::counter!("artmod_notifications_sent_total", 1);
        }
    });
}

/// Fan a notification out to many recipients with bounded concurrency, so a
/// large bulk transition cannot stampede the delivery collaborator.
pub fn dispatch_fan_out(notifier: Arc<dyn Notifier>, recipients: Vec<(Id, Notification)>) {
    actix_web::rt::spawn(async move {
        use futures_util::stream::{self, StreamExt};
        stream::iter(recipients)
            .for_each_concurrent(FAN_OUT_CONCURRENCY, |(user_id, note)| {
                let notifier = notifier.clone();
                async move {
                    let kind = note.kind;
                    if let Err(e) = notifier.notify(user_id, note).await {
                        metrics::counter!("artmod_notification_failures_total", 1);
                        log::warn!("notification {kind:?} to user {user_id} failed: {e}");
                    } else {
                        metrics::counter!("artmod_notifications_sent_total", 1);
                    }
                }
            })
            .await;
    });
}

/// Default backend: writes deliveries to the log. The real push pipeline is
/// an external service; this keeps local runs observable.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: Id, note: Notification) -> anyhow::Result<()> {
        log::info!(
            "notify user={user_id} type={:?} report={} message={}",
            note.kind,
            note.report_id,
            note.message
        );
        Ok(())
    }
}

/// Records every delivery; used by the integration tests and as a stand-in
/// delivery backend in dev. Can be flipped to fail every call to exercise
/// the swallow-and-log path.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Id, Notification)>>,
    pub fail: std::sync::atomic::AtomicBool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(Id, Notification)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: Id, note: Notification) -> anyhow::Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::Relaxed) {
            anyhow::bail!("delivery backend unavailable");
        }
        self.sent.lock().unwrap().push((user_id, note));
        Ok(())
    }
}
