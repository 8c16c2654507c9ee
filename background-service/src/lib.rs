pub mod notifier;

pub use notifier::DiscordWebhook;

use llm_interface::RelevanceFilter;
use std::future::Future;
use std::time::Duration;
use subwatch_core::{
    Config, ContentSource, CoreError, ErrorReporter, Notification, Notifier, SeenStore,
};
use tracing::{debug, info};

/// Counters for a single poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub duplicates: usize,
    pub not_relevant: usize,
    pub notified: usize,
    pub notify_failures: usize,
    pub fetch_failed: bool,
}

/// The poll loop: fetch, dedupe, filter, notify, mark seen, sleep.
pub struct BackgroundService {
    search_term: String,
    subreddits: Vec<String>,
    polling_interval: Duration,
    excerpt_length: usize,
    source: Box<dyn ContentSource>,
    filter: RelevanceFilter,
    notifier: Box<dyn Notifier>,
    seen: Box<dyn SeenStore>,
    reporter: ErrorReporter,
}

impl BackgroundService {
    pub fn new(
        config: &Config,
        source: Box<dyn ContentSource>,
        filter: RelevanceFilter,
        notifier: Box<dyn Notifier>,
        seen: Box<dyn SeenStore>,
    ) -> Self {
        Self {
            search_term: config.search_term.clone(),
            subreddits: config.subreddits.clone(),
            polling_interval: config.poll_interval,
            excerpt_length: config.excerpt_length,
            source,
            filter,
            notifier,
            seen,
            reporter: ErrorReporter::new(),
        }
    }

    pub fn seen(&self) -> &dyn SeenStore {
        self.seen.as_ref()
    }

    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    /// Runs one cycle. Adapter failures are logged and never escape.
    pub async fn poll_once(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        let items = match self
            .source
            .fetch_items(&self.search_term, &self.subreddits)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                self.reporter.report_error("Fetch", &e);
                report.fetch_failed = true;
                return report;
            }
        };
        report.fetched = items.len();

        for item in items {
            if self.seen.contains(&item.id) {
                report.duplicates += 1;
                continue;
            }

            if self.filter.is_relevant(&item).await {
                let notification = Notification::from_item(&item, self.excerpt_length);
                match self.notifier.notify(&notification).await {
                    Ok(()) => {
                        debug!("Notified {} ({})", item.id, item.permalink);
                        report.notified += 1;
                    }
                    Err(e) => {
                        self.reporter
                            .report_error(&format!("Notification for {}", item.id), &e);
                        report.notify_failures += 1;
                    }
                }
            } else {
                debug!("Skipping {}: not relevant", item.id);
                report.not_relevant += 1;
            }

            // At-most-once: the item is seen even when delivery failed.
            self.seen.add(item.id);
        }

        info!(
            fetched = report.fetched,
            duplicates = report.duplicates,
            not_relevant = report.not_relevant,
            notified = report.notified,
            notify_failures = report.notify_failures,
            seen = self.seen.len(),
            "Poll cycle complete"
        );
        report
    }

    /// Polls until `shutdown` resolves. Shutdown is only observed between cycles.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), CoreError>
    where
        F: Future,
    {
        tokio::pin!(shutdown);
        info!(
            "Watching r/{} for '{}' every {:?}",
            self.subreddits.join("+"),
            self.search_term,
            self.polling_interval
        );

        loop {
            self.poll_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.polling_interval) => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping poll loop");
                    return Ok(());
                }
            }
        }
    }

    /// Polls until Ctrl-C.
    pub async fn start(&mut self) -> Result<(), CoreError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}
