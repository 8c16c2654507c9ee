use async_trait::async_trait;
use background_service::{BackgroundService, CycleReport};
use chrono::Utc;
use llm_interface::{RelevanceClassifier, RelevanceFilter};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subwatch_core::{
    Config, ContentSource, CoreError, Item, ItemKind, LlmError, MemorySeenStore, Notification,
    Notifier, NotifyError, RedditApiError, Relevance, SeenStore,
};

#[derive(Clone, Default)]
struct FakeSource {
    items: Arc<Mutex<Vec<Item>>>,
    fail: Arc<Mutex<bool>>,
    fetches: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl FakeSource {
    fn with_items(items: Vec<Item>) -> Self {
        let source = Self::default();
        *source.items.lock().unwrap() = items;
        source
    }

    fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn fetch_items(
        &mut self,
        search_term: &str,
        subreddits: &[String],
    ) -> Result<Vec<Item>, CoreError> {
        self.fetches
            .lock()
            .unwrap()
            .push((search_term.to_string(), subreddits.to_vec()));
        if *self.fail.lock().unwrap() {
            return Err(CoreError::RedditApi(RedditApiError::ServerError {
                status_code: 503,
            }));
        }
        Ok(self.items.lock().unwrap().clone())
    }
}

#[derive(Clone, Default)]
struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    fail: bool,
}

impl RecordingNotifier {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), CoreError> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail {
            return Err(CoreError::Notify(NotifyError::Rejected { status: 500 }));
        }
        Ok(())
    }
}

/// Rejects any text containing "spam"; errors on text containing "boom".
struct KeywordClassifier;

#[async_trait]
impl RelevanceClassifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<Relevance, CoreError> {
        if text.contains("boom") {
            return Err(CoreError::Llm(LlmError::ServiceUnavailable {
                provider: "fake".to_string(),
            }));
        }
        if text.contains("spam") {
            Ok(Relevance::NotRelevant)
        } else {
            Ok(Relevance::Relevant)
        }
    }
}

fn test_config() -> Config {
    Config::from_lookup(|key| {
        match key {
            "REDDIT_CLIENT_ID" => Some("id"),
            "REDDIT_CLIENT_SECRET" => Some("secret"),
            "DISCORD_WEBHOOK_URL" => Some("https://discord.com/api/webhooks/1/abc"),
            "SUBREDDITS" => Some("test"),
            "SEARCH_TERM" => Some("widget"),
            "POLL_INTERVAL_SECONDS" => Some("60"),
            _ => None,
        }
        .map(str::to_string)
    })
    .unwrap()
}

fn item(id: &str, body: &str) -> Item {
    Item {
        id: id.to_string(),
        kind: ItemKind::Comment,
        author: "tester".to_string(),
        title: None,
        body: body.to_string(),
        community: "test".to_string(),
        community_icon: None,
        author_icon: None,
        permalink: format!("https://reddit.com/r/test/comments/x/y/{id}/"),
        created_at: Utc::now(),
    }
}

fn service(
    source: &FakeSource,
    notifier: &RecordingNotifier,
    filter: RelevanceFilter,
) -> BackgroundService {
    BackgroundService::new(
        &test_config(),
        Box::new(source.clone()),
        filter,
        Box::new(notifier.clone()),
        Box::new(MemorySeenStore::new()),
    )
}

#[tokio::test]
async fn test_end_to_end_single_item() {
    let source = FakeSource::with_items(vec![item("1", "I love widget")]);
    let notifier = RecordingNotifier::default();
    let mut service = service(&source, &notifier, RelevanceFilter::disabled());

    let report = service.poll_once().await;
    assert_eq!(report.notified, 1);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].community, "test");
    assert!(sent[0].title.contains("r/test"));
    assert!(sent[0].excerpt.contains("widget"));
    assert!(service.seen().contains("1"));

    let second = service.poll_once().await;
    assert_eq!(second.notified, 0);
    assert_eq!(second.duplicates, 1);
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_fetch_uses_configured_criteria() {
    let source = FakeSource::default();
    let notifier = RecordingNotifier::default();
    let mut service = service(&source, &notifier, RelevanceFilter::disabled());

    service.poll_once().await;
    let fetches = source.fetches.lock().unwrap().clone();
    assert_eq!(fetches, vec![("widget".to_string(), vec!["test".to_string()])]);
}

#[tokio::test]
async fn test_disabled_filter_notifies_every_new_item() {
    let source = FakeSource::with_items(vec![
        item("a", "widget one"),
        item("b", "widget spam"),
        item("c", "widget three"),
    ]);
    let notifier = RecordingNotifier::default();
    let mut service = service(&source, &notifier, RelevanceFilter::disabled());

    let report = service.poll_once().await;
    assert_eq!(
        report,
        CycleReport {
            fetched: 3,
            notified: 3,
            ..CycleReport::default()
        }
    );
    assert_eq!(notifier.sent().len(), 3);
}

#[tokio::test]
async fn test_seen_items_are_never_renotified() {
    let source = FakeSource::with_items(vec![item("a", "widget"), item("b", "widget")]);
    let notifier = RecordingNotifier::default();
    let mut seen = MemorySeenStore::new();
    seen.add("a".to_string());

    let mut service = BackgroundService::new(
        &test_config(),
        Box::new(source.clone()),
        RelevanceFilter::disabled(),
        Box::new(notifier.clone()),
        Box::new(seen),
    );

    let report = service.poll_once().await;
    assert_eq!(report.duplicates, 1);
    let permalinks: Vec<String> = notifier
        .sent()
        .iter()
        .map(|n| n.permalink.clone())
        .collect();
    assert_eq!(permalinks, vec!["https://reddit.com/r/test/comments/x/y/b/"]);
}

#[tokio::test]
async fn test_duplicates_within_one_batch_notify_once() {
    let source = FakeSource::with_items(vec![item("a", "widget"), item("a", "widget")]);
    let notifier = RecordingNotifier::default();
    let mut service = service(&source, &notifier, RelevanceFilter::disabled());

    let report = service.poll_once().await;
    assert_eq!(report.notified, 1);
    assert_eq!(report.duplicates, 1);
}

#[tokio::test]
async fn test_irrelevant_items_are_marked_seen() {
    let source = FakeSource::with_items(vec![item("a", "widget spam"), item("b", "widget")]);
    let notifier = RecordingNotifier::default();
    let mut service = service(
        &source,
        &notifier,
        RelevanceFilter::new(Box::new(KeywordClassifier)),
    );

    let report = service.poll_once().await;
    assert_eq!(report.not_relevant, 1);
    assert_eq!(report.notified, 1);
    assert!(service.seen().contains("a"));
    assert!(service.seen().contains("b"));

    // Not re-evaluated next cycle either.
    let second = service.poll_once().await;
    assert_eq!(second.duplicates, 2);
    assert_eq!(second.not_relevant, 0);
}

#[tokio::test]
async fn test_classifier_error_treats_item_as_relevant() {
    let source = FakeSource::with_items(vec![item("a", "widget boom")]);
    let notifier = RecordingNotifier::default();
    let mut service = service(
        &source,
        &notifier,
        RelevanceFilter::new(Box::new(KeywordClassifier)),
    );

    let report = service.poll_once().await;
    assert_eq!(report.notified, 1);
}

#[tokio::test]
async fn test_fetch_failure_yields_no_notifications() {
    let source = FakeSource::with_items(vec![item("a", "widget")]);
    source.set_failing(true);
    let notifier = RecordingNotifier::default();
    let mut service = service(&source, &notifier, RelevanceFilter::disabled());

    let report = service.poll_once().await;
    assert!(report.fetch_failed);
    assert_eq!(report.notified, 0);
    assert!(notifier.sent().is_empty());
    assert!(service.seen().is_empty());

    // The next cycle recovers.
    source.set_failing(false);
    let report = service.poll_once().await;
    assert!(!report.fetch_failed);
    assert_eq!(report.notified, 1);
}

#[tokio::test]
async fn test_failed_notification_still_marks_seen() {
    let source = FakeSource::with_items(vec![item("a", "widget")]);
    let notifier = RecordingNotifier::failing();
    let mut service = service(&source, &notifier, RelevanceFilter::disabled());

    let report = service.poll_once().await;
    assert_eq!(report.notify_failures, 1);
    assert_eq!(report.notified, 0);
    assert!(service.seen().contains("a"));

    let second = service.poll_once().await;
    assert_eq!(second.duplicates, 1);
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_webhook_failure_does_not_stop_next_cycle() {
    let source = FakeSource::with_items(vec![item("a", "widget")]);
    let notifier = RecordingNotifier::failing();
    let mut service = service(&source, &notifier, RelevanceFilter::disabled());
    assert_eq!(service.polling_interval(), Duration::from_secs(60));

    let started = tokio::time::Instant::now();
    // First cycle at t=0, second after one interval, stop during the second sleep.
    service
        .run_until(tokio::time::sleep(Duration::from_secs(90)))
        .await
        .unwrap();

    assert_eq!(source.fetch_count(), 2);
    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(started.elapsed(), Duration::from_secs(90));
}

#[tokio::test(start_paused = true)]
async fn test_run_until_stops_without_extra_cycle() {
    let source = FakeSource::default();
    let notifier = RecordingNotifier::default();
    let mut service = service(&source, &notifier, RelevanceFilter::disabled());

    service.run_until(async {}).await.unwrap();
    assert_eq!(source.fetch_count(), 1);
}
