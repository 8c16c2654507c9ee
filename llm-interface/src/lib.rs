pub mod providers;

pub use providers::{ClaudeProvider, OpenAiProvider};

use async_trait::async_trait;
use subwatch_core::{Config, CoreError, ErrorReporter, Item, LlmProviderKind, Relevance};
use tracing::{debug, info};

/// Single-turn text completion against a hosted model.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, prompt: &str) -> Result<String, CoreError>;
}

/// Decides whether a piece of text is relevant.
#[async_trait]
pub trait RelevanceClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Relevance, CoreError>;
}

const NEGATIVE_TOKENS: &[&str] = &["no"];
const POSITIVE_TOKENS: &[&str] = &["yes"];

/// Reads a free-text model reply as a relevance decision.
///
/// The reply is split into alphanumeric words and compared case-insensitively.
/// A negative word anywhere wins; otherwise a positive word means relevant and
/// anything else is `Unknown`.
pub fn interpret_response(reply: &str) -> Relevance {
    let words: Vec<String> = reply
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| word.to_lowercase())
        .collect();

    let has = |tokens: &[&str]| words.iter().any(|word| tokens.contains(&word.as_str()));

    if has(NEGATIVE_TOKENS) {
        Relevance::NotRelevant
    } else if has(POSITIVE_TOKENS) {
        Relevance::Relevant
    } else {
        Relevance::Unknown
    }
}

/// Classifier that prepends a fixed prompt template to the text and asks a model.
pub struct PromptClassifier<P> {
    provider: P,
    template: String,
}

impl<P: LlmProvider> PromptClassifier<P> {
    pub fn new(provider: P, template: String) -> Self {
        Self { provider, template }
    }

    pub fn build_prompt(&self, text: &str) -> String {
        format!("{}\n\n{}", self.template, text)
    }
}

#[async_trait]
impl<P: LlmProvider> RelevanceClassifier for PromptClassifier<P> {
    async fn classify(&self, text: &str) -> Result<Relevance, CoreError> {
        let prompt = self.build_prompt(text);
        let reply = self.provider.complete(&prompt).await?;
        let relevance = interpret_response(&reply);
        debug!(
            "{} replied {:?}, read as {:?}",
            self.provider.name(),
            reply.trim(),
            relevance
        );
        Ok(relevance)
    }
}

/// Relevance gate used by the poll loop.
///
/// Disabled filters pass everything through. When the classifier fails or
/// cannot decide, the item is treated as relevant.
pub struct RelevanceFilter {
    classifier: Option<Box<dyn RelevanceClassifier>>,
    reporter: ErrorReporter,
}

impl RelevanceFilter {
    pub fn new(classifier: Box<dyn RelevanceClassifier>) -> Self {
        Self {
            classifier: Some(classifier),
            reporter: ErrorReporter::new(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            classifier: None,
            reporter: ErrorReporter::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, CoreError> {
        let Some(api_key) = config.llm_api_key.clone() else {
            info!("No LLM API key configured, relevance filtering disabled");
            return Ok(Self::disabled());
        };

        let template = config.prompt_template.clone();
        let model = config.llm_model.clone();
        let classifier: Box<dyn RelevanceClassifier> = match config.llm_provider {
            LlmProviderKind::OpenAi => Box::new(PromptClassifier::new(
                OpenAiProvider::new(api_key, model)?,
                template,
            )),
            LlmProviderKind::Claude => Box::new(PromptClassifier::new(
                ClaudeProvider::new(api_key, model)?,
                template,
            )),
        };

        info!(
            "Relevance filtering enabled with {:?} ({})",
            config.llm_provider, config.llm_model
        );
        Ok(Self::new(classifier))
    }

    pub fn is_enabled(&self) -> bool {
        self.classifier.is_some()
    }

    pub async fn is_relevant(&self, item: &Item) -> bool {
        let Some(classifier) = &self.classifier else {
            return true;
        };

        match classifier.classify(&item.text()).await {
            Ok(Relevance::NotRelevant) => false,
            Ok(Relevance::Relevant) | Ok(Relevance::Unknown) => true,
            Err(e) => {
                self.reporter
                    .report_warning(&format!("Relevance check for {}", item.id), &e);
                true
            }
        }
    }
}
