use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "subwatch/0.1.0";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_FETCH_LIMIT: u32 = 20;
pub const DEFAULT_EXCERPT_LENGTH: usize = 500;
/// Discord caps an embed description at 4096 characters.
pub const MAX_EXCERPT_LENGTH: usize = 4000;
pub const DEFAULT_PROMPT: &str = "You are screening Reddit comments and posts for a community \
watcher. Answer with a single word, yes or no: is the following text genuinely about the \
search topic, rather than an unrelated use of the same word?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    OpenAi,
    Claude,
}

impl LlmProviderKind {
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProviderKind::OpenAi => "gpt-4o-mini",
            LlmProviderKind::Claude => "claude-3-5-haiku-latest",
        }
    }
}

impl FromStr for LlmProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(LlmProviderKind::OpenAi),
            "claude" | "anthropic" => Ok(LlmProviderKind::Claude),
            other => Err(ConfigError::InvalidValue {
                field: "LLM_PROVIDER".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Process-wide settings, loaded once at startup and handed to each component.
#[derive(Clone)]
pub struct Config {
    pub reddit_client_id: String,
    pub reddit_client_secret: String,
    pub user_agent: String,
    pub webhook_url: Url,
    pub subreddits: Vec<String>,
    pub search_term: String,
    pub poll_interval: Duration,
    pub fetch_limit: u32,
    pub excerpt_length: usize,
    pub llm_api_key: Option<String>,
    pub llm_provider: LlmProviderKind,
    pub llm_model: String,
    pub prompt_template: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset.
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| {
            get(key).ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                var_name: key.to_string(),
            })
        };

        let reddit_client_id = require("REDDIT_CLIENT_ID")?;
        let reddit_client_secret = require("REDDIT_CLIENT_SECRET")?;
        let user_agent = get("REDDIT_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let raw_webhook = require("DISCORD_WEBHOOK_URL")?;
        let webhook_url = Url::parse(&raw_webhook)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "DISCORD_WEBHOOK_URL".to_string(),
                value: raw_webhook.clone(),
            })?;

        let subreddits = parse_subreddits(&require("SUBREDDITS")?);
        if subreddits.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "SUBREDDITS must name at least one subreddit".to_string(),
            });
        }

        let search_term = require("SEARCH_TERM")?;

        let poll_interval_secs: u64 =
            parse_or("POLL_INTERVAL_SECONDS", get("POLL_INTERVAL_SECONDS"), DEFAULT_POLL_INTERVAL_SECS)?;
        if poll_interval_secs == 0 {
            return Err(invalid("POLL_INTERVAL_SECONDS", "0"));
        }

        let fetch_limit: u32 = parse_or("FETCH_LIMIT", get("FETCH_LIMIT"), DEFAULT_FETCH_LIMIT)?;
        if !(1..=100).contains(&fetch_limit) {
            return Err(invalid("FETCH_LIMIT", &fetch_limit.to_string()));
        }

        let excerpt_length: usize =
            parse_or("EXCERPT_LENGTH", get("EXCERPT_LENGTH"), DEFAULT_EXCERPT_LENGTH)?;
        if !(1..=MAX_EXCERPT_LENGTH).contains(&excerpt_length) {
            return Err(invalid("EXCERPT_LENGTH", &excerpt_length.to_string()));
        }

        let llm_provider = match get("LLM_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => LlmProviderKind::OpenAi,
        };
        let llm_model = get("LLM_MODEL").unwrap_or_else(|| llm_provider.default_model().to_string());

        Ok(Self {
            reddit_client_id,
            reddit_client_secret,
            user_agent,
            webhook_url,
            subreddits,
            search_term,
            poll_interval: Duration::from_secs(poll_interval_secs),
            fetch_limit,
            excerpt_length,
            llm_api_key: get("LLM_API_KEY"),
            llm_provider,
            llm_model,
            prompt_template: get("LLM_PROMPT").unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
        })
    }

    /// AI filtering runs only when an inference API key is configured.
    pub fn ai_enabled(&self) -> bool {
        self.llm_api_key.is_some()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("reddit_client_id", &self.reddit_client_id)
            .field("reddit_client_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("webhook_url", &"<redacted>")
            .field("subreddits", &self.subreddits)
            .field("search_term", &self.search_term)
            .field("poll_interval", &self.poll_interval)
            .field("fetch_limit", &self.fetch_limit)
            .field("excerpt_length", &self.excerpt_length)
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "<redacted>"))
            .field("llm_provider", &self.llm_provider)
            .field("llm_model", &self.llm_model)
            .finish_non_exhaustive()
    }
}

fn parse_subreddits(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|name| name.trim().trim_start_matches("r/").to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

fn parse_or<T: FromStr>(field: &str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.parse().map_err(|_| invalid(field, &value)),
        None => Ok(default),
    }
}

fn invalid(field: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("REDDIT_CLIENT_ID", "id"),
            ("REDDIT_CLIENT_SECRET", "secret"),
            ("DISCORD_WEBHOOK_URL", "https://discord.com/api/webhooks/1/abc"),
            ("SUBREDDITS", "rust, programming,,r/learnrust "),
            ("SEARCH_TERM", "widget"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|key| env.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults_applied() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.subreddits, vec!["rust", "programming", "learnrust"]);
        assert_eq!(config.poll_interval, Duration::from_secs(300));
        assert_eq!(config.fetch_limit, 20);
        assert_eq!(config.excerpt_length, 500);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.llm_provider, LlmProviderKind::OpenAi);
        assert_eq!(config.llm_model, "gpt-4o-mini");
        assert!(!config.ai_enabled());
    }

    #[test]
    fn test_missing_required_variable() {
        let mut env = base_env();
        env.remove("SEARCH_TERM");
        match load(&env) {
            Err(ConfigError::MissingEnvironmentVariable { var_name }) => {
                assert_eq!(var_name, "SEARCH_TERM")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_blank_api_key_disables_ai() {
        let mut env = base_env();
        env.insert("LLM_API_KEY", "   ");
        assert!(!load(&env).unwrap().ai_enabled());

        env.insert("LLM_API_KEY", "sk-test");
        env.insert("LLM_PROVIDER", "Claude");
        let config = load(&env).unwrap();
        assert!(config.ai_enabled());
        assert_eq!(config.llm_provider, LlmProviderKind::Claude);
        assert_eq!(config.llm_model, "claude-3-5-haiku-latest");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut env = base_env();
        env.insert("POLL_INTERVAL_SECONDS", "soon");
        assert!(matches!(load(&env), Err(ConfigError::InvalidValue { .. })));

        let mut env = base_env();
        env.insert("POLL_INTERVAL_SECONDS", "0");
        assert!(matches!(load(&env), Err(ConfigError::InvalidValue { .. })));

        let mut env = base_env();
        env.insert("FETCH_LIMIT", "500");
        assert!(matches!(load(&env), Err(ConfigError::InvalidValue { .. })));

        let mut env = base_env();
        env.insert("DISCORD_WEBHOOK_URL", "ftp://example.com/hook");
        assert!(matches!(load(&env), Err(ConfigError::InvalidValue { .. })));

        let mut env = base_env();
        env.insert("LLM_PROVIDER", "mystery");
        assert!(matches!(load(&env), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_excerpt_length_bounds() {
        let mut env = base_env();
        env.insert("EXCERPT_LENGTH", "4000");
        assert_eq!(load(&env).unwrap().excerpt_length, MAX_EXCERPT_LENGTH);

        env.insert("EXCERPT_LENGTH", "5000");
        match load(&env) {
            Err(ConfigError::InvalidValue { field, value }) => {
                assert_eq!(field, "EXCERPT_LENGTH");
                assert_eq!(value, "5000");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        env.insert("EXCERPT_LENGTH", "0");
        assert!(matches!(load(&env), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_empty_subreddit_list_rejected() {
        let mut env = base_env();
        env.insert("SUBREDDITS", " , ,");
        assert!(matches!(load(&env), Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut env = base_env();
        env.insert("LLM_API_KEY", "sk-very-secret");
        let rendered = format!("{:?}", load(&env).unwrap());
        assert!(!rendered.contains("sk-very-secret"));
        assert!(!rendered.contains("webhooks/1/abc"));
        assert!(!rendered.contains("\"secret\""));
    }
}
