use crate::error::*;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    /// Whether the failure is expected to clear up by the next poll cycle.
    fn is_retryable(&self) -> bool;
    /// Whether the process should refuse to start on this error.
    fn is_fatal(&self) -> bool;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::RedditApi(e) => {
                error!("Reddit API error details: {:?}", e);
            }
            CoreError::Llm(e) => {
                error!("LLM error details: {:?}", e);
            }
            CoreError::Notify(e) => {
                error!("Notification error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::RedditApi(e) => e.is_retryable(),
            CoreError::Llm(e) => e.is_retryable(),
            CoreError::Notify(e) => e.is_retryable(),
            CoreError::Network(_) => true,
            _ => false,
        }
    }

    fn is_fatal(&self) -> bool {
        match self {
            CoreError::RedditApi(e) => e.is_fatal(),
            CoreError::Config(_) => true,
            _ => false,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::RedditApi(e) => e.user_friendly_message(),
            CoreError::Llm(e) => e.user_friendly_message(),
            CoreError::Notify(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Will try again next cycle.".to_string()
            }
            CoreError::InvalidInput { message } => format!("Invalid input: {}", message),
            _ => "An unexpected error occurred.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::RedditApi(_) => "REDDIT_API".to_string(),
            CoreError::Llm(_) => "LLM".to_string(),
            CoreError::Notify(_) => "NOTIFY".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for RedditApiError {
    fn log_error(&self) -> &Self {
        error!("RedditApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("RedditApiError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            RedditApiError::RateLimitExceeded { .. } => true,
            RedditApiError::RequestTimeout => true,
            RedditApiError::ServerError { status_code } => *status_code >= 500,
            RedditApiError::InvalidToken => true,
            RedditApiError::InvalidResponse { .. } => true,
            _ => false,
        }
    }

    fn is_fatal(&self) -> bool {
        matches!(self, RedditApiError::AuthenticationFailed { .. })
    }

    fn user_friendly_message(&self) -> String {
        match self {
            RedditApiError::AuthenticationFailed { .. } => {
                "Reddit authentication failed. Please check your client id and secret.".to_string()
            }
            RedditApiError::RateLimitExceeded { retry_after } => format!(
                "Too many requests to Reddit. The limit resets in {} seconds.",
                retry_after
            ),
            RedditApiError::Forbidden { resource } => format!(
                "Access denied to {}. The subreddit may be private or quarantined.",
                resource
            ),
            RedditApiError::SubredditNotFound { subreddit } => {
                format!("Subreddit '{}' not found or is banned.", subreddit)
            }
            RedditApiError::InvalidToken => {
                "Reddit authentication token is invalid. A new one will be requested.".to_string()
            }
            RedditApiError::RequestTimeout => "Request to Reddit timed out.".to_string(),
            _ => "Reddit API error occurred.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            RedditApiError::AuthenticationFailed { .. } => "REDDIT_AUTH_FAILED".to_string(),
            RedditApiError::RateLimitExceeded { .. } => "REDDIT_RATE_LIMIT".to_string(),
            RedditApiError::Forbidden { .. } => "REDDIT_FORBIDDEN".to_string(),
            RedditApiError::SubredditNotFound { .. } => "REDDIT_SUBREDDIT_NOT_FOUND".to_string(),
            RedditApiError::InvalidToken => "REDDIT_INVALID_TOKEN".to_string(),
            RedditApiError::RequestTimeout => "REDDIT_TIMEOUT".to_string(),
            RedditApiError::InvalidResponse { .. } => "REDDIT_INVALID_RESPONSE".to_string(),
            RedditApiError::ServerError { .. } => "REDDIT_SERVER_ERROR".to_string(),
        }
    }
}

impl ErrorExt for LlmError {
    fn log_error(&self) -> &Self {
        error!("LlmError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("LlmError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimitExceeded { .. }
                | LlmError::ServiceUnavailable { .. }
                | LlmError::RequestTimeout { .. }
                | LlmError::InvalidResponseFormat { .. }
        )
    }

    fn is_fatal(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            LlmError::InvalidApiKey { provider } => format!(
                "The API key for {} was rejected. Relevance checks will be skipped.",
                provider
            ),
            LlmError::RateLimitExceeded {
                provider,
                retry_after,
            } => format!(
                "{} is rate limiting requests. Retry after {} seconds.",
                provider, retry_after
            ),
            LlmError::ModelNotAvailable { model } => {
                format!("The model '{}' is not available.", model)
            }
            LlmError::InsufficientCredits { provider } => {
                format!("The {} account is out of credits.", provider)
            }
            LlmError::ServiceUnavailable { provider } => {
                format!("{} is temporarily unavailable.", provider)
            }
            _ => "The relevance check failed.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            LlmError::InvalidApiKey { .. } => "LLM_INVALID_API_KEY".to_string(),
            LlmError::RateLimitExceeded { .. } => "LLM_RATE_LIMIT".to_string(),
            LlmError::ModelNotAvailable { .. } => "LLM_MODEL_NOT_AVAILABLE".to_string(),
            LlmError::ServiceUnavailable { .. } => "LLM_SERVICE_UNAVAILABLE".to_string(),
            LlmError::RequestTimeout { .. } => "LLM_TIMEOUT".to_string(),
            LlmError::InsufficientCredits { .. } => "LLM_INSUFFICIENT_CREDITS".to_string(),
            LlmError::InvalidResponseFormat { .. } => "LLM_INVALID_RESPONSE".to_string(),
            LlmError::RequestFailed { .. } => "LLM_REQUEST_FAILED".to_string(),
        }
    }
}

impl ErrorExt for NotifyError {
    fn log_error(&self) -> &Self {
        error!("NotifyError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("NotifyError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            NotifyError::Rejected { status } => *status >= 500,
            NotifyError::RateLimited { .. } => true,
            NotifyError::Delivery { .. } => true,
        }
    }

    fn is_fatal(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            NotifyError::Rejected { status } if *status == 404 => {
                "The Discord webhook no longer exists. Check DISCORD_WEBHOOK_URL.".to_string()
            }
            NotifyError::Rejected { status } => {
                format!("Discord rejected the message (HTTP {}).", status)
            }
            NotifyError::RateLimited { retry_after } => format!(
                "Discord is rate limiting the webhook for {} seconds.",
                retry_after
            ),
            NotifyError::Delivery { .. } => "Could not reach the Discord webhook.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            NotifyError::Rejected { .. } => "NOTIFY_REJECTED".to_string(),
            NotifyError::RateLimited { .. } => "NOTIFY_RATE_LIMIT".to_string(),
            NotifyError::Delivery { .. } => "NOTIFY_DELIVERY".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn is_fatal(&self) -> bool {
        true
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::InvalidValue { field, value } => {
                format!("Invalid value '{}' for '{}'.", value, field)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => {
                format!("Environment variable '{}' must be set.", var_name)
            }
            ConfigError::ValidationFailed { reason } => {
                format!("Configuration is invalid: {}", reason)
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV_VAR".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
        }
    }
}

/// Logs errors raised at adapter boundaries of the poll loop.
pub struct ErrorReporter {
    report_errors: bool,
    report_warnings: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
            report_warnings: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    pub fn with_warning_reporting(mut self, enabled: bool) -> Self {
        self.report_warnings = enabled;
        self
    }

    pub fn report_error(&self, context: &str, error: &CoreError) {
        if self.report_errors {
            error!(code = %error.error_code(), "{} failed: {}", context, error);
            error.log_error();
            info!("User message: {}", error.user_friendly_message());
            if error.is_retryable() {
                info!("{} will be attempted again next cycle", context);
            }
        }
    }

    pub fn report_warning(&self, context: &str, error: &CoreError) {
        if self.report_warnings {
            warn!(code = %error.error_code(), "{}: {}", context, error);
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
