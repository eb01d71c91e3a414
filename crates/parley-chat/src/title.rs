//! Automatic conversation titles.
//!
//! After the first exchange a short, independent model call proposes a title.
//! Any failure on that path falls back to a title derived from the user's
//! first message, so the pipeline always produces something.

use parley_llm::{collect_text, ProviderRegistry};
use parley_persist::{Database, DEFAULT_CONVERSATION_TITLE};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::ModelRef;
use crate::credentials::CredentialResolver;
use crate::error::{ChatError, Result};
use crate::prompts::{PromptManager, TITLE_GENERATION_PROMPT};

pub const MAX_TITLE_CHARS: usize = 50;

const ELLIPSIS: &str = "...";

/// Cap at `MAX_TITLE_CHARS` characters, marking the cut with "..."
pub fn truncate_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let keep = MAX_TITLE_CHARS - ELLIPSIS.len();
    let prefix: String = title.chars().take(keep).collect();
    format!("{}{}", prefix.trim_end(), ELLIPSIS)
}

/// Deterministic title from the user's raw message
pub fn fallback_title(user_message: &str) -> String {
    let collapsed = user_message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return DEFAULT_CONVERSATION_TITLE.to_string();
    }
    truncate_title(&collapsed)
}

/// Normalize a model-proposed title; `None` when nothing usable remains
pub fn clean_title(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.strip_prefix("Title:").unwrap_or(line);
    let unquoted = strip_wrapping_quotes(line.trim()).trim();
    let collapsed = unquoted.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.is_empty() {
        None
    } else {
        Some(truncate_title(&collapsed))
    }
}

/// Remove quote pairs that wrap the whole title; lone edge quotes are kept
fn strip_wrapping_quotes(mut text: &str) -> &str {
    loop {
        let mut chars = text.chars();
        match (chars.next(), chars.next_back()) {
            (Some(open), Some(close)) if open == close && matches!(open, '"' | '\'' | '`') => {
                text = chars.as_str().trim();
            }
            _ => return text,
        }
    }
}

/// Inputs captured when a conversation completes its first exchange
#[derive(Debug, Clone)]
pub struct TitleRequest {
    pub conversation_id: String,
    pub user_id: String,
    pub user_message: String,
    pub assistant_message: String,
}

pub struct TitleGenerator<D: Database> {
    db: Arc<D>,
    registry: Arc<ProviderRegistry>,
    resolver: CredentialResolver,
    prompts: Arc<PromptManager>,
    model: ModelRef,
}

impl<D: Database> TitleGenerator<D> {
    pub fn new(
        db: Arc<D>,
        registry: Arc<ProviderRegistry>,
        resolver: CredentialResolver,
        prompts: Arc<PromptManager>,
        model: ModelRef,
    ) -> Self {
        Self {
            db,
            registry,
            resolver,
            prompts,
            model,
        }
    }

    /// Run detached. The task outlives the request that triggered it and its
    /// failures are only logged.
    pub fn spawn(self: &Arc<Self>, request: TitleRequest) -> JoinHandle<()> {
        let generator = Arc::clone(self);
        tokio::spawn(async move {
            let conversation_id = request.conversation_id.clone();
            match generator.generate(request).await {
                Ok(Some(title)) => {
                    tracing::info!(conversation_id = %conversation_id, title = %title, "Conversation title generated");
                }
                Ok(None) => {
                    tracing::debug!(conversation_id = %conversation_id, "Conversation already titled, skipping");
                }
                Err(e) => {
                    tracing::error!(conversation_id = %conversation_id, error = %e, "Title generation failed");
                }
            }
        })
    }

    /// Generate and store a title. Returns the stored title, or `None` when the
    /// conversation already has a non-default one.
    pub async fn generate(&self, request: TitleRequest) -> Result<Option<String>> {
        if !self.still_untitled(&request.conversation_id).await? {
            return Ok(None);
        }

        let title = match self.ask_model(&request).await {
            Ok(Some(title)) => title,
            Ok(None) => {
                tracing::debug!(conversation_id = %request.conversation_id, "Model returned an empty title, using fallback");
                fallback_title(&request.user_message)
            }
            Err(e) => {
                tracing::warn!(
                    conversation_id = %request.conversation_id,
                    error = %e,
                    "Model title unavailable, using fallback"
                );
                fallback_title(&request.user_message)
            }
        };

        self.store_if_untitled(&request.conversation_id, title).await
    }

    async fn still_untitled(&self, conversation_id: &str) -> Result<bool> {
        let id = conversation_id.to_string();
        let conversation = self
            .db
            .execute_in_transaction(move |repos| {
                Box::pin(async move { repos.conversations().find_conversation(&id).await })
            })
            .await?
            .ok_or_else(|| ChatError::not_found("Conversation", conversation_id))?;

        Ok(conversation.has_default_title())
    }

    async fn ask_model(&self, request: &TitleRequest) -> Result<Option<String>> {
        let messages = self.prompts.render(
            TITLE_GENERATION_PROMPT,
            &[
                ("user_message", request.user_message.as_str()),
                ("assistant_message", request.assistant_message.as_str()),
            ],
        )?;

        let provider_name = self.model.provider.clone();
        let provider = self
            .db
            .execute_in_transaction(move |repos| {
                Box::pin(async move { repos.providers().find_provider_by_name(&provider_name).await })
            })
            .await?
            .ok_or_else(|| ChatError::not_found("Provider", &self.model.provider))?;

        let credential = self.resolver.resolve(self.db.as_ref(), &request.user_id, &provider).await?;
        let client = self.registry.client_for(&provider.name, &credential)?;
        let stream = client.stream_chat_completion(&self.model.model, &messages).await?;
        let text = collect_text(stream).await?;

        Ok(clean_title(&text))
    }

    /// Narrow title update, guarded by a re-check in the same transaction so
    /// a concurrent run or a manual rename is never overwritten
    async fn store_if_untitled(&self, conversation_id: &str, title: String) -> Result<Option<String>> {
        let id = conversation_id.to_string();
        self.db
            .execute_in_transaction(move |repos| {
                Box::pin(async move {
                    let current = repos
                        .conversations()
                        .find_conversation(&id)
                        .await?
                        .ok_or_else(|| ChatError::not_found("Conversation", &id))?;
                    if !current.has_default_title() {
                        return Ok(None);
                    }
                    repos.conversations().update_title(&id, &title).await?;
                    Ok::<_, ChatError>(Some(title))
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_collapses_and_truncates() {
        let input = "   please   help me   debug this   very long segment of text that exceeds fifty characters total   ";
        let title = fallback_title(input);

        assert!(title.chars().count() <= MAX_TITLE_CHARS);
        assert!(title.ends_with("..."));
        assert!(!title.contains("  "));
        assert_eq!(title, title.trim());
        assert_eq!(title, "please help me debug this very long segment of...");
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let input = "Explain\tthe borrow checker\nto me";
        assert_eq!(fallback_title(input), fallback_title(input));
        assert_eq!(fallback_title(input), "Explain the borrow checker to me");
    }

    #[test]
    fn test_fallback_empty_input() {
        assert_eq!(fallback_title(""), DEFAULT_CONVERSATION_TITLE);
        assert_eq!(fallback_title(" \n\t "), DEFAULT_CONVERSATION_TITLE);
    }

    #[test]
    fn test_truncate_exact_limit() {
        let fifty = "a".repeat(50);
        assert_eq!(truncate_title(&fifty), fifty);

        let long = "é".repeat(60);
        let truncated = truncate_title(&long);
        assert_eq!(truncated.chars().count(), 50);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("\"Rust Ownership Basics\""), Some("Rust Ownership Basics".to_string()));
        assert_eq!(clean_title("  'Python List Reversal'\n"), Some("Python List Reversal".to_string()));
        assert_eq!(clean_title("Title: Docker Networking"), Some("Docker Networking".to_string()));
        assert_eq!(clean_title("\"\""), None);
        assert_eq!(clean_title("'90s Music Trivia"), Some("'90s Music Trivia".to_string()));
        assert_eq!(clean_title("\"Rock 'n' Roll\""), Some("Rock 'n' Roll".to_string()));
        assert_eq!(clean_title("\"'Quoted Twice'\""), Some("Quoted Twice".to_string()));
        assert_eq!(clean_title("Don't Panic'"), Some("Don't Panic'".to_string()));
        assert_eq!(clean_title("   "), None);

        let long = format!("\"{}\"", "Word ".repeat(20));
        let cleaned = clean_title(&long).unwrap();
        assert!(cleaned.chars().count() <= MAX_TITLE_CHARS);
        assert!(cleaned.ends_with("..."));
    }
}
