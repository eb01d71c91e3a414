//! Message posting: validate, persist the user turn, relay the provider's
//! stream to the caller and persist the assistant turn once it completes.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parley_llm::{ChatMessage, ContentDelta, ProviderClient, ProviderRegistry};
use parley_persist::{Artifact, ArtifactType, Database, Message, MessageRole, NewArtifact};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ChatConfig;
use crate::conversations::load_owned;
use crate::credentials::{CredentialResolver, SealedCredential};
use crate::error::{ChatError, Result};
use crate::title::{TitleGenerator, TitleRequest};

const TRUNCATED_STREAM_MESSAGE: &str = "The model provider ended the reply unexpectedly";

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactInput {
    pub title: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
    #[serde(default)]
    pub language: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
    /// Overrides the conversation's model for this turn
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactInput>,
}

impl PostMessageRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_artifact(mut self, artifact: ArtifactInput) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// How the background relay ended
#[derive(Debug)]
pub enum RelayOutcome {
    /// Assistant reply stored. `title_task` is set when this was the first exchange.
    Saved {
        message_id: String,
        title_task: Option<JoinHandle<()>>,
    },
    /// The reply failed; nothing was stored for it
    Failed(String),
    /// The reply was delivered but could not be stored
    NotSaved(String),
}

/// Live handle returned by [`ChatService::post_message`]
#[derive(Debug)]
pub struct ReplyStream {
    pub user_message_id: String,
    pub events: mpsc::Receiver<ContentDelta>,
    pub relay: JoinHandle<RelayOutcome>,
}

impl ReplyStream {
    pub async fn recv(&mut self) -> Option<ContentDelta> {
        self.events.recv().await
    }

    /// Drain every event, then wait for the relay to finish its bookkeeping
    pub async fn collect(mut self) -> (Vec<ContentDelta>, Option<RelayOutcome>) {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let outcome = self.relay.await.ok();
        (events, outcome)
    }
}

/// Everything the inbound transaction produces for the relay
struct PreparedTurn {
    user_message_id: String,
    model_id: String,
    model_name: String,
    credential: SealedCredential,
    history: Vec<ChatMessage>,
}

pub struct ChatService<D: Database> {
    db: Arc<D>,
    registry: Arc<ProviderRegistry>,
    resolver: CredentialResolver,
    titles: Arc<TitleGenerator<D>>,
    history_window: u64,
    channel_capacity: usize,
}

impl<D: Database> ChatService<D> {
    pub fn new(
        db: Arc<D>,
        registry: Arc<ProviderRegistry>,
        resolver: CredentialResolver,
        titles: Arc<TitleGenerator<D>>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            db,
            registry,
            resolver,
            titles,
            history_window: config.history_window,
            channel_capacity: config.channel_capacity,
        }
    }

    /// Post a user message and start streaming the reply.
    ///
    /// Ownership, model, provider and credential checks all happen before
    /// anything is written; any failure there is returned directly. Once the
    /// user turn is stored, every later failure arrives as the stream's
    /// terminal error event instead.
    pub async fn post_message(
        &self,
        conversation_id: &str,
        user_id: &str,
        request: PostMessageRequest,
    ) -> Result<ReplyStream> {
        let content = request.content.trim().to_string();
        if content.is_empty() {
            return Err(ChatError::Validation("Message content must not be empty".to_string()));
        }
        let artifacts = request
            .artifacts
            .into_iter()
            .map(|a| -> Result<NewArtifact> {
                Ok(NewArtifact {
                    artifact_type: a.artifact_type.parse::<ArtifactType>()?,
                    title: a.title,
                    language: a.language,
                    content: a.content,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let turn = self
            .persist_inbound(
                conversation_id.to_string(),
                user_id.to_string(),
                request.model_id,
                content,
                artifacts,
            )
            .await?;

        tracing::info!(
            conversation_id = %conversation_id,
            message_id = %turn.user_message_id,
            provider = %turn.credential.provider_name,
            model = %turn.model_name,
            history = turn.history.len(),
            "User message stored, dispatching to provider"
        );

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let user_message_id = turn.user_message_id.clone();

        let client = match self.open_client(&turn.credential) {
            Ok(client) => client,
            Err(e) => {
                let public = e.public_message();
                let relay = tokio::spawn(async move {
                    let _ = tx.send(ContentDelta::failed(public.clone())).await;
                    RelayOutcome::Failed(public)
                });
                return Ok(ReplyStream {
                    user_message_id,
                    events: rx,
                    relay,
                });
            }
        };

        let pending = PendingReply {
            db: Arc::clone(&self.db),
            titles: Arc::clone(&self.titles),
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            user_message_id: turn.user_message_id,
            model_id: turn.model_id,
            model_name: turn.model_name,
        };
        let relay = tokio::spawn(pending.run(client, turn.history, tx));

        Ok(ReplyStream {
            user_message_id,
            events: rx,
            relay,
        })
    }

    /// Decrypt the credential and build a client, outside any transaction
    fn open_client(&self, sealed: &SealedCredential) -> Result<Arc<dyn ProviderClient>> {
        let credential = self.resolver.unseal(sealed)?;
        let client = self.registry.client_for(&sealed.provider_name, &credential)?;
        Ok(client)
    }

    async fn persist_inbound(
        &self,
        conversation_id: String,
        user_id: String,
        requested_model: Option<String>,
        content: String,
        artifacts: Vec<NewArtifact>,
    ) -> Result<PreparedTurn> {
        let registry = Arc::clone(&self.registry);
        let resolver = self.resolver.clone();
        let history_window = self.history_window;

        self.db
            .execute_in_transaction(move |repos| {
                Box::pin(async move {
                    let conversation = load_owned(repos, &conversation_id, &user_id).await?;

                    let model_id = requested_model
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| conversation.model_id.clone());
                    let model = repos
                        .models()
                        .find_model(&model_id)
                        .await?
                        .ok_or_else(|| ChatError::not_found("Model", &model_id))?;
                    if !model.is_active {
                        return Err(ChatError::Configuration(format!(
                            "Model '{}' is currently unavailable",
                            model.display_name
                        )));
                    }

                    // Provider always follows the model used for this turn
                    let provider = repos
                        .providers()
                        .find_provider(&model.provider_id)
                        .await?
                        .ok_or_else(|| ChatError::not_found("Provider", &model.provider_id))?;
                    if !registry.contains(&provider.name) {
                        return Err(ChatError::UnsupportedProvider(provider.name));
                    }

                    let credential = resolver.lookup(repos, &user_id, &provider).await?;

                    let message = Message::new(&conversation_id, MessageRole::User, content).with_model(&model.id);
                    repos.messages().insert_message(&message).await?;
                    for artifact in artifacts {
                        repos
                            .artifacts()
                            .insert_artifact(&Artifact::new(&message.id, artifact))
                            .await?;
                    }
                    repos
                        .conversations()
                        .update_last_message_at(&conversation_id, message.created_at)
                        .await?;

                    let recent = repos.messages().recent_messages(&conversation_id, history_window).await?;
                    let mut history = Vec::with_capacity(recent.len() + 1);
                    if let Some(prompt) = conversation.system_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
                        history.push(ChatMessage::system(prompt));
                    }
                    history.extend(recent.iter().map(ChatMessage::from));

                    Ok::<_, ChatError>(PreparedTurn {
                        user_message_id: message.id,
                        model_id: model.id,
                        model_name: model.name,
                        credential,
                        history,
                    })
                })
            })
            .await
    }
}

/// State owned by the background relay task
struct PendingReply<D: Database> {
    db: Arc<D>,
    titles: Arc<TitleGenerator<D>>,
    conversation_id: String,
    user_id: String,
    user_message_id: String,
    model_id: String,
    model_name: String,
}

impl<D: Database> PendingReply<D> {
    async fn run(
        self,
        client: Arc<dyn ProviderClient>,
        history: Vec<ChatMessage>,
        tx: mpsc::Sender<ContentDelta>,
    ) -> RelayOutcome {
        let mut stream = match client.stream_chat_completion(&self.model_name, &history).await {
            Ok(stream) => stream,
            Err(e) => {
                let error = ChatError::from(e);
                tracing::warn!(conversation_id = %self.conversation_id, error = %error, "Failed to open provider stream");
                let public = error.public_message();
                let _ = tx.send(ContentDelta::failed(public.clone())).await;
                return RelayOutcome::Failed(public);
            }
        };

        let mut reply = String::new();
        let mut caller_connected = true;
        let mut terminal: Option<Option<String>> = None;

        while let Some(event) = stream.next().await {
            let is_last = event.is_last;
            let error = event.error.clone();
            if error.is_none() {
                reply.push_str(&event.content_delta);
            }

            // A gone caller stops the relay, not the accumulation
            if caller_connected && tx.send(event).await.is_err() {
                caller_connected = false;
                tracing::debug!(conversation_id = %self.conversation_id, "Caller disconnected, continuing in background");
            }

            if is_last {
                terminal = Some(error);
                break;
            }
        }
        drop(stream);

        match terminal {
            None => {
                tracing::error!(
                    conversation_id = %self.conversation_id,
                    provider = %client.provider_name(),
                    "Provider stream closed without a terminal event"
                );
                if caller_connected {
                    let _ = tx.send(ContentDelta::failed(TRUNCATED_STREAM_MESSAGE)).await;
                }
                RelayOutcome::Failed(TRUNCATED_STREAM_MESSAGE.to_string())
            }
            Some(Some(error)) => {
                tracing::warn!(conversation_id = %self.conversation_id, error = %error, "Reply failed, nothing stored");
                RelayOutcome::Failed(error)
            }
            Some(None) => {
                drop(tx);
                self.persist_reply(reply).await
            }
        }
    }

    /// Separate from the reply's transaction; failures are logged and dropped
    async fn touch_conversation(&self, at: DateTime<Utc>) {
        let conversation_id = self.conversation_id.clone();
        let touched = self
            .db
            .execute_in_transaction(move |repos| {
                Box::pin(async move {
                    repos.conversations().update_last_message_at(&conversation_id, at).await?;
                    Ok::<_, ChatError>(())
                })
            })
            .await;

        if let Err(e) = touched {
            tracing::warn!(
                conversation_id = %self.conversation_id,
                error = %e,
                "Failed to update last message timestamp"
            );
        }
    }

    async fn persist_reply(self, reply: String) -> RelayOutcome {
        let conversation_id = self.conversation_id.clone();
        let mut message = Message::new(&conversation_id, MessageRole::Assistant, reply.clone()).with_model(&self.model_id);
        message.parent_id = Some(self.user_message_id.clone());

        let stored = self
            .db
            .execute_in_transaction(move |repos| {
                Box::pin(async move {
                    repos.messages().insert_message(&message).await?;

                    let first_user_message = if repos.messages().count_messages(&conversation_id).await? == 2 {
                        repos
                            .messages()
                            .first_message_with_role(&conversation_id, MessageRole::User)
                            .await?
                            .map(|m| m.content)
                    } else {
                        None
                    };
                    Ok::<_, ChatError>((message.id, message.created_at, first_user_message))
                })
            })
            .await;

        match stored {
            Ok((message_id, created_at, first_user_message)) => {
                tracing::info!(
                    conversation_id = %self.conversation_id,
                    message_id = %message_id,
                    chars = reply.chars().count(),
                    "Assistant reply stored"
                );
                self.touch_conversation(created_at).await;
                let title_task = first_user_message.map(|user_message| {
                    self.titles.spawn(TitleRequest {
                        conversation_id: self.conversation_id.clone(),
                        user_id: self.user_id.clone(),
                        user_message,
                        assistant_message: reply,
                    })
                });
                RelayOutcome::Saved { message_id, title_task }
            }
            Err(e) => {
                tracing::error!(
                    conversation_id = %self.conversation_id,
                    error = %e,
                    "Assistant reply delivered but not stored"
                );
                RelayOutcome::NotSaved(e.public_message())
            }
        }
    }
}
