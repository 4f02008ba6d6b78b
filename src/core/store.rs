//! In-memory conversation store
//!
//! Holds every conversation for the current session; nothing is persisted.
//! Mutations are atomic behind one RwLock, and each one bumps a revision
//! counter published on a watch channel so the presentation layer can react
//! to full-state changes without a diff contract.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

use crate::config::modes::ModeId;
use crate::conversation::{Conversation, Message};
use crate::core::reducer::MessagePatch;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown conversation: {0}")]
    UnknownConversation(Uuid),

    #[error("unknown message: {0}")]
    UnknownMessage(Uuid),
}

/// Sidebar-level view of one conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
    pub mode: ModeId,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    conversations: HashMap<Uuid, Conversation>,
    /// Newest first, like the sidebar.
    order: Vec<Uuid>,
}

pub struct ConversationStore {
    inner: RwLock<Inner>,
    revision: watch::Sender<u64>,
}

impl ConversationStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: RwLock::new(Inner::default()),
            revision,
        }
    }

    /// Current revision; bumped once per mutation.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Watch for full-state change notifications.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    pub async fn create(&self, mode: ModeId) -> Conversation {
        let conversation = Conversation::new(mode);
        let mut inner = self.inner.write().await;
        inner.order.insert(0, conversation.id);
        inner.conversations.insert(conversation.id, conversation.clone());
        drop(inner);
        self.bump();
        conversation
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.inner.read().await.conversations.contains_key(&id)
    }

    /// Cloned snapshot of one conversation.
    pub async fn get(&self, id: Uuid) -> Result<Conversation, StoreError> {
        self.inner
            .read()
            .await
            .conversations
            .get(&id)
            .cloned()
            .ok_or(StoreError::UnknownConversation(id))
    }

    pub async fn list(&self) -> Vec<ConversationSummary> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.conversations.get(id))
            .map(|c| ConversationSummary {
                id: c.id,
                title: c.title.clone(),
                mode: c.mode,
                message_count: c.messages.len(),
                created_at: c.created_at,
            })
            .collect()
    }

    pub async fn set_title(&self, id: Uuid, title: String) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.write().await;
            let conversation = inner
                .conversations
                .get_mut(&id)
                .ok_or(StoreError::UnknownConversation(id))?;
            conversation.title = title;
        }
        self.bump();
        Ok(())
    }

    pub async fn append_message(&self, id: Uuid, message: Message) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.write().await;
            let conversation = inner
                .conversations
                .get_mut(&id)
                .ok_or(StoreError::UnknownConversation(id))?;
            conversation.messages.push(message);
        }
        self.bump();
        Ok(())
    }

    /// Replace the body of an in-flight message by id.
    pub async fn patch_message(
        &self,
        id: Uuid,
        message_id: Uuid,
        patch: MessagePatch,
    ) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.write().await;
            let conversation = inner
                .conversations
                .get_mut(&id)
                .ok_or(StoreError::UnknownConversation(id))?;
            let message = conversation
                .messages
                .iter_mut()
                .find(|m| m.id == message_id)
                .ok_or(StoreError::UnknownMessage(message_id))?;
            message.text = patch.text;
            message.structured = patch.structured;
            message.citations = patch.citations;
        }
        self.bump();
        Ok(())
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
