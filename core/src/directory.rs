//! Collaborators the ingestion core talks to: the list-configuration lookup
//! and the post-commit indexing hook.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::ListConfig;
use crate::models::Message;

#[derive(Debug, Clone, PartialEq)]
pub struct ListInfo {
    pub name: String,
    pub domain: String,
    pub display_name: Option<String>,
    pub subject_prefix: Option<String>,
}

pub trait ListDirectory: Send + Sync {
    fn get_list(&self, name: &str) -> Option<ListInfo>;
}

/// Called once per newly stored message, after its transaction committed.
/// Never called for duplicates or failed ingestions.
pub trait IndexNotifier: Send + Sync {
    fn on_new_message(&self, message: &Message);
}

/// Directory backed by the `[[lists]]` entries of the config file.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    lists: HashMap<String, ListInfo>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: &[ListConfig]) -> Self {
        let mut dir = Self::new();
        for cfg in configs {
            dir.insert(ListInfo {
                name: cfg.name.clone(),
                domain: cfg.domain.clone(),
                display_name: cfg.display_name.clone(),
                subject_prefix: cfg.subject_prefix.clone(),
            });
        }
        dir
    }

    pub fn with_list(mut self, name: &str, domain: &str) -> Self {
        self.insert(ListInfo {
            name: name.to_string(),
            domain: domain.to_string(),
            display_name: None,
            subject_prefix: None,
        });
        self
    }

    pub fn insert(&mut self, info: ListInfo) {
        self.lists.insert(info.name.clone(), info);
    }
}

impl ListDirectory for StaticDirectory {
    fn get_list(&self, name: &str) -> Option<ListInfo> {
        self.lists.get(name).cloned()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl IndexNotifier for NoopNotifier {
    fn on_new_message(&self, _message: &Message) {}
}

/// Keeps the message-id of every notification, in order. Useful for workers
/// that batch index updates, and for tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_ids(&self) -> Vec<String> {
        self.seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }
}

impl IndexNotifier for RecordingNotifier {
    fn on_new_message(&self, message: &Message) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(message.message_id.clone());
        }
    }
}
