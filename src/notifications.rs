//! In-app toast queue (local-only)
//!
//! The engine pushes user-facing outcomes here; the view layer drains them.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

const MAX_TOASTS: usize = 100;
static TOAST_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToastLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toast {
    pub id: String,
    pub timestamp: u64,
    pub level: ToastLevel,
    pub title: String,
    pub body: String,
}

impl Toast {
    pub fn new(level: ToastLevel, title: impl Into<String>, body: impl Into<String>) -> Self {
        let seq = TOAST_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("toast_{}", seq),
            timestamp: crate::utils::current_timestamp(),
            level,
            title: title.into(),
            body: body.into(),
        }
    }
}

#[derive(Clone, Default)]
pub struct ToastQueue {
    entries: Arc<RwLock<VecDeque<Toast>>>,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, toast: Toast) {
        match toast.level {
            ToastLevel::Error => tracing::warn!("{}: {}", toast.title, toast.body),
            _ => tracing::debug!("{}: {}", toast.title, toast.body),
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.push_back(toast);
        while entries.len() > MAX_TOASTS {
            entries.pop_front();
        }
    }

    pub fn info(&self, title: &str, body: impl Into<String>) {
        self.push(Toast::new(ToastLevel::Info, title, body));
    }

    pub fn success(&self, title: &str, body: impl Into<String>) {
        self.push(Toast::new(ToastLevel::Success, title, body));
    }

    pub fn error(&self, title: &str, body: impl Into<String>) {
        self.push(Toast::new(ToastLevel::Error, title, body));
    }

    /// Remove and return every queued toast, oldest first
    pub fn drain(&self) -> Vec<Toast> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    /// Newest toasts first, without removing them
    pub fn recent(&self, limit: usize) -> Vec<Toast> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
