use crate::{candidate::ValidationError, client::DetectionError};
use parking_lot::Mutex;
use serde::Serialize;
use std::{collections::VecDeque, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Info,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Success => "success",
            NotificationKind::Info => "info",
            NotificationKind::Warning => "warning",
            NotificationKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn image_ready() -> Self {
        Self::new(
            NotificationKind::Info,
            "Image Ready",
            "Click \"Submit\" to detect objects in your image",
        )
    }

    pub fn cleared() -> Self {
        Self::new(
            NotificationKind::Info,
            "Cleared",
            "All images have been cleared.",
        )
    }

    pub fn missing_image() -> Self {
        Self::new(
            NotificationKind::Warning,
            "Missing Image",
            "Please select an image first.",
        )
    }

    pub fn already_in_progress() -> Self {
        Self::new(
            NotificationKind::Info,
            "Detection In Progress",
            "Please wait for the current image to finish processing.",
        )
    }

    pub fn detection_complete(count: usize) -> Self {
        Self::new(
            NotificationKind::Success,
            "Detection Complete",
            format!("Found {} objects in your image!", count),
        )
    }
}

impl From<&ValidationError> for Notification {
    fn from(err: &ValidationError) -> Self {
        match err {
            ValidationError::NotAnImage(_) => Self::new(
                NotificationKind::Warning,
                "Invalid File",
                "Please upload an image file (JPEG, PNG, etc.)",
            ),
            ValidationError::TooLarge(_) => Self::new(
                NotificationKind::Warning,
                "File Too Large",
                "Please upload an image smaller than 10MB",
            ),
        }
    }
}

impl From<&DetectionError> for Notification {
    fn from(err: &DetectionError) -> Self {
        match err {
            DetectionError::Network(_) => Self::new(
                NotificationKind::Error,
                "Network Error",
                "Unable to connect to the server. Please check your internet connection.",
            ),
            DetectionError::Server { status, message } => {
                let (title, mut description) = match status {
                    401 => (
                        "Authentication Required",
                        "Please log in to continue.".to_string(),
                    ),
                    403 => (
                        "Access Denied",
                        "You don't have permission to access this resource.".to_string(),
                    ),
                    404 => (
                        "Resource Not Found",
                        "The requested resource could not be found.".to_string(),
                    ),
                    500 => (
                        "Server Error",
                        "The server encountered an error. Please try again later.".to_string(),
                    ),
                    other => ("Server Error", format!("Server returned error: {}", other)),
                };
                if let Some(message) = message {
                    description.push_str(&format!("\nDetails: {}", message));
                }
                Self::new(
                    NotificationKind::Error,
                    format!("{} ({})", title, status),
                    description,
                )
            }
            DetectionError::ResponseFormat(_) => Self::new(
                NotificationKind::Error,
                "Unexpected Response",
                "The detection service returned a response that could not be understood.",
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadingIndicator {
    pub title: String,
    pub description: String,
}

/// Unshown notifications kept at most; older ones are dropped first.
pub const MAX_PENDING: usize = 32;

#[derive(Debug, Default)]
struct NotifierState {
    pending: VecDeque<Notification>,
    loading: Option<(u64, LoadingIndicator)>,
    next_loading_id: u64,
}

/// Collects notifications for the page and owns the single loading indicator.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    state: Arc<Mutex<NotifierState>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self, notification: Notification) {
        match notification.kind {
            NotificationKind::Error => {
                tracing::error!(title = %notification.title, "{}", notification.description)
            }
            NotificationKind::Warning => {
                tracing::warn!(title = %notification.title, "{}", notification.description)
            }
            NotificationKind::Success | NotificationKind::Info => {
                tracing::info!(title = %notification.title, "{}", notification.description)
            }
        }
        let mut state = self.state.lock();
        if state.pending.len() == MAX_PENDING {
            state.pending.pop_front();
        }
        state.pending.push_back(notification);
    }

    /// Takes every notification not shown yet.
    pub fn drain(&self) -> Vec<Notification> {
        self.state.lock().pending.drain(..).collect()
    }

    pub fn pending(&self) -> Vec<Notification> {
        self.state.lock().pending.iter().cloned().collect()
    }

    /// Shows the loading indicator until the returned guard is dropped.
    pub fn loading(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> LoadingGuard {
        let mut state = self.state.lock();
        let id = state.next_loading_id;
        state.next_loading_id += 1;
        state.loading = Some((
            id,
            LoadingIndicator {
                title: title.into(),
                description: description.into(),
            },
        ));

        LoadingGuard {
            id,
            notifier: self.clone(),
        }
    }

    pub fn loading_indicator(&self) -> Option<LoadingIndicator> {
        self.state
            .lock()
            .loading
            .as_ref()
            .map(|(_, indicator)| indicator.clone())
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading.is_some()
    }
}

#[must_use = "the loading indicator is dismissed as soon as the guard is dropped"]
pub struct LoadingGuard {
    id: u64,
    notifier: Notifier,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        let mut state = self.notifier.state.lock();
        if matches!(state.loading, Some((id, _)) if id == self.id) {
            state.loading = None;
        }
    }
}
