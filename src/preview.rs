use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

#[derive(Debug, Clone)]
pub struct Preview {
    pub mime_type: String,
    pub data: Bytes,
}

#[derive(Debug, Default)]
struct PreviewEntries {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Preview>>,
}

/// Previews of selected images, served back to the page while they are held.
#[derive(Debug, Clone, Default)]
pub struct PreviewStore {
    inner: Arc<PreviewEntries>,
}

impl PreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, mime_type: &str, data: Bytes) -> PreviewHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.entries.lock().insert(
            id,
            Preview {
                mime_type: mime_type.to_string(),
                data,
            },
        );
        tracing::debug!(id, "registered preview");

        PreviewHandle {
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    pub fn get(&self, id: u64) -> Option<Preview> {
        self.inner.entries.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps a preview alive. The store entry goes away when the handle is dropped.
#[derive(Debug)]
pub struct PreviewHandle {
    id: u64,
    store: Weak<PreviewEntries>,
}

impl PreviewHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> String {
        format!("/preview/{}", self.id)
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.entries.lock().remove(&self.id);
            tracing::debug!(id = self.id, "released preview");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_releases_entry_on_drop() {
        let store = PreviewStore::new();
        let first = store.register("image/png", Bytes::from_static(b"png"));
        let second = store.register("image/jpeg", Bytes::from_static(b"jpg"));

        assert_ne!(first.id(), second.id());
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get(second.id()).map(|p| p.mime_type),
            Some("image/jpeg".to_string())
        );

        let first_id = first.id();
        drop(first);

        assert_eq!(store.len(), 1);
        assert!(store.get(first_id).is_none());

        drop(second);
        assert!(store.is_empty());
    }

    #[test]
    fn test_handle_outliving_store() {
        let store = PreviewStore::new();
        let handle = store.register("image/png", Bytes::from_static(b"png"));
        drop(store);
        assert_eq!(handle.url(), format!("/preview/{}", handle.id()));
    }
}
