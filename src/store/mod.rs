//! Shared state store: the single synchronization point between the session
//! loop, the dispatcher and every running animation.

pub mod memory;
pub mod remote;
pub mod server;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::StoreError;
use crate::illuminator::{Illuminator, NullIlluminator};
use crate::spell::Rgb;

pub use memory::MemoryStore;
pub use remote::RemoteStore;

/// Session-active flag, `"on"` / `"off"`
pub const LAMP: &str = "lamp";
/// Lights-active flag, `"on"` / `"off"`
pub const LIGHTS: &str = "lights";
pub const CURRENT_ACTION: &str = "current_action";
/// JSON `[r, g, b]`
pub const CURRENT_COLOR: &str = "current_color";
pub const DEBUG_IMAGE: &str = "debug_image";

const ON: &[u8] = b"on";
const OFF: &[u8] = b"off";

/// Raw key-value access. Keys arrive already namespaced.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
    /// Write `value` only if the current value equals `expected`; an absent
    /// key compares equal to an empty value. Returns whether it was written.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
    ) -> Result<bool, StoreError>;
}

/// Typed, namespaced view over a [`StateStore`].
#[derive(Clone)]
pub struct SharedState {
    store: Arc<dyn StateStore>,
    namespace: String,
    illuminator: Arc<dyn Illuminator>,
}

impl SharedState {
    pub fn new(store: Arc<dyn StateStore>, namespace: &str) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
            illuminator: Arc::new(NullIlluminator),
        }
    }

    /// In-process state, used when no state server is configured.
    pub fn in_memory(namespace: &str) -> Self {
        Self::new(Arc::new(MemoryStore::new()), namespace)
    }

    pub fn with_illuminator(mut self, illuminator: Arc<dyn Illuminator>) -> Self {
        self.illuminator = illuminator;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn key(&self, name: &str) -> String {
        format!("{}:{}", self.namespace, name)
    }

    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.store.get(&self.key(name)).await
    }

    async fn set(&self, name: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.store.set(&self.key(name), value).await
    }

    async fn flag(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.get(name).await?.as_deref() == Some(ON))
    }

    async fn set_flag(&self, name: &str, on: bool) -> Result<(), StoreError> {
        self.set(name, if on { ON } else { OFF }.to_vec()).await?;
        self.sync_illuminator().await;
        Ok(())
    }

    /// Idle defaults: session off, lights off, no action, black.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        self.set_session_active(false).await?;
        self.set_lights_active(false).await?;
        self.set_current_action("").await?;
        self.set_current_color(Rgb::BLACK).await
    }

    pub async fn is_session_active(&self) -> Result<bool, StoreError> {
        self.flag(LAMP).await
    }

    pub async fn set_session_active(&self, on: bool) -> Result<(), StoreError> {
        self.set_flag(LAMP, on).await
    }

    pub async fn lights_active(&self) -> Result<bool, StoreError> {
        self.flag(LIGHTS).await
    }

    pub async fn set_lights_active(&self, on: bool) -> Result<(), StoreError> {
        self.set_flag(LIGHTS, on).await
    }

    pub async fn current_action(&self) -> Result<String, StoreError> {
        let raw = self.get(CURRENT_ACTION).await?.unwrap_or_default();
        String::from_utf8(raw).map_err(|e| StoreError::Codec(e.to_string()))
    }

    pub async fn set_current_action(&self, action: &str) -> Result<(), StoreError> {
        self.set(CURRENT_ACTION, action.as_bytes().to_vec()).await
    }

    /// Swap the action token only if it still names `expected`.
    pub async fn replace_current_action(
        &self,
        expected: &str,
        action: &str,
    ) -> Result<bool, StoreError> {
        self.store
            .compare_and_set(
                &self.key(CURRENT_ACTION),
                expected.as_bytes(),
                action.as_bytes().to_vec(),
            )
            .await
    }

    pub async fn current_color(&self) -> Result<Rgb, StoreError> {
        match self.get(CURRENT_COLOR).await? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Ok(Rgb::BLACK),
        }
    }

    pub async fn set_current_color(&self, color: Rgb) -> Result<(), StoreError> {
        self.set(CURRENT_COLOR, serde_json::to_vec(&color)?).await
    }

    pub async fn debug_image(&self) -> Result<Option<Vec<u8>>, StoreError> {
        self.get(DEBUG_IMAGE).await
    }

    pub async fn set_debug_image(&self, image: Vec<u8>) -> Result<(), StoreError> {
        self.set(DEBUG_IMAGE, image).await
    }

    /// Emitters follow the session flag. Failures are logged, never raised.
    async fn sync_illuminator(&self) {
        let on = match self.is_session_active().await {
            Ok(on) => on,
            Err(e) => {
                tracing::warn!("illuminator: cannot read session flag: {e}");
                return;
            }
        };
        if let Err(e) = self.illuminator.set(on) {
            tracing::warn!("illuminator: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingIlluminator {
        on: AtomicBool,
        calls: AtomicUsize,
    }

    impl Illuminator for RecordingIlluminator {
        fn set(&self, on: bool) -> anyhow::Result<()> {
            self.on.store(on, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_initialize_defaults() {
        let state = SharedState::in_memory("test");
        state.set_current_action("lumos").await.unwrap();
        state.initialize().await.unwrap();
        assert!(!state.is_session_active().await.unwrap());
        assert!(!state.lights_active().await.unwrap());
        assert_eq!(state.current_action().await.unwrap(), "");
        assert_eq!(state.current_color().await.unwrap(), Rgb::BLACK);
    }

    #[tokio::test]
    async fn test_missing_keys_read_as_idle() {
        let state = SharedState::in_memory("fresh");
        assert!(!state.is_session_active().await.unwrap());
        assert_eq!(state.current_action().await.unwrap(), "");
        assert_eq!(state.current_color().await.unwrap(), Rgb::BLACK);
        assert_eq!(state.debug_image().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_namespaces_do_not_collide() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let a = SharedState::new(store.clone(), "hall");
        let b = SharedState::new(store.clone(), "attic");
        a.set_current_action("incendio").await.unwrap();
        a.set_current_color(Rgb::new(200, 20, 0)).await.unwrap();
        assert_eq!(b.current_action().await.unwrap(), "");
        assert_eq!(b.current_color().await.unwrap(), Rgb::BLACK);
        assert_eq!(store.get("hall:current_action").await.unwrap(), Some(b"incendio".to_vec()));
        assert_eq!(store.get("hall:current_color").await.unwrap(), Some(b"[200,20,0]".to_vec()));
    }

    #[tokio::test]
    async fn test_replace_current_action() {
        let state = SharedState::in_memory("cas");
        assert!(state.replace_current_action("", "lumos").await.unwrap());
        assert!(!state.replace_current_action("nox", "").await.unwrap());
        assert_eq!(state.current_action().await.unwrap(), "lumos");
        assert!(state.replace_current_action("lumos", "nox").await.unwrap());
        assert_eq!(state.current_action().await.unwrap(), "nox");
    }

    #[tokio::test]
    async fn test_illuminator_follows_session_flag() {
        let ill = Arc::new(RecordingIlluminator::default());
        let state = SharedState::in_memory("ir").with_illuminator(ill.clone());
        state.set_session_active(true).await.unwrap();
        assert!(ill.on.load(Ordering::SeqCst));
        state.set_lights_active(false).await.unwrap();
        assert!(ill.on.load(Ordering::SeqCst), "lights flag must not switch emitters off");
        state.set_session_active(false).await.unwrap();
        assert!(!ill.on.load(Ordering::SeqCst));
        assert_eq!(ill.calls.load(Ordering::SeqCst), 3);
    }
}
