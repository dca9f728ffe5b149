use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::config::{Config, SessionConfig};
use crate::error::VisionError;
use crate::gesture::GestureClassifier;
use crate::session::{Session, SessionReport};
use crate::spell::Dispatcher;
use crate::vision::{Camera, FrameSource, Optics};

type OpticsFactory<O> = Box<dyn Fn() -> Result<O, VisionError> + Send + Sync>;

/// Command surface for front ends: start/stop watching, cast by name,
/// read the debug frame. Every call is fire-and-forget.
pub struct WandLamp<C, O> {
    camera: Arc<C>,
    make_optics: OpticsFactory<O>,
    dispatcher: Arc<Dispatcher>,
    classifier: Arc<GestureClassifier>,
    session: SessionConfig,
    debug_image: bool,
    running: Mutex<Option<JoinHandle<Option<SessionReport>>>>,
}

impl<C, O> WandLamp<C, O>
where
    C: Camera + 'static,
    O: Optics<<C::Source as FrameSource>::Frame> + 'static,
{
    pub fn new<M>(camera: C, make_optics: M, dispatcher: Arc<Dispatcher>, config: &Config) -> Self
    where
        M: Fn() -> Result<O, VisionError> + Send + Sync + 'static,
    {
        Self {
            camera: Arc::new(camera),
            make_optics: Box::new(make_optics),
            dispatcher,
            classifier: Arc::new(GestureClassifier::from_config(&config.gesture)),
            session: config.session.clone(),
            debug_image: config.debug.image,
            running: Mutex::new(None),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Start a session in the background. `None` uses the configured timeout.
    ///
    /// Returns false when a session is already running or the optics could
    /// not be built. A missing camera is only logged by the session task.
    pub fn request_session_start(&self, timeout_secs: Option<f64>) -> bool {
        let Ok(mut running) = self.running.lock() else {
            tracing::error!("session lock poisoned");
            return false;
        };
        if running.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::info!("session already running");
            return false;
        }
        let optics = match (self.make_optics)() {
            Ok(optics) => optics,
            Err(e) => {
                tracing::warn!("session not started: {e}");
                return false;
            }
        };

        let timeout = timeout_secs.unwrap_or(self.session.timeout_secs);
        let session = Session::new(
            Arc::clone(&self.camera),
            optics,
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.classifier),
            self.session.clone(),
        )
        .with_debug_image(self.debug_image);

        *running = Some(tokio::spawn(async move {
            match session.run(timeout).await {
                Ok(report) => Some(report),
                Err(e) => {
                    tracing::warn!("session not started: {e}");
                    None
                }
            }
        }));
        true
    }

    /// Clear the session flag. A stop with no active session is a no-op.
    pub async fn request_session_stop(&self) -> bool {
        if !self.is_session_active().await {
            tracing::debug!("stop ignored, no active session");
            return false;
        }
        match self.dispatcher.state().set_session_active(false).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("stop failed: {e}");
                false
            }
        }
    }

    pub async fn is_session_active(&self) -> bool {
        self.dispatcher.state().is_session_active().await.unwrap_or_else(|e| {
            tracing::warn!("session flag: {e}");
            false
        })
    }

    /// Cast a spell by name; false for unknown names.
    pub async fn dispatch_spell(&self, name: &str) -> bool {
        self.dispatcher.dispatch(name).await.is_some()
    }

    /// Latest annotated frame, when debug frames are enabled.
    pub async fn debug_image(&self) -> Option<Vec<u8>> {
        if !self.debug_image {
            return None;
        }
        self.dispatcher.state().debug_image().await.unwrap_or_else(|e| {
            tracing::debug!("debug image: {e}");
            None
        })
    }

    /// Wait for the current session task, if any, to finish.
    pub async fn join_session(&self) -> Option<SessionReport> {
        let handle = self.running.lock().ok()?.take()?;
        match handle.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("session task failed: {e}");
                None
            }
        }
    }

    /// Stop watching, then let the dispatcher cancel and drain its animations.
    pub async fn shutdown(&self) {
        self.request_session_stop().await;
        self.join_session().await;
        self.dispatcher.shutdown().await;
    }
}
