use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::SessionConfig;
use crate::error::VisionError;
use crate::gesture::GestureClassifier;
use crate::spell::{CastOptions, Dispatcher, Spell};
use crate::vision::{Camera, FrameSource, Optics, PointFinder, PointTracker, Scene};

/// Absolute end of a session. `None` never expires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deadline {
    timeout: Option<Duration>,
    at: Option<Instant>,
}

impl Deadline {
    /// A negative `timeout_secs` means the session never times out.
    pub fn new(timeout_secs: f64, now: Instant) -> Self {
        let timeout = (timeout_secs >= 0.0).then(|| Duration::from_secs_f64(timeout_secs));
        Self {
            timeout,
            at: timeout.map(|t| now + t),
        }
    }

    /// Keep-alive: the deadline becomes `now + timeout`.
    pub fn extend_from(&mut self, now: Instant) {
        if let Some(t) = self.timeout {
            self.at = Some(now + t);
        }
    }

    pub fn expired(&self, now: Instant) -> bool {
        self.at.is_some_and(|at| now >= at)
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(now))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The session-active flag was cleared
    Stopped,
    TimedOut,
    /// Capture kept failing after every retry
    CaptureFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub end: SessionEnd,
    /// Spell names in dispatch order
    pub dispatched: Vec<String>,
    /// False when no wand tip was ever seen
    pub ever_tracked: bool,
    pub frames: u64,
}

/// Flash the lamp to mark a session boundary.
async fn cue(dispatcher: &Dispatcher, which: &str) {
    if let Err(e) = dispatcher.cast(Spell::Lumos, CastOptions::flash()).await {
        tracing::warn!(which, "session cue failed: {e}");
    }
}

/// One wand-tracking run: camera, scenes, gestures and dispatch.
pub struct Session<C, O> {
    camera: Arc<C>,
    optics: O,
    dispatcher: Arc<Dispatcher>,
    classifier: Arc<GestureClassifier>,
    config: SessionConfig,
    finder: PointFinder,
    tracker: PointTracker,
    debug_image: bool,
}

impl<C, O> Session<C, O>
where
    C: Camera,
    O: Optics<<C::Source as FrameSource>::Frame>,
{
    pub fn new(
        camera: Arc<C>,
        optics: O,
        dispatcher: Arc<Dispatcher>,
        classifier: Arc<GestureClassifier>,
        config: SessionConfig,
    ) -> Self {
        Self {
            camera,
            optics,
            dispatcher,
            classifier,
            finder: PointFinder::new(config.max_points),
            tracker: PointTracker::new(),
            config,
            debug_image: false,
        }
    }

    /// Publish annotated frames to the store.
    pub fn with_debug_image(mut self, enabled: bool) -> Self {
        self.debug_image = enabled;
        self
    }

    /// Run until timeout, stop or persistent capture failure.
    ///
    /// Fails only when the camera cannot be opened; the session then never
    /// becomes active. Must run on a multi-threaded runtime.
    pub async fn run(mut self, timeout_secs: f64) -> Result<SessionReport, VisionError> {
        let camera = Arc::clone(&self.camera);
        let mut source = tokio::task::block_in_place(|| camera.open())?;

        let state = self.dispatcher.state().clone();
        if let Err(e) = state.set_session_active(true).await {
            tracing::warn!("session flag: {e}");
        }
        cue(&self.dispatcher, "start").await;
        tracing::info!(timeout_secs, "session started");

        let report = self.track(&mut source, timeout_secs).await;
        drop(source);

        if let Err(e) = state.set_session_active(false).await {
            tracing::warn!("session flag: {e}");
        }
        cue(&self.dispatcher, "end").await;
        if !report.ever_tracked {
            tracing::info!("session ended without seeing a wand");
        }
        tracing::info!(end = ?report.end, frames = report.frames, spells = report.dispatched.len(), "session ended");
        Ok(report)
    }

    async fn track(&mut self, source: &mut C::Source, timeout_secs: f64) -> SessionReport {
        let state = self.dispatcher.state().clone();
        let scene_length = self.config.scene_length();
        let gesture_slots = self.config.max_gesture_points;

        let mut deadline = Deadline::new(timeout_secs, Instant::now());
        let mut ticker = time::interval(self.config.frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut scene: Option<Scene<<C::Source as FrameSource>::Frame>> = None;
        let mut failures: u32 = 0;
        let mut report = SessionReport {
            end: SessionEnd::Stopped,
            dispatched: Vec::new(),
            ever_tracked: false,
            frames: 0,
        };

        let end = loop {
            ticker.tick().await;
            match state.is_session_active().await {
                Ok(false) => break SessionEnd::Stopped,
                Ok(true) => {}
                Err(e) => tracing::warn!("session flag: {e}"),
            }
            if deadline.expired(Instant::now()) {
                break SessionEnd::TimedOut;
            }

            let raw = match tokio::task::block_in_place(|| source.read()) {
                Ok(frame) => {
                    failures = 0;
                    frame
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(failures, "{e}");
                    if failures >= self.config.max_capture_failures {
                        break SessionEnd::CaptureFailed;
                    }
                    scene = None;
                    time::sleep(self.config.capture_backoff(failures)).await;
                    continue;
                }
            };
            report.frames += 1;

            let prepared = match self.optics.prepare(&raw) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!("frame skipped: {e}");
                    continue;
                }
            };

            let due = scene.as_ref().map_or(true, |s| s.age() >= scene_length);
            if due {
                let points = self.finder.find(&mut self.optics, &prepared).unwrap_or_else(|e| {
                    tracing::warn!("point search failed: {e}");
                    Vec::new()
                });
                if points.is_empty() {
                    scene = None;
                    tracing::debug!("no points, retrying");
                    let mut delay = self.config.reseed_delay();
                    if let Some(left) = deadline.remaining(Instant::now()) {
                        delay = delay.min(left);
                    }
                    time::sleep(delay).await;
                    continue;
                }
                tracing::debug!(points = points.len(), "scene reseeded");
                report.ever_tracked = true;
                scene = Some(Scene::new(prepared, points));
                continue;
            }
            let Some(current) = scene.as_mut() else {
                continue;
            };

            let positions = current.positions();
            let advanced =
                match self
                    .tracker
                    .advance(&mut self.optics, current.reference(), &prepared, &positions)
                {
                    Ok(advanced) => advanced,
                    Err(e) => {
                        tracing::warn!("tracking step skipped: {e}");
                        continue;
                    }
                };
            let moves = current.step(prepared, advanced);

            for mv in moves.iter().filter(|m| m.slot < gesture_slots) {
                let Some(point) = current.slot_mut(mv.slot) else {
                    continue;
                };
                let Some(name) = self.classifier.classify(mv.to, mv.from, &mut point.history) else {
                    continue;
                };
                let name = name.to_string();
                if self.dispatcher.dispatch(&name).await.is_some() {
                    tracing::info!(slot = mv.slot, spell = %name, "spell cast");
                    deadline.extend_from(Instant::now());
                    report.dispatched.push(name);
                }
            }

            if self.debug_image {
                match self.optics.annotate(&raw, &current.markers(&moves)) {
                    Ok(Some(image)) => {
                        if let Err(e) = state.set_debug_image(image).await {
                            tracing::debug!("debug image: {e}");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::debug!("annotate failed: {e}"),
                }
            }
        };
        report.end = end;
        report
    }
}
