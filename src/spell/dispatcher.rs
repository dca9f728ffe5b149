use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::{Animator, CastOptions, Outcome, Spell};
use crate::config::SpellConfig;
use crate::error::StoreError;
use crate::light::LightStrip;
use crate::store::SharedState;

/// Starts spell animations as independent tasks.
///
/// Casting never waits for the animation. The newest cast takes the action
/// token first; older tasks notice on their next step and stop themselves.
pub struct Dispatcher {
    state: SharedState,
    animator: Animator,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    /// Token of the most recently started task
    current: Mutex<CancellationToken>,
}

impl Dispatcher {
    pub fn new(state: SharedState, strip: Arc<dyn LightStrip>, config: SpellConfig) -> Self {
        let shutdown = CancellationToken::new();
        let animator = Animator::new(state.clone(), strip, config, shutdown.clone());
        Self {
            state,
            animator,
            tracker: TaskTracker::new(),
            current: Mutex::new(shutdown.child_token()),
            shutdown,
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Cast by name. Unknown names are ignored and return `None`.
    pub async fn dispatch(&self, name: &str) -> Option<JoinHandle<Outcome>> {
        let spell = match name.parse::<Spell>() {
            Ok(spell) => spell,
            Err(e) => {
                tracing::debug!("dispatch ignored: {e}");
                return None;
            }
        };
        match self.cast(spell, CastOptions::default()).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(%spell, "dispatch failed: {e}");
                None
            }
        }
    }

    /// Take the action token for `spell`, then start its animation.
    pub async fn cast(&self, spell: Spell, options: CastOptions) -> Result<JoinHandle<Outcome>, StoreError> {
        self.state.set_current_action(spell.name()).await?;

        let token = self.shutdown.child_token();
        let previous = {
            let mut current = self.current.lock().map_err(|_| StoreError::Poisoned)?;
            std::mem::replace(&mut *current, token.clone())
        };
        previous.cancel();

        tracing::info!(%spell, "cast");
        let animator = self.animator.clone();
        Ok(self
            .tracker
            .spawn(async move { animator.run(spell, options, token).await }))
    }

    /// Number of animation tasks still running.
    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every running animation to finish on its own.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancel every animation and wait for them to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::RecordingStrip;
    use crate::spell::Rgb;
    use std::time::Duration;
    use tokio::time::{sleep, timeout, Instant};

    fn quick_config() -> SpellConfig {
        SpellConfig {
            lumos_secs: 10.0,
            incendio_secs: 10.0,
            colovaria_secs: 10.0,
            ramp_secs: 0.02,
            ramp_steps: 4,
            nox_steps: 8,
            nox_step_ms: 2,
            flicker_interval_ms: 5,
            cycle_interval_ms: 5,
            blend_steps: 3,
            blend_step_ms: 2,
            hold_poll_ms: 5,
            lumos_color: Rgb::WHITE,
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<RecordingStrip>) {
        let strip = Arc::new(RecordingStrip::new());
        let d = Dispatcher::new(SharedState::in_memory("disp"), strip.clone(), quick_config());
        (d, strip)
    }

    #[tokio::test]
    async fn test_unknown_spell_is_noop() {
        let (d, strip) = dispatcher();
        assert!(d.dispatch("expelliarmus").await.is_none());
        assert_eq!(d.state().current_action().await.unwrap(), "");
        assert_eq!(d.running(), 0);
        assert!(strip.colors().is_empty());
    }

    #[tokio::test]
    async fn test_token_written_before_task_runs() {
        let (d, _strip) = dispatcher();
        let handle = d.dispatch("lumos").await.unwrap();
        assert_eq!(d.state().current_action().await.unwrap(), "lumos");
        d.shutdown().await;
        assert_eq!(handle.await.unwrap(), Outcome::Cancelled);
    }

    #[tokio::test]
    async fn test_dispatch_returns_immediately() {
        let (d, _strip) = dispatcher();
        let start = Instant::now();
        let _ = d.dispatch("incendio").await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
        d.shutdown().await;
    }

    #[tokio::test]
    async fn test_nox_preempts_incendio_and_stays_black() {
        let (d, strip) = dispatcher();
        let fire = d.dispatch("incendio").await.unwrap();
        sleep(Duration::from_millis(40)).await;
        assert!(!d.state().current_color().await.unwrap().is_black());

        let nox = d.dispatch("nox").await.unwrap();
        let fire_outcome = timeout(Duration::from_secs(1), fire).await.unwrap().unwrap();
        assert_eq!(fire_outcome, Outcome::Preempted);
        let nox_outcome = timeout(Duration::from_secs(1), nox).await.unwrap().unwrap();
        assert_eq!(nox_outcome, Outcome::Completed);

        let settled = strip.colors().len();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(d.state().current_color().await.unwrap(), Rgb::BLACK);
        assert_eq!(strip.colors().len(), settled, "nothing may paint after nox finished");
        assert_eq!(strip.last(), Some(Rgb::BLACK));
        assert_eq!(d.state().current_action().await.unwrap(), "");
        assert!(!d.state().lights_active().await.unwrap());
    }

    #[tokio::test]
    async fn test_recast_same_spell_supersedes_older_task() {
        let (d, _strip) = dispatcher();
        let first = d.dispatch("colovaria").await.unwrap();
        sleep(Duration::from_millis(20)).await;
        let second = d.dispatch("colovaria").await.unwrap();
        let outcome = timeout(Duration::from_secs(1), first).await.unwrap().unwrap();
        assert_eq!(outcome, Outcome::Preempted);
        assert!(!second.is_finished());
        d.shutdown().await;
    }

    #[tokio::test]
    async fn test_drain_waits_for_natural_end() {
        let strip = Arc::new(RecordingStrip::new());
        let mut config = quick_config();
        config.lumos_secs = 0.0;
        let d = Dispatcher::new(SharedState::in_memory("drain"), strip.clone(), config);
        let handle = d.dispatch("lumos").await.unwrap();
        timeout(Duration::from_secs(2), d.drain()).await.unwrap();
        assert!(handle.is_finished());
        assert_eq!(d.state().current_action().await.unwrap(), "");
        assert_eq!(strip.last(), Some(Rgb::BLACK));
    }
}
