//! Light animations and their cooperative preemption.
//!
//! Every routine moves through `starting -> running -> (completing | preempted)
//! -> terminated`. Before each write to the shared color a routine re-checks
//! that the lights flag is still on (except `nox`, which turns it off) and that
//! the action token still names it; a routine that fails the check returns at
//! once and leaves the light to whoever owns it now.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use super::{Rgb, Spell};
use crate::config::SpellConfig;
use crate::error::StoreError;
use crate::light::LightStrip;
use crate::store::SharedState;

/// How an animation task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ran to the end, including the closing `nox`
    Completed,
    /// A newer action took the token or switched the lights off
    Preempted,
    /// The dispatcher is shutting down
    Cancelled,
    /// A store error forced the fallback `nox`
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CastOptions {
    /// Overrides the configured lumos hold. Zero makes a status flash.
    pub hold: Option<Duration>,
}

impl CastOptions {
    pub fn flash() -> Self {
        Self {
            hold: Some(Duration::ZERO),
        }
    }
}

macro_rules! bail_unless_owner {
    ($self:ident, $owner:expr, $cancel:expr) => {{
        let owner: Spell = $owner;
        if let Some(outcome) = $self.check(owner, $cancel, owner != Spell::Nox).await? {
            tracing::debug!(spell = %owner, ?outcome, "animation stopped");
            return Ok(outcome);
        }
    }};
}

#[derive(Clone)]
pub struct Animator {
    state: SharedState,
    strip: Arc<dyn LightStrip>,
    config: Arc<SpellConfig>,
    shutdown: CancellationToken,
}

impl Animator {
    pub fn new(
        state: SharedState,
        strip: Arc<dyn LightStrip>,
        config: SpellConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            state,
            strip,
            config: Arc::new(config),
            shutdown,
        }
    }

    /// Run `spell` to its end. Never fails: errors fall back to `nox`.
    pub async fn run(&self, spell: Spell, options: CastOptions, cancel: CancellationToken) -> Outcome {
        tracing::info!(%spell, "animation starting");
        let started = Instant::now();
        let result = match spell {
            Spell::Lumos => {
                let hold = options.hold.unwrap_or_else(|| self.config.lumos_hold());
                self.lumos(hold, &cancel).await
            }
            Spell::Nox => self.nox(&cancel).await,
            Spell::Incendio => {
                let total = Duration::from_secs_f64(self.config.incendio_secs.max(0.0));
                let interval = Duration::from_millis(self.config.flicker_interval_ms);
                self.effect(spell, total, interval, &cancel).await
            }
            Spell::Colovaria => {
                let total = Duration::from_secs_f64(self.config.colovaria_secs.max(0.0));
                let interval = Duration::from_millis(self.config.cycle_interval_ms);
                self.effect(spell, total, interval, &cancel).await
            }
        };

        match result {
            Ok(outcome) => {
                tracing::info!(
                    %spell,
                    ?outcome,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "animation terminated"
                );
                outcome
            }
            Err(e) => {
                tracing::warn!(%spell, "animation failed: {e}, falling back to nox");
                self.recover(&cancel).await
            }
        }
    }

    async fn recover(&self, cancel: &CancellationToken) -> Outcome {
        if let Err(e) = self.force_nox(cancel).await {
            tracing::error!("nox fallback failed: {e}");
        }
        Outcome::Failed
    }

    async fn force_nox(&self, cancel: &CancellationToken) -> Result<Outcome, StoreError> {
        self.state.set_current_action(Spell::Nox.name()).await?;
        self.nox(cancel).await
    }

    /// `None` while `owner` may keep writing.
    async fn check(
        &self,
        owner: Spell,
        cancel: &CancellationToken,
        require_lights: bool,
    ) -> Result<Option<Outcome>, StoreError> {
        if cancel.is_cancelled() {
            let outcome = if self.shutdown.is_cancelled() {
                Outcome::Cancelled
            } else {
                Outcome::Preempted
            };
            return Ok(Some(outcome));
        }
        if require_lights && !self.state.lights_active().await? {
            return Ok(Some(Outcome::Preempted));
        }
        if self.state.current_action().await? != owner.name() {
            return Ok(Some(Outcome::Preempted));
        }
        Ok(None)
    }

    async fn paint(&self, color: Rgb) -> Result<(), StoreError> {
        self.state.set_current_color(color).await?;
        if let Err(e) = self.strip.fill(color) {
            tracing::warn!("light strip: {e:#}");
        }
        Ok(())
    }

    /// Claim the lights for a routine that is about to run.
    async fn light_up(&self, owner: Spell, cancel: &CancellationToken) -> Result<Option<Outcome>, StoreError> {
        if let Some(outcome) = self.check(owner, cancel, false).await? {
            return Ok(Some(outcome));
        }
        self.state.set_lights_active(true).await?;
        Ok(None)
    }

    /// Clear the lights flag on behalf of `nox`. A spell that took the token
    /// between the owner check and the write gets its lights back.
    async fn lights_off(&self) -> Result<Option<Outcome>, StoreError> {
        self.state.set_lights_active(false).await?;
        let owner = self.state.current_action().await?;
        if owner == Spell::Nox.name() {
            return Ok(None);
        }
        if owner.parse::<Spell>().is_ok() {
            self.state.set_lights_active(true).await?;
        }
        tracing::debug!(%owner, "nox lost the token while switching off");
        Ok(Some(Outcome::Preempted))
    }

    /// Pass the token from `from` to `nox` and fade out, unless someone else holds it.
    async fn hand_off_to_nox(&self, from: Spell, cancel: &CancellationToken) -> Result<Outcome, StoreError> {
        if !self
            .state
            .replace_current_action(from.name(), Spell::Nox.name())
            .await?
        {
            return Ok(Outcome::Preempted);
        }
        self.nox(cancel).await
    }

    async fn lumos(&self, hold: Duration, cancel: &CancellationToken) -> Result<Outcome, StoreError> {
        let me = Spell::Lumos;
        if let Some(outcome) = self.light_up(me, cancel).await? {
            return Ok(outcome);
        }

        let steps = self.config.ramp_steps.max(1);
        let step = self.config.ramp_step();
        let target = self.config.lumos_color;
        for i in 1..=steps {
            bail_unless_owner!(self, me, cancel);
            self.paint(Rgb::BLACK.lerp(target, i as f32 / steps as f32)).await?;
            sleep(step).await;
        }

        let poll = Duration::from_millis(self.config.hold_poll_ms.max(1));
        let until = Instant::now() + hold;
        loop {
            let now = Instant::now();
            if now >= until {
                break;
            }
            bail_unless_owner!(self, me, cancel);
            sleep(poll.min(until - now)).await;
        }

        bail_unless_owner!(self, me, cancel);
        self.hand_off_to_nox(me, cancel).await
    }

    async fn nox(&self, cancel: &CancellationToken) -> Result<Outcome, StoreError> {
        let me = Spell::Nox;
        if let Some(outcome) = self.check(me, cancel, false).await? {
            return Ok(outcome);
        }
        if let Some(outcome) = self.lights_off().await? {
            return Ok(outcome);
        }
        let from = self.state.current_color().await?;

        let steps = self.config.nox_steps.max(1);
        let step = Duration::from_millis(self.config.nox_step_ms);
        for i in 1..=steps {
            bail_unless_owner!(self, me, cancel);
            self.paint(from.dim((steps - i) as f32 / steps as f32)).await?;
            sleep(step).await;
        }

        bail_unless_owner!(self, me, cancel);
        self.paint(Rgb::BLACK).await?;
        if let Some(outcome) = self.lights_off().await? {
            return Ok(outcome);
        }
        self.state.replace_current_action(me.name(), "").await?;
        Ok(Outcome::Completed)
    }

    /// Flicker (`incendio`) or color cycle (`colovaria`) for `total`, then `nox`.
    async fn effect(
        &self,
        me: Spell,
        total: Duration,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<Outcome, StoreError> {
        if let Some(outcome) = self.light_up(me, cancel).await? {
            return Ok(outcome);
        }

        let blend_steps = self.config.blend_steps.max(1);
        let blend_step = Duration::from_millis(self.config.blend_step_ms);
        let mut remaining = total;
        while !remaining.is_zero() {
            bail_unless_owner!(self, me, cancel);
            let from = self.state.current_color().await?;
            let to = next_color(me);
            for i in 0..blend_steps {
                bail_unless_owner!(self, me, cancel);
                self.paint(from.lerp(to, i as f32 / blend_steps as f32)).await?;
                sleep(blend_step).await;
            }
            bail_unless_owner!(self, me, cancel);
            self.paint(to).await?;
            sleep(interval).await;
            remaining = remaining.saturating_sub(interval.max(Duration::from_millis(1)));
        }

        bail_unless_owner!(self, me, cancel);
        self.hand_off_to_nox(me, cancel).await
    }
}

fn next_color(spell: Spell) -> Rgb {
    let mut rng = rand::thread_rng();
    match spell {
        Spell::Colovaria => Rgb::from_hue(rng.gen_range(0.0..360.0)),
        _ => Rgb::new(rng.gen_range(100..=255), rng.gen_range(0..=40), 0),
    }
}
