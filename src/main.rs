use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use wandlight::config::Config;
use wandlight::illuminator::{Illuminator, NullIlluminator};
use wandlight::lamp::WandLamp;
use wandlight::light::{LightStrip, NullStrip};
use wandlight::logging;
use wandlight::spell::{Dispatcher, Spell};
use wandlight::store::{MemoryStore, RemoteStore, SharedState, StateStore};
use wandlight::vision::opencv::{OpenCvCamera, OpenCvOptics};

const CONFIG_PATH: &str = "config.toml";

type Lamp = WandLamp<OpenCvCamera, OpenCvOptics>;

#[cfg(feature = "gpio")]
fn illuminator(config: &Config) -> Arc<dyn Illuminator> {
    let Some(pin) = config.illuminator.pin else {
        return Arc::new(NullIlluminator);
    };
    match wandlight::illuminator::GpioIlluminator::new(pin) {
        Ok(gpio) => Arc::new(gpio),
        Err(e) => {
            tracing::warn!("illuminator disabled: {e:#}");
            Arc::new(NullIlluminator)
        }
    }
}

#[cfg(not(feature = "gpio"))]
fn illuminator(_config: &Config) -> Arc<dyn Illuminator> {
    Arc::new(NullIlluminator)
}

#[cfg(feature = "gpio")]
fn light_strip(config: &Config) -> Arc<dyn LightStrip> {
    let Some(bus) = config.light.spi_bus else {
        return Arc::new(NullStrip);
    };
    match wandlight::light::SpiStrip::new(bus, config.light.count) {
        Ok(strip) => Arc::new(strip),
        Err(e) => {
            tracing::warn!("light strip disabled: {e:#}");
            Arc::new(NullStrip)
        }
    }
}

#[cfg(not(feature = "gpio"))]
fn light_strip(_config: &Config) -> Arc<dyn LightStrip> {
    Arc::new(NullStrip)
}

async fn open_store(config: &Config) -> Result<Arc<dyn StateStore>> {
    Ok(match &config.store.remote {
        Some(addr) => {
            let store = RemoteStore::connect(addr)
                .await
                .with_context(|| format!("failed to reach state server {addr}"))?;
            tracing::info!(addr = %addr, "using remote state");
            Arc::new(store)
        }
        None => Arc::new(MemoryStore::new()),
    })
}

fn print_help() {
    println!("Commands:");
    println!("  start [secs]   - watch for spells (negative = no timeout)");
    println!("  stop           - stop watching");
    println!("  cast <spell>   - {}", Spell::ALL.map(|s| s.name()).join(" | "));
    println!("  status         - show shared state");
    println!("  q              - quit");
}

async fn status(lamp: &Lamp) -> Result<()> {
    let state = lamp.dispatcher().state();
    println!("  session: {}", if state.is_session_active().await? { "on" } else { "off" });
    println!("  lights:  {}", if state.lights_active().await? { "on" } else { "off" });
    println!("  action:  {:?}", state.current_action().await?);
    let c = state.current_color().await?;
    println!("  color:   [{}, {}, {}]", c.r, c.g, c.b);
    println!("  running: {}", lamp.dispatcher().running());
    Ok(())
}

async fn handle(lamp: &Lamp, line: &str) -> Result<bool> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        [] => {}
        ["start"] => {
            if !lamp.request_session_start(None) {
                println!("session not started");
            }
        }
        ["start", secs] => {
            let secs: f64 = secs.parse().with_context(|| format!("bad timeout {secs:?}"))?;
            if !lamp.request_session_start(Some(secs)) {
                println!("session not started");
            }
        }
        ["stop"] => {
            if !lamp.request_session_stop().await {
                println!("no active session");
            }
        }
        ["cast", name] => {
            if !lamp.dispatch_spell(name).await {
                println!("unknown spell: {name}");
            }
        }
        ["status"] => status(lamp).await?,
        ["q"] | ["quit"] => return Ok(false),
        _ => print_help(),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_path = logging::init("wandlight")?;
    let config = Config::load_or_default(CONFIG_PATH);
    tracing::info!(version = env!("GIT_VERSION"), log = %log_path.display(), "wandlight starting");

    let state = SharedState::new(open_store(&config).await?, &config.store.namespace)
        .with_illuminator(illuminator(&config));
    state.initialize().await.context("failed to reset shared state")?;

    let dispatcher = Arc::new(Dispatcher::new(state, light_strip(&config), config.spells.clone()));
    let camera_config = config.camera.clone();
    let lamp: Lamp = WandLamp::new(
        OpenCvCamera::new(config.camera.clone()),
        move || OpenCvOptics::new(&camera_config),
        dispatcher,
        &config,
    );

    println!("=== wandlight {} ===", env!("GIT_VERSION"));
    println!("namespace: {}", config.store.namespace);
    print_help();

    if config.session.watch_on_start {
        lamp.request_session_start(None);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        match handle(&lamp, line.trim()).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("error: {e:#}"),
        }
    }

    tracing::info!("shutting down");
    lamp.shutdown().await;
    Ok(())
}
