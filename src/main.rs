use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use snowball::game::config::{GameConfigPlugin, InitialConfig, INITIAL_CONFIG_PATH};
use snowball::game::engine::clock::Clock;
use snowball::game::events::HostEvent;
use snowball::game::SnowballGamePlugin;

/// Ten minutes of play at the default tick rate.
const MAX_TICKS: u64 = 36_000;

fn setup_file_logging() -> anyhow::Result<String> {
    let log_dir = PathBuf::from("logs");
    fs::create_dir_all(&log_dir)?;

    // Keep the last 25 runs
    cleanup_old_logs(&log_dir, 25);

    let now = chrono::Local::now();
    let log_filename = format!("snowball_{}.log", now.format("%Y%m%d_%H%M%S"));
    let log_path = log_dir.join(&log_filename).to_string_lossy().to_string();

    let file_appender = RollingFileAppender::new(Rotation::NEVER, &log_dir, &log_filename);
    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bevy_ecs=info,bevy_asset=warn,snowball=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()?;

    Ok(log_path)
}

fn cleanup_old_logs(log_dir: &Path, keep_count: usize) {
    let Ok(entries) = fs::read_dir(log_dir) else { return };

    let mut log_files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|s| s.starts_with("snowball") && s.ends_with(".log"))
        })
        .collect();

    // Oldest first
    log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

    if log_files.len() > keep_count {
        for file in log_files.iter().take(log_files.len() - keep_count) {
            let _ = fs::remove_file(file.path());
        }
    }
}

fn exit_when_decided(
    clock: Res<Clock>,
    mut host: MessageReader<HostEvent>,
    mut exit: MessageWriter<AppExit>,
) {
    for event in host.read() {
        if let HostEvent::Winner { id } = event {
            info!("{} won after {} ticks", id, clock.tick());
            exit.write(AppExit::Success);
            return;
        }
    }

    if clock.tick() >= MAX_TICKS {
        info!("No winner after {} ticks", MAX_TICKS);
        exit.write(AppExit::Success);
    }
}

fn main() -> anyhow::Result<()> {
    let log_file = setup_file_logging()?;
    println!("Snowball (headless local match), logging to {}", log_file);

    let config = InitialConfig::load_or_default(INITIAL_CONFIG_PATH);
    let frame = Duration::from_secs_f64(1.0 / config.tick_rate);

    App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(frame)))
        .add_plugins(AssetPlugin::default())
        .add_plugins(GameConfigPlugin)
        .add_plugins(SnowballGamePlugin::local(config))
        .add_systems(Update, exit_when_decided)
        .run();

    Ok(())
}
