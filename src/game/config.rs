use bevy::prelude::*;
use bevy_common_assets::ron::RonAssetPlugin;
use serde::{Deserialize, Serialize};

use crate::game::engine::collision::CollisionSystem;
use crate::game::systems::state::StateSystem;

pub const INITIAL_CONFIG_PATH: &str = "assets/initial_config.ron";

/// Static configuration read once before the game is built. Every client of
/// a match must use the same values or map generation and movement diverge.
#[derive(Resource, Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct InitialConfig {
    // Simulation
    pub tick_rate: f64,
    pub seed: u64,

    // Terrain
    pub grid_width: u32,
    pub grid_height: u32,
    pub cell_size: f32,

    // Collision index
    pub quad_tree_max_objects: usize,
    pub quad_tree_max_depth: usize,

    // View (level of detail and collision limit)
    pub view_width: f32,
    pub view_height: f32,
    pub view_margin: f32,

    // Players
    pub player_speed: f32,
    pub player_width: f32,
    pub player_height: f32,
    pub parachute_altitude: f32,
    pub parachute_duration_ms: f64,

    // Snowballs
    pub snowball_size: f32,
    pub snowball_max_distance: f32,
    pub snowball_max_ticks: f32,
    pub snowball_skew_degrees: f32,
    pub powerup_quantity: u32,

    // Removal
    pub teleport_delay_ms: f64,
    pub teleport_duration_ms: f64,
    pub iceberg_speed: f32,

    // Drops
    pub drop_radius: f32,
    pub drop_spin_ms: f64,

    // Effects
    pub splat_lifetime_ms: f64,
    pub trail_length: usize,

    // Client
    pub game_over_delay_ms: f64,

    // Bots
    pub bot_scan_radius: f32,
    pub bot_throw_cooldown_ticks: u64,
    pub bot_wander_chance: f64,
    pub bot_wander_radius: u32,

    // Local level
    pub local_bot_count: usize,
    pub local_erode_interval_ticks: u64,
    pub local_drop_interval_ticks: u64,

    // Match
    pub max_population: u32,

    // Network
    pub network_inbox_capacity: usize,
}

impl Default for InitialConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            seed: 1,
            grid_width: 64,
            grid_height: 64,
            cell_size: 64.0,
            quad_tree_max_objects: 10,
            quad_tree_max_depth: 6,
            view_width: 1280.0,
            view_height: 720.0,
            view_margin: 256.0,
            player_speed: 2.25,
            player_width: 15.0,
            player_height: 45.0,
            parachute_altitude: 512.0,
            parachute_duration_ms: 2000.0,
            snowball_size: 12.0,
            snowball_max_distance: 256.0,
            snowball_max_ticks: 42.0,
            snowball_skew_degrees: 15.0,
            powerup_quantity: 3,
            teleport_delay_ms: 1500.0,
            teleport_duration_ms: 700.0,
            iceberg_speed: 1.5,
            drop_radius: 10.0,
            drop_spin_ms: 300.0,
            splat_lifetime_ms: 1000.0,
            trail_length: 8,
            game_over_delay_ms: 2500.0,
            bot_scan_radius: 256.0,
            bot_throw_cooldown_ticks: 90,
            bot_wander_chance: 0.02,
            bot_wander_radius: 6,
            local_bot_count: 15,
            local_erode_interval_ticks: 120,
            local_drop_interval_ticks: 900,
            max_population: 100,
            network_inbox_capacity: 1024,
        }
    }
}

impl InitialConfig {
    /// Parse a RON config file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(ron::from_str::<InitialConfig>(&contents)?)
    }

    /// Like [`InitialConfig::load`], falling back to defaults on any failure.
    pub fn load_or_default(path: &str) -> Self {
        match Self::load(path) {
            Ok(config) => {
                info!("Loaded initial config from {}", path);
                config
            }
            Err(e) => {
                error!("Failed to load initial config from {}: {}", path, e);
                error!("Using default InitialConfig");
                Self::default()
            }
        }
    }

    /// Converts a wall-clock duration to whole ticks, rounding up.
    pub fn ms_to_ticks(&self, ms: f64) -> u64 {
        (ms * self.tick_rate / 1000.0).ceil().max(0.0) as u64
    }
}

/// Runtime configuration that can be hot-reloaded while a match runs.
/// Nothing here may affect simulation results.
#[derive(Deserialize, Serialize, Asset, TypePath, Clone, Debug)]
pub struct GameConfig {
    pub debug_collisions: bool,
    pub population_log_interval_ticks: u64,
}

#[derive(Resource)]
pub struct GameConfigHandle(pub Handle<GameConfig>);

/// Loads `game_config.ron` through the asset server and applies changes.
/// Requires `AssetPlugin`.
pub struct GameConfigPlugin;

impl Plugin for GameConfigPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(RonAssetPlugin::<GameConfig>::new(&["game_config.ron"]))
            .add_systems(Startup, setup_runtime_config)
            .add_systems(Update, apply_runtime_config);
    }
}

fn setup_runtime_config(mut commands: Commands, asset_server: Res<AssetServer>) {
    let handle = asset_server.load("game_config.ron");
    commands.insert_resource(GameConfigHandle(handle));
}

fn apply_runtime_config(
    config_handle: Option<Res<GameConfigHandle>>,
    game_configs: Res<Assets<GameConfig>>,
    mut events: MessageReader<AssetEvent<GameConfig>>,
    mut collisions: ResMut<CollisionSystem>,
    mut state: ResMut<StateSystem>,
) {
    let Some(config_handle) = config_handle else { return };

    for event in events.read() {
        if event.is_modified(config_handle.0.id())
            || event.is_loaded_with_dependencies(config_handle.0.id())
        {
            if let Some(config) = game_configs.get(&config_handle.0) {
                collisions.set_debug_visuals(config.debug_collisions);
                state.log_interval_ticks = config.population_log_interval_ticks;
                info!(
                    "Applied runtime config: debug_collisions={} population_log_interval={}",
                    config.debug_collisions, config.population_log_interval_ticks
                );
            }
        }
    }
}
