use bevy::ecs::message::Messages;
use bevy::prelude::*;

pub mod components;
pub mod config;
pub mod engine;
pub mod events;
pub mod level;
pub mod map;
pub mod protocol;
pub mod systems;

use config::InitialConfig;
use engine::clock::{advance_clock, Clock};
use engine::collision::{collision_update, CollisionEvent, CollisionSystem};
use engine::hex_grid::HexGrid;
use events::HostEvent;
use level::{local_level_update, LocalLevel};
use systems::bot::{bot_update, BotSystem};
use systems::client::{client_update, ClientSystem};
use systems::drop::{drop_update, DropSystem};
use systems::effect::{effect_update, EffectSystem};
use systems::entity_removal::{entity_removal_update, EntityRemovalSystem};
use systems::lod::{lod_update, LodSystem};
use systems::map::{map_update, MapSystem};
use systems::network::{network_update, NetworkSystem};
use systems::parachute::{parachute_update, ParachuteSystem};
use systems::player::{player_update, PlayerSystem};
use systems::snowball::{snowball_update, SnowballSystem};
use systems::state::{state_update, StateSystem};

/// Per-frame order of the game systems. Every set sees the settled results
/// of the sets before it.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub enum GameSet {
    Clock,
    Level,
    Collision,
    Lod,
    Snowball,
    EntityRemoval,
    Drop,
    Parachute,
    Effect,
    Map,
    Client,
    Network,
    Bot,
    Player,
    State,
}

/// Registers every game resource, message and system in `FixedUpdate`.
pub struct SnowballGamePlugin {
    pub config: InitialConfig,
    /// Drive the match locally (map, bots, erosion and drops) instead of
    /// waiting for a server reset.
    pub local_match: bool,
}

impl SnowballGamePlugin {
    pub fn new(config: InitialConfig) -> Self {
        Self { config, local_match: false }
    }

    pub fn local(config: InitialConfig) -> Self {
        Self { config, local_match: true }
    }
}

impl Plugin for SnowballGamePlugin {
    fn build(&self, app: &mut App) {
        let config = self.config.clone();
        let grid = HexGrid::new(config.grid_width, config.grid_height, config.cell_size);

        app.insert_resource(Time::<Fixed>::from_seconds(1.0 / config.tick_rate));

        app.insert_resource(Clock::new(config.tick_rate))
            .insert_resource(CollisionSystem::new(
                config.quad_tree_max_objects,
                config.quad_tree_max_depth,
            ))
            .insert_resource(MapSystem::new(grid))
            .insert_resource(LodSystem::new(&config))
            .insert_resource(PlayerSystem::new(&config))
            .insert_resource(SnowballSystem::new(config.seed))
            .insert_resource(BotSystem::new(config.seed))
            .insert_resource(DropSystem::new(config.seed))
            .insert_resource(NetworkSystem::new(config.network_inbox_capacity))
            .insert_resource(StateSystem::new(config.max_population))
            .insert_resource(LocalLevel::new(&config, self.local_match))
            .init_resource::<EntityRemovalSystem>()
            .init_resource::<ParachuteSystem>()
            .init_resource::<EffectSystem>()
            .init_resource::<ClientSystem>()
            .insert_resource(config);

        app.add_message::<CollisionEvent>();
        app.add_message::<HostEvent>();

        app.configure_sets(
            FixedUpdate,
            (
                GameSet::Clock,
                GameSet::Level,
                GameSet::Collision,
                GameSet::Lod,
                GameSet::Snowball,
                GameSet::EntityRemoval,
                GameSet::Drop,
                GameSet::Parachute,
                GameSet::Effect,
                GameSet::Map,
                GameSet::Client,
                GameSet::Network,
                GameSet::Bot,
                GameSet::Player,
                GameSet::State,
            )
                .chain(),
        );

        app.add_systems(
            FixedUpdate,
            (
                advance_clock.in_set(GameSet::Clock),
                local_level_update.in_set(GameSet::Level),
                collision_update.in_set(GameSet::Collision),
                lod_update.in_set(GameSet::Lod),
                snowball_update.in_set(GameSet::Snowball),
                entity_removal_update.in_set(GameSet::EntityRemoval),
                drop_update.in_set(GameSet::Drop),
                parachute_update.in_set(GameSet::Parachute),
                effect_update.in_set(GameSet::Effect),
                map_update.in_set(GameSet::Map),
                client_update.in_set(GameSet::Client),
                network_update.in_set(GameSet::Network),
                bot_update.in_set(GameSet::Bot),
                player_update.in_set(GameSet::Player),
                state_update.in_set(GameSet::State),
            ),
        );
    }
}

/// Release everything a match holds: players, pooled entities, trees,
/// collision registrations and the quad-tree. Safe to call twice.
pub fn teardown(world: &mut World) {
    systems::player::clear_all_players(world);
    systems::snowball::teardown(world);
    systems::entity_removal::teardown(world);
    systems::drop::teardown(world);
    systems::parachute::teardown(world);
    systems::map::teardown(world);

    world.resource_mut::<EffectSystem>().clear();
    world.resource_mut::<ClientSystem>().release();
    world.resource_mut::<CollisionSystem>().teardown();

    info!("[GAME] Teardown complete");
}

/// A headless game instance stepped one frame at a time.
pub struct SnowballGame {
    app: App,
}

impl SnowballGame {
    /// A game that waits for server messages.
    pub fn new(config: InitialConfig) -> Self {
        Self::with_plugin(SnowballGamePlugin::new(config))
    }

    /// A game that runs a local match with bots.
    pub fn local(config: InitialConfig) -> Self {
        Self::with_plugin(SnowballGamePlugin::local(config))
    }

    fn with_plugin(plugin: SnowballGamePlugin) -> Self {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_plugins(plugin);
        app.finish();
        app.cleanup();
        Self { app }
    }

    /// Run one frame. Message buffers are swapped afterwards since the
    /// `First` schedule, which normally does it, never runs here.
    pub fn update(&mut self) {
        let world = self.app.world_mut();
        world.run_schedule(FixedUpdate);
        world.resource_mut::<Messages<CollisionEvent>>().update();
        world.resource_mut::<Messages<HostEvent>>().update();
    }

    pub fn teardown(&mut self) {
        teardown(self.app.world_mut());
    }

    pub fn tick(&self) -> u64 {
        self.app.world().resource::<Clock>().tick()
    }

    pub fn world(&self) -> &World {
        self.app.world()
    }

    pub fn world_mut(&mut self) -> &mut World {
        self.app.world_mut()
    }

    pub fn app_mut(&mut self) -> &mut App {
        &mut self.app
    }
}
