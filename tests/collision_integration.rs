use bevy::ecs::message::Messages;
use bevy::prelude::*;
use rustc_hash::FxHashSet;
use snowball::game::components::{Collider, Position};
use snowball::game::engine::clock::Clock;
use snowball::game::engine::collision::{collision_update, CollisionEvent, CollisionHandler, CollisionSystem};
use snowball::game::engine::geometry::Shape;

fn app() -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.insert_resource(Clock::default());

    let mut collisions = CollisionSystem::new(4, 6);
    collisions.set_bounds(Rect::from_center_size(Vec2::ZERO, Vec2::splat(4096.0)));
    app.insert_resource(collisions);

    app.add_message::<CollisionEvent>();
    app.add_systems(FixedUpdate, collision_update);
    app
}

fn spawn_collidable(app: &mut App, position: Vec2, shape: Shape) -> Entity {
    let entity = app.world_mut().spawn((Position(position), Collider::dynamic(shape))).id();
    let mut collisions = app.world_mut().resource_mut::<CollisionSystem>();
    collisions.add_collidable(entity);
    collisions.handle_collisions(entity, CollisionHandler::Player);
    entity
}

fn run_frame(app: &mut App) -> Vec<CollisionEvent> {
    app.world_mut().run_schedule(FixedUpdate);
    app.world_mut().resource_mut::<Messages<CollisionEvent>>().drain().collect()
}

#[test]
fn test_both_sides_are_notified() {
    let mut app = app();
    let a = spawn_collidable(&mut app, Vec2::ZERO, Shape::circle(10.0));
    let b = spawn_collidable(&mut app, Vec2::new(12.0, 0.0), Shape::rectangle(10.0, 10.0));
    let far = spawn_collidable(&mut app, Vec2::new(500.0, 0.0), Shape::circle(10.0));

    let events = run_frame(&mut app);

    assert_eq!(events.len(), 2);
    assert!(events.iter().any(|e| e.entity == a && e.other == b));
    assert!(events.iter().any(|e| e.entity == b && e.other == a));
    assert!(events.iter().all(|e| e.entity != far && e.other != far));
}

#[test]
fn test_every_handler_is_invoked() {
    let mut app = app();
    let a = spawn_collidable(&mut app, Vec2::ZERO, Shape::circle(10.0));
    let b = spawn_collidable(&mut app, Vec2::new(5.0, 0.0), Shape::circle(10.0));
    app.world_mut().resource_mut::<CollisionSystem>().handle_collisions(a, CollisionHandler::Snowball);

    let events = run_frame(&mut app);

    let for_a: Vec<_> = events.iter().filter(|e| e.entity == a).map(|e| e.handler).collect();
    assert_eq!(for_a, vec![CollisionHandler::Player, CollisionHandler::Snowball]);
    assert_eq!(events.iter().filter(|e| e.entity == b).count(), 1);
}

#[test]
fn test_moved_collider_is_seen_next_frame() {
    let mut app = app();
    let a = spawn_collidable(&mut app, Vec2::ZERO, Shape::circle(10.0));
    let b = spawn_collidable(&mut app, Vec2::new(300.0, 0.0), Shape::circle(10.0));
    assert!(run_frame(&mut app).is_empty());

    app.world_mut().get_mut::<Position>(b).unwrap().0 = Vec2::new(12.0, 0.0);
    let events = run_frame(&mut app);
    assert!(events.iter().any(|e| e.entity == a && e.other == b));

    app.world_mut().resource_mut::<CollisionSystem>().remove_collidable(b);
    assert!(run_frame(&mut app).is_empty());
}

#[test]
fn test_random_scene_is_symmetric_and_unique() {
    let mut rng = fastrand::Rng::with_seed(7);
    let mut app = app();

    for _ in 0..150 {
        let position = Vec2::new(rng.f32() * 600.0 - 300.0, rng.f32() * 600.0 - 300.0);
        let shape = if rng.bool() {
            Shape::circle(5.0 + rng.f32() * 20.0)
        } else {
            Shape::rectangle(5.0 + rng.f32() * 30.0, 5.0 + rng.f32() * 30.0)
        };
        spawn_collidable(&mut app, position, shape);
    }

    for _ in 0..3 {
        let events = run_frame(&mut app);
        let seen: FxHashSet<(Entity, Entity)> = events.iter().map(|e| (e.entity, e.other)).collect();

        // One handler each, so every ordered pair appears exactly once.
        assert_eq!(seen.len(), events.len());
        for &(entity, other) in &seen {
            assert!(seen.contains(&(other, entity)));
        }
    }
}
