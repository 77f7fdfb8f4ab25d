//! Game-agnostic building blocks: clock, shapes, spatial index, hex grid,
//! object pool, seeded random and the collision system.

pub mod clock;
pub mod collision;
pub mod geometry;
pub mod hex_grid;
pub mod pool;
pub mod quad_tree;
pub mod random;
