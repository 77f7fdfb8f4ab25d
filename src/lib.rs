pub mod game;

// ============================================================================
// Profiling Macros
// ============================================================================

/// Log a message every 100 ticks when the `perf_stats` feature is enabled.
///
/// Without the feature this expands to nothing and the arguments are not
/// evaluated.
///
/// ```ignore
/// profile_log!(clock, "[COLLISION] {} collidables", collisions.len());
/// ```
#[macro_export]
#[cfg(feature = "perf_stats")]
macro_rules! profile_log {
    ($clock:expr, $($arg:tt)*) => {
        if $clock.tick() % 100 == 0 {
            bevy::prelude::info!($($arg)*);
        }
    };
}

#[macro_export]
#[cfg(not(feature = "perf_stats"))]
macro_rules! profile_log {
    ($clock:expr, $($arg:tt)*) => {};
}
