//! Single-writer async studio loop and event stream APIs.

/// Event stream types emitted by the loop.
pub mod events;
/// Handle and command loop implementation.
pub mod handle;
/// Debounce and deadline primitives.
pub mod timers;
