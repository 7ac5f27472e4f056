/*
 * Profile store: a registry of uniquely identified, named profiles that persists each
 * profile to its own JSON file with debounced, serialized I/O. See `core` for the
 * building blocks; `src/main.rs` is a small command-line front end over them.
 */
pub mod core;
