/*
 * This module consolidates the core, platform-agnostic logic of the profile store:
 * the profile entity and its content contract, the `ProfileManager` registry with
 * debounced persistence, the dedicated I/O executor all profile file operations go
 * through, and the supporting id generation, configuration and path utilities.
 * Scenario tests for the manager live in `profiles_tests.rs`.
 */
pub mod config;
pub mod debounce;
pub mod file_system;
pub mod io_executor;
pub mod models;
pub mod path_utils;
pub mod profile;
pub mod profile_id;
pub mod profiles;


pub use config::{ConfigError, ConfigManagerOperations, CoreConfigManager, ProfileStoreSettings};

pub use debounce::DebounceTimer;

pub use io_executor::{CancellationToken, IoExecutor, IoTask, IoTaskError};

pub use models::ProjectSettings;

pub use profile::{ListenerId, Profile, ProfileChange, ProfileContent};

pub use profile_id::{init_profile_id_source, is_valid_profile_id};

pub use profiles::{
    ManagerId, ManagerStats, ProfileError, ProfileManager, ProfileManagerBuilder,
    compare_by_name_then_id,
};
