// src/main.rs

/*
 * Command-line front end over the profile store. Loads the store settings, opens the
 * project profile directory and applies one command:
 *
 *   profile_store [-v] list
 *   profile_store [-v] add <name>
 *   profile_store [-v] rename <id> <name>
 *   profile_store [-v] remove <id>
 *   profile_store [-v] set-root <id> <path>
 *
 * Every change goes through the debounced save path; the final
 * `wait_for_io_task_completion` flushes and drains it before exit.
 */
use profile_store::core::{
    ConfigManagerOperations, CoreConfigManager, Profile, ProfileError, ProfileManager,
    ProjectSettings,
};
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use time::UtcOffset;

const APP_NAME: &str = "ProfileStore";

fn initialize_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut builder = ConfigBuilder::new();
    builder
        .set_time_format_rfc3339()
        .set_thread_level(LevelFilter::Debug)
        .set_target_level(LevelFilter::Off)
        .set_time_offset(UtcOffset::UTC);
    if let Err(e) = TermLogger::init(
        level,
        builder.build(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("Failed to initialize logging: {e}");
    }
}

fn usage() -> String {
    format!(
        "Usage: profile_store [-v] <command>\n\
         Commands:\n  \
         list\n  \
         add <name>\n  \
         rename <id> <name>\n  \
         remove <id>\n  \
         set-root <id> <path>\n\
         Settings are read from the {APP_NAME} configuration directory."
    )
}

fn find_profile(
    manager: &ProfileManager<ProjectSettings>,
    id: &str,
) -> Result<Profile<ProjectSettings>, Box<dyn Error>> {
    manager
        .get_profile(id)
        .ok_or_else(|| format!("No profile with id '{id}'").into())
}

fn print_profiles(manager: &ProfileManager<ProjectSettings>) {
    if manager.is_empty() {
        println!("No profiles in {:?}.", manager.profiles_directory());
        return;
    }
    for profile in manager.profiles() {
        let content = profile.content();
        let root = content
            .root_folder
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<10} {:<30} {root}", profile.id(), profile.name().unwrap_or_default());
    }
}

fn execute(
    manager: &Rc<ProfileManager<ProjectSettings>>,
    args: &[String],
) -> Result<(), Box<dyn Error>> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["list"] => print_profiles(manager),
        ["add", name] => {
            let id = manager.generate_profile_id();
            let profile = Profile::new(id, Some(*name), ProjectSettings::default());
            manager.add_profile(&profile, true)?;
            println!("Added {profile}");
        }
        ["rename", id, name] => {
            let profile = find_profile(manager, id)?;
            profile.set_name(Some(*name))?;
            println!("Renamed to {profile}");
        }
        ["remove", id] => {
            let profile = find_profile(manager, id)?;
            manager.remove_profile(&profile)?;
            println!("Removed {profile}");
        }
        ["set-root", id, path] => {
            let profile = find_profile(manager, id)?;
            let root = PathBuf::from(*path);
            profile.update_content(|settings| settings.root_folder = Some(root));
            println!("Updated root folder of {profile}");
        }
        _ => return Err(usage().into()),
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn Error>> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = args.first().is_some_and(|a| a == "-v" || a == "--verbose");
    if verbose {
        args.remove(0);
    }
    initialize_logging(verbose);

    let config_manager = CoreConfigManager::new();
    let settings = config_manager.load_settings(APP_NAME)?;
    let profiles_dir = settings
        .resolve_profiles_directory(APP_NAME)
        .ok_or(ProfileError::NoProfilesDirectory)?;
    log::debug!("Main: Using profiles directory {profiles_dir:?} with settings {settings:?}");

    let manager = settings
        .configure(ProfileManager::<ProjectSettings>::builder(profiles_dir))
        .build()?;
    manager.load_profiles()?;

    let result = execute(&manager, &args);
    manager.wait_for_io_task_completion();
    let stats = manager.stats();
    if stats.saves_failed > 0 || stats.deletes_failed > 0 {
        return Err(format!(
            "{} save(s) and {} delete(s) failed; see the log for details",
            stats.saves_failed, stats.deletes_failed
        )
        .into());
    }
    result
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
