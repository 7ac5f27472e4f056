/*
 * This module is responsible for managing profiles at runtime and persisting them.
 * A `ProfileManager` owns a set of uniquely identified profiles, indexes them by id,
 * keeps them in display order, and writes each one to `<profiles_dir>/<id>.json`.
 *
 * Persistence is debounced: a tracked mutation marks the profile dirty and, if it was
 * not dirty yet, arms a single fixed-delay timer. When the owner's loop calls `tick`
 * after the deadline, every dirty profile is serialized and its write is queued on the
 * manager's `IoExecutor`. Completion handles are collected and reaped on later ticks,
 * so the owner thread never waits on the disk except in `wait_for_io_task_completion`
 * (shutdown) and `load_profiles` (startup).
 *
 * The manager and its profiles are confined to one thread (`Rc`-based, `!Send`);
 * registry, ordered sequence and dirty set are never touched by the I/O worker.
 */
use super::debounce::{DEFAULT_SAVE_DELAY, DebounceTimer};
use super::file_system;
use super::io_executor::{CancellationToken, IoExecutor, IoTask, IoTaskError};
use super::profile::{OwnerLink, Profile, ProfileChange, ProfileContent};
use super::profile_id::{generate_unique_profile_id, is_valid_profile_id};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::sync::atomic::{self, AtomicU64};
use std::time::{Duration, Instant};

pub const PROFILE_FILE_EXTENSION: &str = "json";
pub const PROFILES_SUBFOLDER_NAME: &str = "profiles";

#[derive(Debug)]
pub enum ProfileError {
    Io(io::Error),
    Serde(serde_json::Error),
    Executor(IoTaskError),
    NoProfilesDirectory,
    InvalidProfileId(String),
    InvalidDocument(String),
    IdMismatch {
        expected: String,
        found: String,
    },
    KindMismatch {
        expected: &'static str,
        found: String,
    },
    AlreadyAttached {
        id: String,
        same_manager: bool,
    },
    DuplicateId(String),
    NotOwned(String),
    BuiltInProfile {
        id: String,
        operation: &'static str,
    },
    Cancelled,
}

impl From<io::Error> for ProfileError {
    fn from(err: io::Error) -> Self {
        ProfileError::Io(err)
    }
}

impl From<serde_json::Error> for ProfileError {
    fn from(err: serde_json::Error) -> Self {
        ProfileError::Serde(err)
    }
}

impl From<IoTaskError> for ProfileError {
    fn from(err: IoTaskError) -> Self {
        ProfileError::Executor(err)
    }
}

impl std::fmt::Display for ProfileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileError::Io(e) => write!(f, "I/O error: {e}"),
            ProfileError::Serde(e) => write!(f, "Serialization/Deserialization error: {e}"),
            ProfileError::Executor(e) => write!(f, "{e}"),
            ProfileError::NoProfilesDirectory => {
                write!(f, "Could not determine the profiles directory")
            }
            ProfileError::InvalidProfileId(id) => write!(
                f,
                "Invalid profile id: {id:?}. Only ASCII letters, digits, '_' and '-' are allowed."
            ),
            ProfileError::InvalidDocument(reason) => {
                write!(f, "Invalid profile document: {reason}")
            }
            ProfileError::IdMismatch { expected, found } => write!(
                f,
                "Profile document belongs to '{found}', expected '{expected}'"
            ),
            ProfileError::KindMismatch { expected, found } => write!(
                f,
                "Profile document has kind '{found}', expected '{expected}'"
            ),
            ProfileError::AlreadyAttached { id, same_manager } => {
                if *same_manager {
                    write!(f, "Profile '{id}' is already added to this manager")
                } else {
                    write!(f, "Profile '{id}' is already owned by another manager")
                }
            }
            ProfileError::DuplicateId(id) => {
                write!(f, "A different profile with id '{id}' is already registered")
            }
            ProfileError::NotOwned(id) => {
                write!(f, "Profile '{id}' is not owned by this manager")
            }
            ProfileError::BuiltInProfile { id, operation } => write!(
                f,
                "Operation not permitted: cannot {operation} built-in profile '{id}'"
            ),
            ProfileError::Cancelled => write!(f, "Operation cancelled"),
        }
    }
}

impl std::error::Error for ProfileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProfileError::Io(e) => Some(e),
            ProfileError::Serde(e) => Some(e),
            ProfileError::Executor(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProfileError>;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagerId(u64);

impl std::fmt::Display for ManagerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type ProfileComparator<P> = Box<dyn Fn(&Profile<P>, &Profile<P>) -> Ordering>;
type ProfileHook<P> = Rc<dyn Fn(&Profile<P>)>;

/*
 * Default display order: by name (absent names first), then by id. Both comparisons
 * are ordinal so the order does not depend on locale.
 */
pub fn compare_by_name_then_id<P: ProfileContent>(a: &Profile<P>, b: &Profile<P>) -> Ordering {
    a.name()
        .cmp(&b.name())
        .then_with(|| a.id().cmp(b.id()))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    pub saves_submitted: u64,
    pub saves_completed: u64,
    pub saves_failed: u64,
    pub saves_cancelled: u64,
    pub deletes_submitted: u64,
    pub deletes_completed: u64,
    pub deletes_failed: u64,
}

enum PendingIo {
    Save {
        id: String,
        cancel: CancellationToken,
        task: IoTask<Result<()>>,
    },
    Delete {
        id: String,
        task: IoTask<io::Result<bool>>,
    },
}

pub struct ProfileManagerBuilder<P: ProfileContent> {
    profiles_dir: PathBuf,
    save_delay: Duration,
    retry_failed_saves: bool,
    comparator: Option<ProfileComparator<P>>,
    executor: Option<IoExecutor>,
}

impl<P: ProfileContent> ProfileManagerBuilder<P> {
    pub fn new(profiles_dir: impl Into<PathBuf>) -> Self {
        ProfileManagerBuilder {
            profiles_dir: profiles_dir.into(),
            save_delay: DEFAULT_SAVE_DELAY,
            retry_failed_saves: false,
            comparator: None,
            executor: None,
        }
    }

    pub fn save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = delay;
        self
    }

    /*
     * When enabled, a save that fails (other than by cancellation) marks the profile
     * dirty again so the next debounce cycle retries it. Off by default: a failed save
     * is only retried once the profile changes again.
     */
    pub fn retry_failed_saves(mut self, retry: bool) -> Self {
        self.retry_failed_saves = retry;
        self
    }

    pub fn comparator(
        mut self,
        comparator: impl Fn(&Profile<P>, &Profile<P>) -> Ordering + 'static,
    ) -> Self {
        self.comparator = Some(Box::new(comparator));
        self
    }

    /// Shares an existing executor, e.g. one used by several managers of the same family.
    pub fn executor(mut self, executor: IoExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn build(self) -> Result<Rc<ProfileManager<P>>> {
        let executor = match self.executor {
            Some(executor) => executor,
            None => IoExecutor::new(&format!("profile-io-{}", P::KIND))?,
        };
        let comparator: ProfileComparator<P> = match self.comparator {
            Some(comparator) => comparator,
            None => Box::new(compare_by_name_then_id::<P>),
        };
        let id = ManagerId(NEXT_MANAGER_ID.fetch_add(1, atomic::Ordering::Relaxed));
        log::debug!(
            "ProfileManager: Created manager {id} for kind '{}' at {:?} (save delay {:?}).",
            P::KIND,
            self.profiles_dir,
            self.save_delay
        );
        Ok(Rc::new_cyclic(|self_ref| ProfileManager {
            id,
            self_ref: self_ref.clone(),
            profiles_dir: self.profiles_dir,
            executor,
            comparator,
            retry_failed_saves: self.retry_failed_saves,
            registry: RefCell::new(HashMap::new()),
            ordered: RefCell::new(Vec::new()),
            dirty: RefCell::new(BTreeSet::new()),
            save_timer: RefCell::new(DebounceTimer::new(self.save_delay)),
            in_flight: RefCell::new(Vec::new()),
            stats: Cell::new(ManagerStats::default()),
            added_hooks: RefCell::new(Vec::new()),
            removed_hooks: RefCell::new(Vec::new()),
        }))
    }
}

pub struct ProfileManager<P: ProfileContent> {
    id: ManagerId,
    self_ref: Weak<ProfileManager<P>>,
    profiles_dir: PathBuf,
    executor: IoExecutor,
    comparator: ProfileComparator<P>,
    retry_failed_saves: bool,
    registry: RefCell<HashMap<String, Profile<P>>>,
    ordered: RefCell<Vec<Profile<P>>>,
    dirty: RefCell<BTreeSet<String>>,
    save_timer: RefCell<DebounceTimer>,
    in_flight: RefCell<Vec<PendingIo>>,
    stats: Cell<ManagerStats>,
    added_hooks: RefCell<Vec<ProfileHook<P>>>,
    removed_hooks: RefCell<Vec<ProfileHook<P>>>,
}

impl<P: ProfileContent> ProfileManager<P> {
    /// Manager with default settings storing profiles in `profiles_dir`.
    pub fn new(profiles_dir: impl Into<PathBuf>) -> Result<Rc<Self>> {
        ProfileManagerBuilder::new(profiles_dir).build()
    }

    pub fn builder(profiles_dir: impl Into<PathBuf>) -> ProfileManagerBuilder<P> {
        ProfileManagerBuilder::new(profiles_dir)
    }

    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub fn profiles_directory(&self) -> &Path {
        &self.profiles_dir
    }

    pub fn executor(&self) -> &IoExecutor {
        &self.executor
    }

    pub fn profile_file_path(&self, id: &str) -> PathBuf {
        self.profiles_dir
            .join(format!("{id}.{PROFILE_FILE_EXTENSION}"))
    }

    /*
     * Attaches `profile`, indexes it and inserts it into the display order. With
     * `persist` the first save is scheduled right away; loaders pass `false` for
     * profiles that were just read from disk. Fails without touching any state if the
     * profile already has an owner or its id is taken.
     */
    pub fn add_profile(&self, profile: &Profile<P>, persist: bool) -> Result<()> {
        if let Some(owner) = profile.manager_id() {
            let same_manager = owner == self.id;
            log::error!(
                "ProfileManager: Profile '{}' is already attached to manager {owner}.",
                profile.id()
            );
            return Err(ProfileError::AlreadyAttached {
                id: profile.id().to_string(),
                same_manager,
            });
        }
        if !is_valid_profile_id(profile.id()) {
            return Err(ProfileError::InvalidProfileId(profile.id().to_string()));
        }
        if self.is_id_taken(profile.id()) {
            log::error!(
                "ProfileManager: Rejecting profile with duplicate id '{}'.",
                profile.id()
            );
            return Err(ProfileError::DuplicateId(profile.id().to_string()));
        }

        profile.attach(OwnerLink {
            manager_id: self.id,
            manager: self.self_ref.clone(),
        });
        self.registry
            .borrow_mut()
            .insert(profile.id().to_string(), profile.clone());
        self.insert_ordered(profile);
        log::debug!(
            "ProfileManager: Added profile {profile} to manager {} (persist: {persist}).",
            self.id
        );

        if persist {
            self.mark_dirty(profile);
        }
        self.fire_hooks(&self.added_hooks, profile);
        Ok(())
    }

    /*
     * Detaches `profile` and queues deletion of its file. Returns `Ok(false)` when the
     * profile is not owned by this manager. A pending save for the profile is dropped
     * and any save already queued is cancelled; the delete runs after it either way
     * because the executor is FIFO. Delete failures are only logged.
     */
    pub fn remove_profile(&self, profile: &Profile<P>) -> Result<bool> {
        if !self.owns(profile) {
            log::debug!(
                "ProfileManager: Ignoring removal of profile '{}' not owned by manager {}.",
                profile.id(),
                self.id
            );
            return Ok(false);
        }
        if profile.is_built_in() {
            log::warn!(
                "ProfileManager: Refusing to remove built-in profile '{}'.",
                profile.id()
            );
            return Err(ProfileError::BuiltInProfile {
                id: profile.id().to_string(),
                operation: "remove",
            });
        }

        let id = profile.id().to_string();
        self.registry.borrow_mut().remove(&id);
        self.ordered.borrow_mut().retain(|p| !p.ptr_eq(profile));
        self.dirty.borrow_mut().remove(&id);
        self.cancel_in_flight_saves(&id);
        profile.detach();

        let path = self.profile_file_path(&id);
        let task = self
            .executor
            .submit(move || file_system::delete_file_if_exists(&path));
        self.in_flight
            .borrow_mut()
            .push(PendingIo::Delete { id: id.clone(), task });
        self.bump_stats(|s| s.deletes_submitted += 1);
        log::debug!(
            "ProfileManager: Removed profile '{id}' from manager {}; file deletion queued.",
            self.id
        );

        self.fire_hooks(&self.removed_hooks, profile);
        Ok(true)
    }

    pub fn get_profile(&self, id: &str) -> Option<Profile<P>> {
        self.registry.borrow().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registry.borrow().contains_key(id)
    }

    /// Profiles in display order.
    pub fn profiles(&self) -> Vec<Profile<P>> {
        self.ordered.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.borrow().is_empty()
    }

    pub fn generate_profile_id(&self) -> String {
        generate_unique_profile_id(|candidate| self.is_id_taken(candidate))
    }

    // File names are case-insensitive on some platforms, so ids are unique ignoring ASCII case.
    fn is_id_taken(&self, id: &str) -> bool {
        self.registry
            .borrow()
            .keys()
            .any(|existing| existing.eq_ignore_ascii_case(id))
    }

    /*
     * Marks an attached profile dirty. Only a profile that was not dirty yet arms the
     * timer, and arming an armed timer keeps its deadline, so a burst of changes ends
     * up in one flush.
     */
    pub fn schedule_saving_profile(&self, profile: &Profile<P>) -> Result<()> {
        if !self.owns(profile) {
            log::error!(
                "ProfileManager: Cannot schedule save of '{}': not owned by manager {}.",
                profile.id(),
                self.id
            );
            return Err(ProfileError::NotOwned(profile.id().to_string()));
        }
        self.mark_dirty(profile);
        Ok(())
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.borrow().len()
    }

    pub fn is_dirty(&self, id: &str) -> bool {
        self.dirty.borrow().contains(id)
    }

    pub fn is_save_pending(&self) -> bool {
        self.save_timer.borrow().is_armed()
    }

    /// When the pending flush is due, for owners that sleep between ticks.
    pub fn next_save_deadline(&self) -> Option<Instant> {
        self.save_timer.borrow().deadline()
    }

    /// Number of submitted save/delete jobs whose result has not been collected yet.
    pub fn pending_io_count(&self) -> usize {
        self.in_flight.borrow().len()
    }

    pub fn stats(&self) -> ManagerStats {
        self.stats.get()
    }

    /*
     * Services the manager from the owner's loop: flushes the dirty set if the debounce
     * deadline has passed, then collects results of finished I/O jobs. Never blocks.
     * Returns the number of saves submitted by this call.
     */
    pub fn tick(&self) -> usize {
        let due = self.save_timer.borrow_mut().take_if_due(Instant::now());
        let submitted = if due { self.flush_dirty() } else { 0 };
        self.reap_finished_io();
        submitted
    }

    /// Flushes the dirty set immediately, skipping the remaining debounce delay.
    pub fn flush_dirty_profiles(&self) -> usize {
        self.save_timer.borrow_mut().cancel();
        self.flush_dirty()
    }

    /*
     * Shutdown primitive: cancels the debounce timer, flushes whatever is dirty, then
     * blocks until a marker job queued behind all earlier saves and deletes has run.
     * Results are collected and failures logged before returning. Each dirty profile
     * gets one attempt: with `retry_failed_saves` a failure here is marked dirty again
     * but only written if the manager is serviced afterwards.
     */
    pub fn wait_for_io_task_completion(&self) {
        if self.save_timer.borrow_mut().cancel() {
            log::trace!("ProfileManager: Cancelled pending save timer for final flush.");
        }
        let submitted = self.flush_dirty();
        if let Err(e) = self.executor.drain().wait() {
            log::error!("ProfileManager: Failed to drain I/O executor: {e}");
        }
        self.reap_finished_io();
        log::debug!(
            "ProfileManager: I/O drained for manager {} ({submitted} final save(s)).",
            self.id
        );
    }

    /// Loads every profile document in the profiles directory with the default factory.
    pub fn load_profiles(&self) -> Result<usize> {
        self.load_profiles_with(|_, bytes| Profile::from_json_slice(bytes))
    }

    /*
     * Reads all `*.json` files of the profiles directory on the I/O executor, builds a
     * profile from each with `factory` on the owner thread and attaches it without
     * scheduling a save. Unreadable or invalid files, files whose name does not match
     * the profile id, and ids that are already registered are logged and skipped.
     * Blocks until the directory has been read.
     */
    pub fn load_profiles_with(
        &self,
        factory: impl Fn(&Path, &[u8]) -> Result<Profile<P>>,
    ) -> Result<usize> {
        let dir = self.profiles_dir.clone();
        let files = self
            .executor
            .submit(move || file_system::read_profile_files(&dir))
            .wait()??;

        let mut loaded = 0;
        for (path, contents) in files {
            let bytes = match contents {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("ProfileManager: Could not read profile file {path:?}: {e}");
                    continue;
                }
            };
            let profile = match factory(&path, &bytes) {
                Ok(profile) => profile,
                Err(e) => {
                    log::warn!("ProfileManager: Skipping invalid profile file {path:?}: {e}");
                    continue;
                }
            };
            let stem_matches = path
                .file_stem()
                .is_some_and(|stem| stem.to_string_lossy() == profile.id());
            if !stem_matches {
                log::warn!(
                    "ProfileManager: Skipping {path:?}: it holds profile '{}'.",
                    profile.id()
                );
                continue;
            }
            match self.add_profile(&profile, false) {
                Ok(()) => loaded += 1,
                Err(e) => log::warn!("ProfileManager: Skipping {path:?}: {e}"),
            }
        }
        log::info!(
            "ProfileManager: Loaded {loaded} profile(s) of kind '{}' from {:?}.",
            P::KIND,
            self.profiles_dir
        );
        Ok(loaded)
    }

    pub fn on_profile_added(&self, hook: impl Fn(&Profile<P>) + 'static) {
        self.added_hooks.borrow_mut().push(Rc::new(hook));
    }

    pub fn on_profile_removed(&self, hook: impl Fn(&Profile<P>) + 'static) {
        self.removed_hooks.borrow_mut().push(Rc::new(hook));
    }

    // Change handler installed through the profile's owner link.
    pub(crate) fn handle_profile_changed(&self, profile: &Profile<P>, change: ProfileChange) {
        if !self.owns(profile) {
            log::warn!(
                "ProfileManager: Change notification from foreign profile '{}' ignored.",
                profile.id()
            );
            return;
        }
        log::trace!(
            "ProfileManager: Profile '{}' changed ({change:?}).",
            profile.id()
        );
        // A comparator may read content as well as the name.
        self.ordered.borrow_mut().retain(|p| !p.ptr_eq(profile));
        self.insert_ordered(profile);
        self.mark_dirty(profile);
    }

    fn owns(&self, profile: &Profile<P>) -> bool {
        profile.manager_id() == Some(self.id)
            && self
                .registry
                .borrow()
                .get(profile.id())
                .is_some_and(|registered| registered.ptr_eq(profile))
    }

    fn insert_ordered(&self, profile: &Profile<P>) {
        let mut ordered = self.ordered.borrow_mut();
        let index = ordered
            .partition_point(|existing| (self.comparator)(existing, profile) != Ordering::Greater);
        ordered.insert(index, profile.clone());
    }

    fn mark_dirty(&self, profile: &Profile<P>) {
        let newly_dirty = self.dirty.borrow_mut().insert(profile.id().to_string());
        if newly_dirty && self.save_timer.borrow_mut().arm(Instant::now()) {
            log::trace!(
                "ProfileManager: Save timer armed by '{}' on manager {}.",
                profile.id(),
                self.id
            );
        }
    }

    fn flush_dirty(&self) -> usize {
        let snapshot = std::mem::take(&mut *self.dirty.borrow_mut());
        if snapshot.is_empty() {
            return 0;
        }

        let mut submitted = 0u64;
        for id in snapshot {
            let Some(profile) = self.get_profile(&id) else {
                log::trace!("ProfileManager: Dirty profile '{id}' is gone; not saving.");
                continue;
            };
            let path = self.profile_file_path(&id);
            let cancel = CancellationToken::new();
            let task = profile.save(&self.executor, &path, &cancel);
            self.in_flight
                .borrow_mut()
                .push(PendingIo::Save { id, cancel, task });
            submitted += 1;
        }
        self.bump_stats(|s| s.saves_submitted += submitted);
        log::debug!(
            "ProfileManager: Queued {submitted} profile save(s) on manager {}.",
            self.id
        );
        submitted as usize
    }

    fn cancel_in_flight_saves(&self, profile_id: &str) {
        for io in self.in_flight.borrow().iter() {
            if let PendingIo::Save { id, cancel, .. } = io
                && id == profile_id
            {
                cancel.cancel();
            }
        }
    }

    fn reap_finished_io(&self) {
        let pending = std::mem::take(&mut *self.in_flight.borrow_mut());
        let mut still_running = Vec::with_capacity(pending.len());
        let mut failed_saves = Vec::new();

        for io in pending {
            match io {
                PendingIo::Save { id, cancel, task } => match task.try_wait() {
                    None => still_running.push(PendingIo::Save { id, cancel, task }),
                    Some(Ok(Ok(()))) => {
                        self.bump_stats(|s| s.saves_completed += 1);
                        log::trace!("ProfileManager: Saved profile '{id}'.");
                    }
                    Some(Ok(Err(ProfileError::Cancelled))) => {
                        self.bump_stats(|s| s.saves_cancelled += 1);
                        log::debug!("ProfileManager: Save of profile '{id}' was cancelled.");
                    }
                    Some(Ok(Err(e))) => {
                        self.bump_stats(|s| s.saves_failed += 1);
                        log::error!("ProfileManager: Failed to save profile '{id}': {e}");
                        failed_saves.push(id);
                    }
                    Some(Err(e)) => {
                        self.bump_stats(|s| s.saves_failed += 1);
                        log::error!("ProfileManager: Save job for profile '{id}' failed: {e}");
                        failed_saves.push(id);
                    }
                },
                PendingIo::Delete { id, task } => match task.try_wait() {
                    None => still_running.push(PendingIo::Delete { id, task }),
                    Some(Ok(Ok(removed))) => {
                        self.bump_stats(|s| s.deletes_completed += 1);
                        log::debug!(
                            "ProfileManager: Deleted file of profile '{id}' (existed: {removed})."
                        );
                    }
                    Some(Ok(Err(e))) => {
                        self.bump_stats(|s| s.deletes_failed += 1);
                        log::error!("ProfileManager: Failed to delete file of profile '{id}': {e}");
                    }
                    Some(Err(e)) => {
                        self.bump_stats(|s| s.deletes_failed += 1);
                        log::error!("ProfileManager: Delete job for profile '{id}' failed: {e}");
                    }
                },
            }
        }

        *self.in_flight.borrow_mut() = still_running;

        if self.retry_failed_saves {
            for id in failed_saves {
                if let Some(profile) = self.get_profile(&id) {
                    log::info!("ProfileManager: Will retry saving profile '{id}'.");
                    self.mark_dirty(&profile);
                }
            }
        }
    }

    fn fire_hooks(&self, hooks: &RefCell<Vec<ProfileHook<P>>>, profile: &Profile<P>) {
        let hooks: Vec<ProfileHook<P>> = hooks.borrow().iter().map(Rc::clone).collect();
        for hook in hooks {
            hook(profile);
        }
    }

    fn bump_stats(&self, update: impl FnOnce(&mut ManagerStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }
}

impl<P: ProfileContent> Drop for ProfileManager<P> {
    fn drop(&mut self) {
        let has_work = !self.dirty.get_mut().is_empty() || !self.in_flight.get_mut().is_empty();
        if has_work {
            log::debug!(
                "ProfileManager: Draining pending I/O before dropping manager {}.",
                self.id
            );
            self.wait_for_io_task_completion();
        }
        for profile in self.ordered.get_mut().drain(..) {
            profile.detach();
        }
        self.registry.get_mut().clear();
    }
}
