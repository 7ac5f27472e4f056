/*
 * The profile entity: an identified, optionally named record with a kind-specific
 * payload. A `Profile<P>` is a cheap, reference-counted handle; clones refer to the
 * same record. Handles are deliberately `!Send`, which confines every profile (and the
 * manager that owns it) to the thread that created it. Only serialized bytes and paths
 * ever travel to the I/O worker.
 *
 * Each profile kind plugs in through `ProfileContent`: the payload type provides the
 * serde implementation, a kind tag written into the document, and optionally its own
 * `write_json`/`read_json` hooks. The manager never looks inside the payload.
 *
 * Tracked mutations (`set_name`, `update_content`) notify subscribed listeners and,
 * when the profile is attached, the owning manager, which marks it dirty.
 */
use super::file_system;
use super::io_executor::{CancellationToken, IoExecutor, IoTask};
use super::profile_id::is_valid_profile_id;
use super::profiles::{ManagerId, ProfileError, ProfileManager, Result};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

const DOC_KEY_ID: &str = "id";
const DOC_KEY_KIND: &str = "kind";
const DOC_KEY_NAME: &str = "name";
const DOC_KEY_DATA: &str = "data";

/*
 * Load/save contract of a profile kind. The default hooks map the payload through
 * serde; a kind can override them to keep a legacy layout or to normalize values
 * after reading.
 */
pub trait ProfileContent: Serialize + DeserializeOwned + Default + 'static {
    /// Tag stored in every document of this kind and checked on load.
    const KIND: &'static str;

    fn write_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    fn read_json(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileChange {
    Name,
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ChangeListener<P> = Rc<dyn Fn(&Profile<P>, ProfileChange)>;

// Non-owning link back to the manager a profile is attached to.
pub(crate) struct OwnerLink<P: ProfileContent> {
    pub(crate) manager_id: ManagerId,
    pub(crate) manager: Weak<ProfileManager<P>>,
}

struct ProfileInner<P: ProfileContent> {
    id: String,
    is_built_in: bool,
    name: RefCell<Option<String>>,
    content: RefCell<P>,
    owner: RefCell<Option<OwnerLink<P>>>,
    listeners: RefCell<Vec<(ListenerId, ChangeListener<P>)>>,
    next_listener_id: Cell<u64>,
}

pub struct Profile<P: ProfileContent> {
    inner: Rc<ProfileInner<P>>,
}

impl<P: ProfileContent> Clone for Profile<P> {
    fn clone(&self) -> Self {
        Profile {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P: ProfileContent> Profile<P> {
    pub fn new(id: impl Into<String>, name: Option<&str>, content: P) -> Self {
        Self::with_flags(id.into(), name.map(str::to_string), content, false)
    }

    /// Creates a profile whose name is fixed and which cannot be removed from a manager.
    pub fn new_built_in(id: impl Into<String>, name: &str, content: P) -> Self {
        Self::with_flags(id.into(), Some(name.to_string()), content, true)
    }

    fn with_flags(id: String, name: Option<String>, content: P, is_built_in: bool) -> Self {
        Profile {
            inner: Rc::new(ProfileInner {
                id,
                is_built_in,
                name: RefCell::new(name),
                content: RefCell::new(content),
                owner: RefCell::new(None),
                listeners: RefCell::new(Vec::new()),
                next_listener_id: Cell::new(0),
            }),
        }
    }

    /*
     * Builds a fresh (non built-in) profile from a parsed document. This is the default
     * per-kind "load profile from file" factory used by `ProfileManager::load_profiles`.
     */
    pub fn from_document(root: &Value) -> Result<Self> {
        let id = root
            .get(DOC_KEY_ID)
            .and_then(Value::as_str)
            .ok_or_else(|| ProfileError::InvalidDocument("missing string field 'id'".into()))?;
        if !is_valid_profile_id(id) {
            return Err(ProfileError::InvalidProfileId(id.to_string()));
        }
        let profile = Profile::new(id, None, P::default());
        profile.load(root)?;
        Ok(profile)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let root: Value = serde_json::from_slice(bytes)?;
        Self::from_document(&root)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> Option<String> {
        self.inner.name.borrow().clone()
    }

    pub fn is_built_in(&self) -> bool {
        self.inner.is_built_in
    }

    /*
     * Renames the profile. Built-in profiles refuse with `BuiltInProfile` and stay
     * unchanged. Assigning the current name is accepted without a notification.
     */
    pub fn set_name(&self, name: Option<&str>) -> Result<()> {
        if self.inner.is_built_in {
            log::warn!("Profile: Refusing to rename built-in profile '{}'.", self.id());
            return Err(ProfileError::BuiltInProfile {
                id: self.id().to_string(),
                operation: "rename",
            });
        }
        {
            let mut current = self.inner.name.borrow_mut();
            if current.as_deref() == name {
                return Ok(());
            }
            *current = name.map(str::to_string);
        }
        self.notify(ProfileChange::Name);
        Ok(())
    }

    pub fn content(&self) -> Ref<'_, P> {
        self.inner.content.borrow()
    }

    /// Mutates the payload in place and raises a `Content` change.
    pub fn update_content<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        let result = {
            let mut content = self.inner.content.borrow_mut();
            f(&mut content)
        };
        self.notify(ProfileChange::Content);
        result
    }

    pub fn subscribe(&self, listener: impl Fn(&Profile<P>, ProfileChange) + 'static) -> ListenerId {
        let id = ListenerId(self.inner.next_listener_id.get());
        self.inner.next_listener_id.set(id.0 + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, listener_id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != listener_id);
        listeners.len() != before
    }

    pub fn manager_id(&self) -> Option<ManagerId> {
        self.inner.owner.borrow().as_ref().map(|link| link.manager_id)
    }

    pub fn is_attached(&self) -> bool {
        self.inner.owner.borrow().is_some()
    }

    /// The owning manager, if attached and still alive.
    pub fn manager(&self) -> Option<Rc<ProfileManager<P>>> {
        self.inner
            .owner
            .borrow()
            .as_ref()
            .and_then(|link| link.manager.upgrade())
    }

    pub(crate) fn attach(&self, link: OwnerLink<P>) {
        *self.inner.owner.borrow_mut() = Some(link);
    }

    pub(crate) fn detach(&self) {
        self.inner.owner.borrow_mut().take();
    }

    pub fn ptr_eq(&self, other: &Profile<P>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn notify(&self, change: ProfileChange) {
        // Borrows are released before any callback runs; callbacks may touch the profile.
        let manager = self.manager();
        if let Some(manager) = manager {
            manager.handle_profile_changed(self, change);
        }
        let listeners: Vec<ChangeListener<P>> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(self, change);
        }
    }

    /*
     * Populates name and payload from a parsed document. The document must carry this
     * profile's id; a `kind` tag, when present, must match `P::KIND`. A built-in
     * profile keeps its own name. Loading does not raise change notifications since it
     * reflects what is already on disk.
     */
    pub fn load(&self, root: &Value) -> Result<()> {
        let doc = root
            .as_object()
            .ok_or_else(|| ProfileError::InvalidDocument("root is not a JSON object".into()))?;

        let id = doc
            .get(DOC_KEY_ID)
            .and_then(Value::as_str)
            .ok_or_else(|| ProfileError::InvalidDocument("missing string field 'id'".into()))?;
        if id != self.id() {
            return Err(ProfileError::IdMismatch {
                expected: self.id().to_string(),
                found: id.to_string(),
            });
        }

        if let Some(kind) = doc.get(DOC_KEY_KIND).and_then(Value::as_str)
            && kind != P::KIND
        {
            return Err(ProfileError::KindMismatch {
                expected: P::KIND,
                found: kind.to_string(),
            });
        }

        let name = match doc.get(DOC_KEY_NAME) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(ProfileError::InvalidDocument(
                    "field 'name' must be a string".into(),
                ));
            }
        };
        let content = match doc.get(DOC_KEY_DATA) {
            Some(data) => P::read_json(data.clone())?,
            None => P::default(),
        };

        if self.inner.is_built_in {
            log::trace!("Profile: Keeping built-in name for '{}' on load.", self.id());
        } else {
            *self.inner.name.borrow_mut() = name;
        }
        *self.inner.content.borrow_mut() = content;
        log::trace!("Profile: Loaded '{}' ({}).", self.id(), P::KIND);
        Ok(())
    }

    pub fn to_document(&self) -> Result<Value> {
        let mut doc = Map::new();
        doc.insert(DOC_KEY_ID.into(), Value::String(self.id().to_string()));
        doc.insert(DOC_KEY_KIND.into(), Value::String(P::KIND.to_string()));
        if let Some(name) = self.name() {
            doc.insert(DOC_KEY_NAME.into(), Value::String(name));
        }
        doc.insert(DOC_KEY_DATA.into(), self.content().write_json()?);
        Ok(Value::Object(doc))
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.to_document()?)?)
    }

    /*
     * Serializes the profile on the calling thread, then hands the bytes to `executor`
     * for an atomic write to `path`. Serialization failures resolve the returned task
     * immediately without queuing anything.
     */
    pub fn save(
        &self,
        executor: &IoExecutor,
        path: &Path,
        cancel: &CancellationToken,
    ) -> IoTask<Result<()>> {
        let bytes = match self.to_json_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("Profile: Failed to serialize '{}': {e}", self.id());
                return IoTask::ready(Err(e));
            }
        };
        let path: PathBuf = path.to_path_buf();
        let cancel = cancel.clone();
        executor.submit(move || file_system::write_file_atomically(&path, &bytes, &cancel))
    }
}

impl<P: ProfileContent> PartialEq for Profile<P> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<P: ProfileContent> Eq for Profile<P> {}

impl<P: ProfileContent> Hash for Profile<P> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl<P: ProfileContent> fmt::Display for Profile<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.inner.name.borrow();
        let name = name.as_deref().unwrap_or("");
        if self.inner.is_built_in {
            write!(f, "{name} ({}, Built-In)", self.inner.id)
        } else {
            write!(f, "{name} ({})", self.inner.id)
        }
    }
}

impl<P: ProfileContent> fmt::Debug for Profile<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("id", &self.inner.id)
            .field("name", &*self.inner.name.borrow())
            .field("kind", &P::KIND)
            .field("is_built_in", &self.inner.is_built_in)
            .field("manager", &self.manager_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ProjectSettings;
    use serde_json::json;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::tempdir;

    fn project(id: &str, name: &str) -> Profile<ProjectSettings> {
        Profile::new(id, Some(name), ProjectSettings::new(PathBuf::from("/work")))
    }

    #[test]
    fn test_display_formats() {
        let user = project("abc", "Test");
        let built_in = Profile::new_built_in("def", "Default", ProjectSettings::default());
        let unnamed: Profile<ProjectSettings> = Profile::new("xyz", None, ProjectSettings::default());

        assert_eq!(user.to_string(), "Test (abc)");
        assert_eq!(built_in.to_string(), "Default (def, Built-In)");
        assert_eq!(unnamed.to_string(), " (xyz)");
    }

    #[test]
    fn test_rename_built_in_fails_and_keeps_name() {
        // Arrange
        let profile = Profile::new_built_in("def", "Default", ProjectSettings::default());
        let changes = Rc::new(Cell::new(0));
        let seen = Rc::clone(&changes);
        profile.subscribe(move |_, _| seen.set(seen.get() + 1));

        // Act
        let result = profile.set_name(Some("Renamed"));

        // Assert
        assert!(matches!(
            result,
            Err(ProfileError::BuiltInProfile { operation: "rename", .. })
        ));
        assert_eq!(profile.name().as_deref(), Some("Default"));
        assert_eq!(changes.get(), 0);
    }

    #[test]
    fn test_listeners_receive_changes_until_unsubscribed() {
        // Arrange
        let profile = project("abc", "Test");
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&received);
        let listener = profile.subscribe(move |p, change| {
            sink.borrow_mut().push((p.name(), change));
        });

        // Act
        profile.set_name(Some("Renamed")).unwrap();
        profile.set_name(Some("Renamed")).unwrap(); // same value, no event
        profile.update_content(|c| c.exclude_patterns.push("*.log".into()));
        assert!(profile.unsubscribe(listener));
        profile.set_name(Some("Ignored")).unwrap();

        // Assert
        assert_eq!(
            *received.borrow(),
            vec![
                (Some("Renamed".to_string()), ProfileChange::Name),
                (Some("Renamed".to_string()), ProfileChange::Content),
            ]
        );
        assert!(!profile.unsubscribe(listener));
    }

    #[test]
    fn test_equality_and_hash_follow_id() {
        let a = project("same", "First");
        let b = project("same", "Second");
        let c = project("other", "First");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.ptr_eq(&b));
        assert!(a.ptr_eq(&a.clone()));

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_document_layout() {
        let profile = project("abc", "Test");
        let doc = profile.to_document().unwrap();
        assert_eq!(
            doc,
            json!({
                "id": "abc",
                "kind": "project",
                "name": "Test",
                "data": { "root_folder": "/work", "archive_path": null, "exclude_patterns": [] }
            })
        );

        let unnamed: Profile<ProjectSettings> = Profile::new("n", None, ProjectSettings::default());
        assert!(unnamed.to_document().unwrap().get("name").is_none());
    }

    #[test]
    fn test_from_json_slice_restores_fields() {
        let original = project("abc", "Test");
        original.update_content(|c| c.archive_path = Some(PathBuf::from("/out/a.txt")));
        let bytes = original.to_json_bytes().unwrap();

        let loaded: Profile<ProjectSettings> = Profile::from_json_slice(&bytes).unwrap();

        assert_eq!(loaded.id(), "abc");
        assert_eq!(loaded.name().as_deref(), Some("Test"));
        assert!(!loaded.is_built_in());
        assert_eq!(*loaded.content(), *original.content());
    }

    #[test]
    fn test_load_rejects_mismatched_documents() {
        let profile = project("abc", "Test");

        let wrong_id = profile.load(&json!({ "id": "zzz", "name": "X" }));
        let wrong_kind = profile.load(&json!({ "id": "abc", "kind": "terminal" }));
        let bad_name = profile.load(&json!({ "id": "abc", "name": 5 }));
        let not_object = profile.load(&json!(["abc"]));

        assert!(matches!(wrong_id, Err(ProfileError::IdMismatch { .. })));
        assert!(matches!(wrong_kind, Err(ProfileError::KindMismatch { .. })));
        assert!(matches!(bad_name, Err(ProfileError::InvalidDocument(_))));
        assert!(matches!(not_object, Err(ProfileError::InvalidDocument(_))));
        assert_eq!(profile.name().as_deref(), Some("Test"));
    }

    #[test]
    fn test_from_document_rejects_unsafe_id() {
        let result: Result<Profile<ProjectSettings>> =
            Profile::from_document(&json!({ "id": "../../etc/passwd" }));
        assert!(matches!(result, Err(ProfileError::InvalidProfileId(_))));
    }

    #[test]
    fn test_load_keeps_built_in_name_but_takes_content() {
        let profile = Profile::new_built_in("def", "Default", ProjectSettings::default());
        profile
            .load(&json!({ "id": "def", "name": "Hacked", "data": { "exclude_patterns": ["target"] } }))
            .unwrap();
        assert_eq!(profile.name().as_deref(), Some("Default"));
        assert_eq!(profile.content().exclude_patterns, vec!["target".to_string()]);
    }

    #[test]
    fn test_save_writes_document_through_executor() {
        // Arrange
        let dir = tempdir().unwrap();
        let executor = IoExecutor::new("test-profile-save").unwrap();
        let profile = project("abc", "Test");
        let path = dir.path().join("abc.json");

        // Act
        let result = profile
            .save(&executor, &path, &CancellationToken::new())
            .wait()
            .unwrap();

        // Assert
        assert!(result.is_ok());
        let written: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["name"], "Test");
        assert_eq!(written["kind"], "project");
    }

    #[test]
    fn test_cancelled_save_leaves_no_file() {
        let dir = tempdir().unwrap();
        let executor = IoExecutor::new("test-profile-cancel").unwrap();
        let profile = project("abc", "Test");
        let path = dir.path().join("abc.json");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = profile.save(&executor, &path, &cancel).wait().unwrap();

        assert!(matches!(result, Err(ProfileError::Cancelled)));
        assert!(!path.exists());
    }
}
