//! Signed-in state: the bearer token, the current user and where the shell
//! should navigate after the session ends.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::ClientError;
use crate::models::CurrentUser;

pub const TOKEN_KEY: &str = "auth_token";
pub const LOGIN_PATH: &str = "/login";

/// Small persistent key/value store backing the client stores.
#[cfg_attr(test, mockall::automock)]
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> io::Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> io::Result<()>;

    fn remove(&self, key: &str) -> io::Result<()>;
}

/// Process-local storage. Clones share the same values.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> io::Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values
            .lock()
            .map_err(|_| io::Error::other("memory storage lock poisoned"))
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.values()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.values()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.values()?.remove(key);
        Ok(())
    }
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path(key), value)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path(key)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

pub struct SessionStore {
    storage: Box<dyn Storage>,
    token: Option<String>,
    user: Option<CurrentUser>,
    redirect_to: Option<String>,
}

impl SessionStore {
    /// Restores the token persisted by an earlier session, if any. The user
    /// is unknown until the caller fetches it.
    pub fn load(storage: impl Storage + 'static) -> Result<Self, ClientError> {
        let token = storage.get(TOKEN_KEY)?.filter(|token| !token.is_empty());
        Ok(Self {
            storage: Box::new(storage),
            token,
            user: None,
            redirect_to: None,
        })
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user(&self) -> Option<&CurrentUser> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Where the shell should go next, set when the session ends.
    pub fn redirect_to(&self) -> Option<&str> {
        self.redirect_to.as_deref()
    }

    pub fn take_redirect(&mut self) -> Option<String> {
        self.redirect_to.take()
    }

    #[tracing::instrument(skip_all)]
    pub fn sign_in(&mut self, token: &str) -> Result<(), ClientError> {
        self.storage.set(TOKEN_KEY, token)?;
        self.token = Some(token.to_string());
        self.user = None;
        self.redirect_to = None;
        Ok(())
    }

    pub fn set_user(&mut self, user: CurrentUser) {
        self.user = Some(user);
    }

    /// Forgets the token and user and points the shell at the login page.
    #[tracing::instrument(skip_all)]
    pub fn sign_out(&mut self) -> Result<(), ClientError> {
        self.token = None;
        self.user = None;
        self.redirect_to = Some(LOGIN_PATH.to_string());
        self.storage.remove(TOKEN_KEY)?;
        tracing::info!("Session cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    #[test]
    fn can_restore_persisted_token() {
        let mut storage = MockStorage::new();
        storage
            .expect_get()
            .with(eq(TOKEN_KEY))
            .times(1)
            .returning(|_| Ok(Some("saved-token".to_string())));

        let session = SessionStore::load(storage).unwrap();

        assert_eq!(session.token(), Some("saved-token"));
        assert!(session.is_authenticated());
        assert!(session.user().is_none());
    }

    #[test]
    fn can_start_signed_out_without_token() {
        let mut storage = MockStorage::new();
        storage.expect_get().returning(|_| Ok(None));

        let session = SessionStore::load(storage).unwrap();

        assert!(!session.is_authenticated());
        assert_eq!(session.redirect_to(), None);
    }

    #[test]
    fn can_keep_token_unset_when_persisting_fails() {
        let mut storage = MockStorage::new();
        storage.expect_get().returning(|_| Ok(None));
        storage
            .expect_set()
            .with(eq(TOKEN_KEY), eq("fresh-token"))
            .returning(|_, _| Err(io::Error::other("disk full")));

        let mut session = SessionStore::load(storage).unwrap();
        let result = session.sign_in("fresh-token");

        assert!(matches!(result, Err(ClientError::Storage(_))));
        assert!(!session.is_authenticated());
    }

    #[test]
    fn can_sign_out_and_redirect_to_login() {
        let mut storage = MockStorage::new();
        storage
            .expect_get()
            .returning(|_| Ok(Some("saved-token".to_string())));
        storage
            .expect_remove()
            .with(eq(TOKEN_KEY))
            .times(1)
            .returning(|_| Ok(()));

        let mut session = SessionStore::load(storage).unwrap();
        session.set_user(CurrentUser {
            id: 7,
            username: "kim".to_string(),
        });
        session.sign_out().unwrap();

        assert!(!session.is_authenticated());
        assert!(session.user().is_none());
        assert_eq!(session.take_redirect().as_deref(), Some("/login"));
        assert_eq!(session.redirect_to(), None);
    }

    #[test]
    fn can_persist_token_across_file_sessions() {
        let dir = tempfile::tempdir().unwrap();

        let mut first = SessionStore::load(FileStorage::new(dir.path())).unwrap();
        first.sign_in("file-token").unwrap();
        let second = SessionStore::load(FileStorage::new(dir.path())).unwrap();
        assert_eq!(second.token(), Some("file-token"));

        first.sign_out().unwrap();
        let third = SessionStore::load(FileStorage::new(dir.path())).unwrap();
        assert!(!third.is_authenticated());
    }

    #[test]
    fn can_share_memory_storage_between_clones() {
        let storage = MemoryStorage::new();
        let mut session = SessionStore::load(storage.clone()).unwrap();

        session.sign_in("shared").unwrap();

        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("shared"));
    }
}
