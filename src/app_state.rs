use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::auth;
use crate::error::{AuthError, StorageError};
use crate::models::{Language, User};
use crate::storage::Storage;

/// Layout-direction capability provided by the embedding UI. Flipping
/// text direction is a platform-level change that may require an app
/// restart; the store invokes it best-effort and never depends on it.
pub trait DirectionHost: Send + Sync {
    fn apply_direction(&self, rtl: bool) -> anyhow::Result<()>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppState {
    pub user: Option<User>,
    pub favorite_events: Vec<String>,
    pub language: Language,
    /// True only during the initial hydrate from storage.
    pub is_loading: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            user: None,
            favorite_events: Vec::new(),
            language: Language::default(),
            is_loading: true,
        }
    }
}

type PersistJob = (
    &'static str,
    Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send>>,
);

/// Single source of truth for session, favorites, and language. Mutations
/// update the in-memory state synchronously and mirror to storage through
/// a single writer task, so writes land in mutation order and the last
/// mutation is what survives a restart. A failed write is logged and never
/// rolls the state back.
pub struct AppStore {
    state: Mutex<AppState>,
    storage: Storage,
    direction: Option<Arc<dyn DirectionHost>>,
    persist_tx: mpsc::UnboundedSender<PersistJob>,
}

impl AppStore {
    /// Must be constructed inside the async runtime; the writer task is
    /// spawned here.
    pub fn new(storage: Storage, direction: Option<Arc<dyn DirectionHost>>) -> Self {
        let (persist_tx, mut persist_rx) = mpsc::unbounded_channel::<PersistJob>();
        tokio::spawn(async move {
            while let Some((what, job)) = persist_rx.recv().await {
                if let Err(err) = job.await {
                    tracing::warn!("failed to persist {what}: {err}");
                }
            }
        });
        Self {
            state: Mutex::new(AppState::default()),
            storage,
            direction,
            persist_tx,
        }
    }

    /// Hydrates from storage: three parallel reads, each failure logged
    /// and treated as "value absent". Always ends with `is_loading` false.
    pub async fn bootstrap(&self) {
        let (user, favorites, language) = tokio::join!(
            self.storage.get_user(),
            self.storage.get_favorites(),
            self.storage.get_language(),
        );
        let user = read_or_absent(user, "user", None);
        let favorites = read_or_absent(favorites, "favorites", Vec::new());
        let language = read_or_absent(language, "language", Language::default());

        {
            let mut state = self.state.lock().expect("app state mutex poisoned");
            state.user = user;
            state.favorite_events = dedup(favorites);
            state.language = language;
            state.is_loading = false;
        }
        self.apply_direction(language);
    }

    pub fn snapshot(&self) -> AppState {
        self.state.lock().expect("app state mutex poisoned").clone()
    }

    /// Replaces the session. `None` signifies logout and leaves favorites
    /// and language untouched; the stored auth token goes with the user.
    pub fn update_user(&self, user: Option<User>) {
        {
            let mut state = self.state.lock().expect("app state mutex poisoned");
            state.user = user.clone();
        }
        let storage = self.storage.clone();
        match user {
            Some(user) => self.persist_later("user", async move {
                storage.save_user(&user).await
            }),
            None => self.persist_later("logout", async move {
                storage.delete_user().await?;
                storage.delete_auth_token().await
            }),
        }
    }

    /// Checks the mock credentials and installs the session; the new user
    /// is visible to readers before any persistence completes.
    pub fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let (user, token) = auth::authenticate(email, password)?;
        self.update_user(Some(user.clone()));
        let storage = self.storage.clone();
        self.persist_later("auth token", async move {
            storage.save_auth_token(&token).await
        });
        Ok(user)
    }

    pub fn logout(&self) {
        self.update_user(None);
    }

    /// Involution with set semantics: removes the id if present, appends
    /// it otherwise. The list never accumulates duplicates.
    pub fn toggle_favorite(&self, event_id: &str) {
        let favorites = {
            let mut state = self.state.lock().expect("app state mutex poisoned");
            if state.favorite_events.iter().any(|id| id.as_str() == event_id) {
                state.favorite_events.retain(|id| id.as_str() != event_id);
            } else {
                state.favorite_events.push(event_id.to_string());
            }
            state.favorite_events.clone()
        };
        let storage = self.storage.clone();
        self.persist_later("favorites", async move {
            storage.save_favorites(&favorites).await
        });
    }

    /// Sets the language and asks the host to flip the layout direction.
    /// The state change and the persisted preference succeed even when the
    /// host cannot apply the direction without a restart.
    pub fn update_language(&self, language: Language) {
        {
            let mut state = self.state.lock().expect("app state mutex poisoned");
            state.language = language;
        }
        let storage = self.storage.clone();
        self.persist_later("language", async move {
            storage.save_language(language).await
        });
        self.apply_direction(language);
    }

    fn apply_direction(&self, language: Language) {
        if let Some(host) = &self.direction {
            if let Err(err) = host.apply_direction(language.is_rtl()) {
                tracing::warn!("direction change failed, host may need a restart: {err}");
            }
        }
    }

    fn persist_later<Fut>(&self, what: &'static str, fut: Fut)
    where
        Fut: Future<Output = Result<(), StorageError>> + Send + 'static,
    {
        if self.persist_tx.send((what, Box::pin(fut))).is_err() {
            tracing::warn!("persistence writer gone, dropping {what} write");
        }
    }
}

fn read_or_absent<T>(result: Result<T, StorageError>, what: &str, absent: T) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("bootstrap read of {what} failed, treating as absent: {err}");
            absent
        }
    }
}

fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingHost(Mutex<Vec<bool>>);

    impl DirectionHost for RecordingHost {
        fn apply_direction(&self, rtl: bool) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(rtl);
            Ok(())
        }
    }

    struct FailingHost;

    impl DirectionHost for FailingHost {
        fn apply_direction(&self, _rtl: bool) -> anyhow::Result<()> {
            anyhow::bail!("restart required")
        }
    }

    fn temp_storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Storage::new(dir.path().join("state.sqlite"));
        (dir, storage)
    }

    async fn eventually<F, Fut>(what: &str, check: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[tokio::test]
    async fn bootstrap_applies_stored_values_and_finishes_loading() {
        let (_dir, storage) = temp_storage();
        storage.save_language(Language::Ar).await.unwrap();
        storage.save_favorites(&["42".to_string()]).await.unwrap();

        let host = Arc::new(RecordingHost::default());
        let store = AppStore::new(storage, Some(host.clone()));
        assert!(store.snapshot().is_loading);

        store.bootstrap().await;
        let state = store.snapshot();
        assert_eq!(state.user, None);
        assert_eq!(state.favorite_events, vec!["42".to_string()]);
        assert_eq!(state.language, Language::Ar);
        assert!(!state.is_loading);
        // stored direction re-applied on startup
        assert_eq!(host.0.lock().unwrap().as_slice(), &[true]);
    }

    #[tokio::test]
    async fn bootstrap_on_empty_storage_uses_defaults() {
        let (_dir, storage) = temp_storage();
        let store = AppStore::new(storage, None);
        store.bootstrap().await;
        let state = store.snapshot();
        assert_eq!(state.user, None);
        assert!(state.favorite_events.is_empty());
        assert_eq!(state.language, Language::En);
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn toggle_favorite_is_an_involution_without_duplicates() {
        let (_dir, storage) = temp_storage();
        let store = AppStore::new(storage, None);
        store.bootstrap().await;

        store.toggle_favorite("42");
        store.toggle_favorite("7");
        assert_eq!(
            store.snapshot().favorite_events,
            vec!["42".to_string(), "7".to_string()]
        );

        store.toggle_favorite("42");
        assert_eq!(store.snapshot().favorite_events, vec!["7".to_string()]);

        store.toggle_favorite("42");
        store.toggle_favorite("42");
        let favorites = store.snapshot().favorite_events;
        assert_eq!(favorites, vec!["7".to_string()]);
        assert_eq!(
            favorites.iter().filter(|id| *id == "42").count(),
            0,
            "no duplicate left behind"
        );
    }

    #[tokio::test]
    async fn favorites_are_mirrored_to_storage() {
        let (_dir, storage) = temp_storage();
        let store = AppStore::new(storage.clone(), None);
        store.bootstrap().await;

        store.toggle_favorite("42");
        eventually("favorites write", || async {
            storage.get_favorites().await.unwrap() == vec!["42".to_string()]
        })
        .await;
    }

    #[tokio::test]
    async fn rapid_toggles_leave_storage_matching_the_final_state() {
        let (_dir, storage) = temp_storage();
        let store = AppStore::new(storage.clone(), None);
        store.bootstrap().await;

        // three writes queued back to back; an out-of-order writer could
        // let the ["42"] write land after the final ["7"] one
        store.toggle_favorite("42");
        store.toggle_favorite("42");
        store.toggle_favorite("7");
        let final_favorites = store.snapshot().favorite_events;
        assert_eq!(final_favorites, vec!["7".to_string()]);

        eventually("final favorites write", || {
            let storage = storage.clone();
            let expected = final_favorites.clone();
            async move { storage.get_favorites().await.unwrap() == expected }
        })
        .await;
        // no later stale write overwrites it
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(storage.get_favorites().await.unwrap(), final_favorites);
    }

    #[tokio::test]
    async fn login_is_visible_before_persistence_completes() {
        let (_dir, storage) = temp_storage();
        let store = AppStore::new(storage.clone(), None);
        store.bootstrap().await;

        let user = store.login("demo@example.com", "password").expect("login");
        // read immediately, before any disk write can have finished
        assert_eq!(store.snapshot().user, Some(user));

        eventually("auth token write", || async {
            storage.get_auth_token().await.unwrap().is_some()
        })
        .await;
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials_synchronously() {
        let (_dir, storage) = temp_storage();
        let store = AppStore::new(storage, None);
        store.bootstrap().await;

        let err = store.login("demo@example.com", "wrong").unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
        assert_eq!(store.snapshot().user, None);
    }

    #[tokio::test]
    async fn logout_clears_the_session_but_not_preferences() {
        let (_dir, storage) = temp_storage();
        let store = AppStore::new(storage.clone(), None);
        store.bootstrap().await;

        store.login("demo@example.com", "password").expect("login");
        store.toggle_favorite("42");
        store.update_language(Language::Ar);
        eventually("auth token write", || async {
            storage.get_auth_token().await.unwrap().is_some()
        })
        .await;

        store.logout();
        let state = store.snapshot();
        assert_eq!(state.user, None);
        assert_eq!(state.favorite_events, vec!["42".to_string()]);
        assert_eq!(state.language, Language::Ar);

        eventually("auth token cleared", || async {
            storage.get_auth_token().await.unwrap().is_none()
        })
        .await;
    }

    #[tokio::test]
    async fn language_change_survives_a_direction_host_failure() {
        let (_dir, storage) = temp_storage();
        let store = AppStore::new(storage.clone(), Some(Arc::new(FailingHost)));
        store.bootstrap().await;

        store.update_language(Language::Ar);
        assert_eq!(store.snapshot().language, Language::Ar);
        eventually("language write", || async {
            storage.get_language().await.unwrap() == Language::Ar
        })
        .await;
    }

    #[tokio::test]
    async fn hydrated_duplicates_are_collapsed() {
        let (_dir, storage) = temp_storage();
        storage
            .save_favorites(&["42".to_string(), "42".to_string(), "7".to_string()])
            .await
            .unwrap();
        let store = AppStore::new(storage, None);
        store.bootstrap().await;
        assert_eq!(
            store.snapshot().favorite_events,
            vec!["42".to_string(), "7".to_string()]
        );
    }
}
