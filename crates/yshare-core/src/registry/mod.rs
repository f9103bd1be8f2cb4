//! In-memory registry of live share sessions.
//!
//! The [`CodeRegistry`] maps six-digit codes to [`ShareSession`]s and owns
//! one expiry task per session. Nothing is persisted: a restart forgets every
//! code, while the uploaded blobs stay in remote storage.
//!
//! ## Lifecycle
//!
//! ```text
//! create ──► live ──(ttl elapsed)──► expired (code free for reuse)
//!              └────(remove)───────► removed
//! ```
//!
//! Expiry is fixed at creation time; resolving a code never extends it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use yshare_core::registry::{CodeRegistry, FileRef};
//!
//! let registry = CodeRegistry::new(Default::default());
//! let code = registry.create(vec![FileRef::new(url, "report.pdf", "application/pdf")])?;
//! let session = registry.resolve(code.as_str()).expect("just created");
//! ```

mod session;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::code::{CodeSource, RandomCodeSource, ShareCode};
use crate::error::{Error, Result};

pub use session::{FileRef, ShareSession};

/// Registry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Lifetime of every session, counted from creation
    pub ttl: Duration,
    /// Draws allowed before code generation gives up
    pub max_code_attempts: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(crate::DEFAULT_SESSION_TTL_SECS),
            max_code_attempts: crate::DEFAULT_MAX_CODE_ATTEMPTS,
        }
    }
}

struct Entry {
    session: Arc<ShareSession>,
    expiry: AbortHandle,
}

/// Owner of all live share sessions.
pub struct CodeRegistry {
    sessions: Mutex<HashMap<ShareCode, Entry>>,
    source: Box<dyn CodeSource>,
    config: RegistryConfig,
}

impl std::fmt::Debug for CodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeRegistry")
            .field("live", &self.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CodeRegistry {
    /// Create a registry drawing uniformly random codes.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Arc<Self> {
        Self::with_source(config, RandomCodeSource::new())
    }

    /// Create a registry drawing codes from `source`.
    #[must_use]
    pub fn with_source(config: RegistryConfig, source: impl CodeSource + 'static) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            source: Box::new(source),
            config,
        })
    }

    /// The registry settings.
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ShareCode, Entry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn free_code(&self, live: &HashMap<ShareCode, Entry>) -> Result<ShareCode> {
        let now = Instant::now();
        for _ in 0..self.config.max_code_attempts {
            let candidate = self.source.next_code();
            match live.get(&candidate) {
                Some(entry) if !entry.session.is_expired_at(now) => {
                    tracing::debug!("Code {} already in use, drawing again", candidate);
                }
                _ => return Ok(candidate),
            }
        }
        Err(Error::CapacityExhausted {
            attempts: self.config.max_code_attempts,
        })
    }

    /// Draw a code that no live session is using.
    ///
    /// The code is not reserved; [`create`](Self::create) performs the draw
    /// and the insertion under one lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExhausted`] if every draw collided.
    pub fn generate_code(&self) -> Result<ShareCode> {
        let live = self.lock();
        self.free_code(&live)
    }

    /// Register a new session for `files` and start its expiry timer.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoFiles`] for an empty list and
    /// [`Error::CapacityExhausted`] if no free code could be drawn.
    pub fn create(self: &Arc<Self>, files: Vec<FileRef>) -> Result<ShareCode> {
        if files.is_empty() {
            return Err(Error::NoFiles);
        }

        let mut live = self.lock();
        let code = self.free_code(&live)?;
        let file_count = files.len();
        let session = Arc::new(ShareSession::new(code.clone(), files, self.config.ttl));

        let expiry = tokio::spawn(expire_after(
            Arc::downgrade(self),
            code.clone(),
            session.id,
            self.config.ttl,
        ))
        .abort_handle();

        if let Some(stale) = live.insert(code.clone(), Entry { session, expiry }) {
            stale.expiry.abort();
        }
        drop(live);

        tracing::info!(
            "Created share {} with {} file(s), expires in {}s",
            code,
            file_count,
            self.config.ttl.as_secs()
        );
        Ok(code)
    }

    /// Look up the live session for `code`.
    ///
    /// Malformed, unknown and expired codes all return `None`. The lookup
    /// does not extend the session's lifetime.
    pub fn resolve(&self, code: &str) -> Option<Arc<ShareSession>> {
        let code = ShareCode::parse(code).ok()?;
        let mut live = self.lock();

        let session = Arc::clone(&live.get(&code)?.session);
        if session.is_expired_at(Instant::now()) {
            // Timer has not run yet; the deadline still wins.
            if let Some(entry) = live.remove(&code) {
                entry.expiry.abort();
            }
            tracing::debug!("Code {} resolved after its deadline", code);
            return None;
        }

        tracing::debug!("Resolved code {}", code);
        Some(session)
    }

    /// Remove the session for `code` and cancel its timer.
    ///
    /// Returns whether a session was removed; removing an absent code is a
    /// no-op. Remote blobs are left untouched.
    pub fn remove(&self, code: &str) -> bool {
        let Ok(code) = ShareCode::parse(code) else {
            return false;
        };
        let removed = self.lock().remove(&code);
        match removed {
            Some(entry) => {
                entry.expiry.abort();
                tracing::info!("Removed share {}", code);
                true
            }
            None => false,
        }
    }

    fn remove_expired(&self, code: &ShareCode, id: Uuid) -> bool {
        let mut live = self.lock();
        if live.get(code).is_some_and(|e| e.session.id == id) {
            live.remove(code);
            true
        } else {
            false
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Drop for CodeRegistry {
    fn drop(&mut self) {
        let live = self.sessions.get_mut().unwrap_or_else(PoisonError::into_inner);
        for entry in live.values() {
            entry.expiry.abort();
        }
    }
}

async fn expire_after(registry: Weak<CodeRegistry>, code: ShareCode, id: Uuid, ttl: Duration) {
    tokio::time::sleep(ttl).await;

    if let Some(registry) = registry.upgrade() {
        if registry.remove_expired(&code, id) {
            tracing::info!("Code {} expired", code);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Hands out a fixed sequence of codes, then repeats the last one.
    struct ScriptedCodes {
        codes: Vec<u32>,
        next: AtomicU32,
    }

    impl ScriptedCodes {
        fn new(codes: &[u32]) -> Self {
            Self {
                codes: codes.to_vec(),
                next: AtomicU32::new(0),
            }
        }
    }

    impl CodeSource for ScriptedCodes {
        fn next_code(&self) -> ShareCode {
            let i = self.next.fetch_add(1, Ordering::SeqCst) as usize;
            let n = self.codes[i.min(self.codes.len() - 1)];
            ShareCode::from_number(n)
        }
    }

    fn file(name: &str) -> FileRef {
        FileRef::new(format!("memory://{name}"), name, "application/octet-stream")
    }

    fn config(ttl_secs: u64) -> RegistryConfig {
        RegistryConfig {
            ttl: Duration::from_secs(ttl_secs),
            ..RegistryConfig::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_resolve() {
        let registry = CodeRegistry::new(RegistryConfig::default());
        let code = registry.create(vec![file("a.txt"), file("b.txt")]).unwrap();

        let session = registry.resolve(code.as_str()).unwrap();
        assert_eq!(session.code(), &code);
        let names: Vec<_> = session.files().iter().map(|f| f.display_name.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_empty() {
        let registry = CodeRegistry::new(RegistryConfig::default());
        assert!(matches!(registry.create(Vec::new()), Err(Error::NoFiles)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_codes_unique_among_live_sessions() {
        let registry = CodeRegistry::new(RegistryConfig::default());
        let mut seen = HashSet::new();
        for i in 0..500 {
            let code = registry.create(vec![file(&format!("{i}.bin"))]).unwrap();
            assert!(seen.insert(code), "duplicate live code");
        }
        assert_eq!(registry.len(), 500);
    }

    #[tokio::test]
    async fn test_collision_draws_again() {
        let codes = ScriptedCodes::new(&[111_111, 111_111, 222_222]);
        let registry = CodeRegistry::with_source(config(600), codes);
        let first = registry.create(vec![file("a")]).unwrap();
        let second = registry.create(vec![file("b")]).unwrap();
        assert_eq!(first.as_str(), "111111");
        assert_eq!(second.as_str(), "222222");
    }

    #[tokio::test]
    async fn test_capacity_exhausted_after_bounded_attempts() {
        let cfg = RegistryConfig {
            max_code_attempts: 5,
            ..config(600)
        };
        let registry = CodeRegistry::with_source(cfg, ScriptedCodes::new(&[333_333]));
        registry.create(vec![file("a")]).unwrap();

        let err = registry.create(vec![file("b")]).unwrap_err();
        assert!(matches!(err, Error::CapacityExhausted { attempts: 5 }));
        assert_eq!(registry.len(), 1);
        assert!(registry.generate_code().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_exact() {
        let registry = CodeRegistry::new(config(600));
        let code = registry.create(vec![file("a")]).unwrap();

        tokio::time::advance(Duration::from_millis(599_999)).await;
        assert!(registry.resolve(code.as_str()).is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(registry.resolve(code.as_str()).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_removes_without_lookup() {
        let registry = CodeRegistry::new(config(60));
        registry.create(vec![file("a")]).unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_does_not_extend_ttl() {
        let registry = CodeRegistry::new(config(60));
        let code = registry.create(vec![file("a")]).unwrap();

        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(10)).await;
            assert!(registry.resolve(code.as_str()).is_some());
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(registry.resolve(code.as_str()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_code_reused_after_expiry() {
        let registry = CodeRegistry::with_source(config(60), ScriptedCodes::new(&[444_444]));
        let first = registry.create(vec![file("old")]).unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        let second = registry.create(vec![file("new")]).unwrap();
        assert_eq!(first, second);

        let session = registry.resolve(second.as_str()).unwrap();
        assert_eq!(session.files()[0].display_name, "new");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_spares_reused_code() {
        let registry = CodeRegistry::with_source(config(60), ScriptedCodes::new(&[555_555]));
        let code = registry.create(vec![file("old")]).unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(registry.remove(code.as_str()));
        registry.create(vec![file("new")]).unwrap();

        // The first session's deadline passes; the replacement must survive it.
        tokio::time::sleep(Duration::from_secs(45)).await;
        assert!(registry.resolve(code.as_str()).is_some());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(registry.resolve(code.as_str()).is_none());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = CodeRegistry::new(RegistryConfig::default());
        let code = registry.create(vec![file("a")]).unwrap();

        assert!(registry.remove(code.as_str()));
        assert!(!registry.remove(code.as_str()));
        assert!(!registry.remove("not-a-code"));
        assert!(registry.resolve(code.as_str()).is_none());
    }

    #[tokio::test]
    async fn test_resolve_malformed() {
        let registry = CodeRegistry::new(RegistryConfig::default());
        assert!(registry.resolve("abc").is_none());
        assert!(registry.resolve("").is_none());
    }
}
