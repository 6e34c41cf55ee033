//! Session code allocation.

use std::sync::Arc;

use livepoll_common::{AppError, AppResult, IdGenerator, SessionCode};
use livepoll_db::{Poll, PollStore};
use tracing::{debug, warn};

/// Default cap on codes tried for one poll creation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

type CodeSource = Arc<dyn Fn() -> SessionCode + Send + Sync>;

/// Hands out session codes that are free among undeleted polls.
///
/// Availability is checked before persisting, but another creation can
/// still claim the same code in between. [`Self::insert_with_fresh_code`]
/// treats the store's duplicate rejection as a request to draw again, so the
/// store's uniqueness guarantee is what actually prevents two live polls
/// from sharing a code.
#[derive(Clone)]
pub struct SessionCodeAllocator {
    store: Arc<dyn PollStore>,
    source: CodeSource,
    max_attempts: u32,
}

impl SessionCodeAllocator {
    /// Create an allocator drawing uniformly random codes.
    #[must_use]
    pub fn new(store: Arc<dyn PollStore>, max_attempts: u32) -> Self {
        let id_gen = IdGenerator::new();
        Self::with_source(store, max_attempts, move || id_gen.generate_session_code())
    }

    /// Create an allocator with a custom code source.
    #[must_use]
    pub fn with_source<F>(store: Arc<dyn PollStore>, max_attempts: u32, source: F) -> Self
    where
        F: Fn() -> SessionCode + Send + Sync + 'static,
    {
        Self {
            store,
            source: Arc::new(source),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Draw a code without checking it.
    #[must_use]
    pub fn generate(&self) -> SessionCode {
        (self.source)()
    }

    /// Draw codes until one is free at the instant of the check.
    pub async fn allocate(&self) -> AppResult<SessionCode> {
        for attempt in 1..=self.max_attempts {
            let code = self.generate();
            if !self.store.session_code_exists(&code).await? {
                return Ok(code);
            }
            debug!(session_code = %code, attempt, "Session code taken");
        }

        warn!(attempts = self.max_attempts, "Session code space exhausted");
        Err(AppError::SessionCodesExhausted(self.max_attempts))
    }

    /// Persist a new poll under a freshly allocated code.
    ///
    /// `build` is called once per candidate code. The attempt cap is shared
    /// between availability checks and lost insert races.
    pub async fn insert_with_fresh_code<F>(&self, build: F) -> AppResult<Poll>
    where
        F: Fn(SessionCode) -> Poll + Send + Sync,
    {
        let mut attempts = 0;
        while attempts < self.max_attempts {
            attempts += 1;
            let code = self.generate();
            if self.store.session_code_exists(&code).await? {
                debug!(session_code = %code, attempt = attempts, "Session code taken");
                continue;
            }

            match self.store.insert(build(code)).await {
                Err(AppError::DuplicateSessionCode(code)) => {
                    debug!(session_code = %code, attempt = attempts, "Lost session code race");
                }
                result => return result,
            }
        }

        warn!(attempts, "Session code space exhausted");
        Err(AppError::SessionCodesExhausted(attempts))
    }
}
