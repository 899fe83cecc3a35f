// Scoped overrides of the CONVCHECK_* environment variables.
//
// Tests that touch the process environment must also carry
// `#[serial(convcheck_env)]`; the lock here only orders threads of one
// test binary.
//
// Prefer `temp_env::with_vars` for a single closure. Reach for
// `TesterEnvScope` when the overrides have to outlive several statements,
// e.g. to run the same tester twice under one seed.

use convcheck_common::{MIN_ITERATIONS_ENV, SEED_ENV};
use std::collections::HashMap;
use std::env;
use std::sync::{Mutex, MutexGuard, OnceLock};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|e| e.into_inner())
}

/// Holds the environment lock and restores every touched variable on drop,
/// including during unwinding.
#[derive(Debug)]
pub struct TesterEnvScope {
    saved: HashMap<String, Option<String>>,
    _lock: MutexGuard<'static, ()>,
}

impl TesterEnvScope {
    /// Scope with both tester variables cleared.
    pub fn clean() -> Self {
        let mut scope = Self { saved: HashMap::new(), _lock: env_lock() };
        scope.remove(SEED_ENV);
        scope.remove(MIN_ITERATIONS_ENV);
        scope
    }

    /// Scope pinning the random seed.
    pub fn with_seed(seed: u64) -> Self {
        let mut scope = Self::clean();
        scope.set(SEED_ENV, &seed.to_string());
        scope
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.saved.entry(key.to_string()).or_insert_with(|| env::var(key).ok());
        // SAFETY: ENV_LOCK is held for the lifetime of the scope.
        unsafe { env::set_var(key, value) };
    }

    pub fn remove(&mut self, key: &str) {
        self.saved.entry(key.to_string()).or_insert_with(|| env::var(key).ok());
        // SAFETY: ENV_LOCK is held for the lifetime of the scope.
        unsafe { env::remove_var(key) };
    }

    /// Value the variable had before this scope first touched it.
    pub fn original_value(&self, key: &str) -> Option<&str> {
        self.saved.get(key).and_then(|v| v.as_deref())
    }
}

impl Drop for TesterEnvScope {
    fn drop(&mut self) {
        for (key, original) in &self.saved {
            // SAFETY: ENV_LOCK is still held through `_lock`.
            unsafe {
                match original {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
