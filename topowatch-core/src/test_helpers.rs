//! Shared fixtures for unit tests

use std::sync::{Mutex, MutexGuard, PoisonError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Holds the process environment for one test
///
/// Clears every `TOPOWATCH_*` variable, applies `vars`, and clears them again
/// on drop. Tests that load configuration take one so they never see each
/// other's variables.
pub struct EnvGuard {
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    pub fn set(vars: &[(&str, &str)]) -> Self {
        let lock = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        clear();
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
        Self { _lock: lock }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        clear();
    }
}

fn clear() {
    for (key, _) in std::env::vars() {
        if key.starts_with("TOPOWATCH_") {
            std::env::remove_var(key);
        }
    }
}
