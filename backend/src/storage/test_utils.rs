/// Test utilities shared by the storage and domain tests
///
/// `TestEnvironment` gives each test its own on-disk database location that
/// is removed when the environment is dropped, even if the test panics.
/// `FlakyStorage` wraps `MemoryStorage` and can be told to fail reads or
/// writes so the fallback paths of the services can be exercised.
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

use super::memory::MemoryStorage;
use super::traits::KeyValueStorage;

/// RAII test environment that automatically cleans up on drop
pub struct TestEnvironment {
    /// Kept alive so the directory is only removed on drop
    _temp_dir: TempDir,
    pub base_path: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let base_path = temp_dir.path().to_path_buf();

        Ok(Self {
            _temp_dir: temp_dir,
            base_path,
        })
    }

    /// SQLite URL for a database file inside this environment
    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.base_path.join("counter.db").display())
    }
}

/// In-memory storage with switchable failures and a write counter
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: MemoryStorage,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes and deletes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Seed a raw value without counting it as a write
    pub async fn seed(&self, key: &str, value: &str) {
        self.inner
            .put_value(key, value)
            .await
            .expect("memory storage never fails");
    }

    /// Read a raw value, bypassing the failure switches
    pub async fn raw(&self, key: &str) -> Option<String> {
        self.inner
            .get_value(key)
            .await
            .expect("memory storage never fails")
    }
}

#[async_trait]
impl KeyValueStorage for FlakyStorage {
    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated read failure for key '{}'", key));
        }
        self.inner.get_value(key).await
    }

    async fn put_value(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated write failure for key '{}'", key));
        }
        self.inner.put_value(key, value).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_value(&self, key: &str) -> Result<bool> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated delete failure for key '{}'", key));
        }
        let deleted = self.inner.delete_value(key).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(deleted)
    }
}
