//! Model cache
//!
//! Keyed registry of long-lived model handles. Construction is
//! serialized per key, so concurrent first requests for the same model
//! build it exactly once while unrelated keys proceed independently.
//! A failed constructor leaves its key unpopulated; the next `load`
//! retries.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use vaani_core::{Error, Result};

type Handle = Arc<dyn Any + Send + Sync>;

/// Process-wide registry of lazily constructed model handles
#[derive(Default)]
pub struct ModelCache {
    handles: DashMap<String, Handle>,
    build_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the handle for `key` without constructing anything.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.handles
            .get(key)
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    /// Like `get`, but a populated key holding a different concrete
    /// type is an error rather than a miss, so `load` never silently
    /// replaces a live handle.
    fn lookup<T: Send + Sync + 'static>(&self, key: &str) -> Result<Option<Arc<T>>> {
        match self.handles.get(key) {
            None => Ok(None),
            Some(entry) => entry
                .value()
                .clone()
                .downcast::<T>()
                .map(Some)
                .map_err(|_| {
                    Error::model_load(key, "key already holds a model of a different type")
                }),
        }
    }

    /// Return the handle for `key`, constructing it on first demand.
    ///
    /// `constructor` runs on the blocking pool, at most once per key at
    /// a time. All concurrent callers observe the same handle.
    pub async fn load<T, F>(&self, key: &str, constructor: F) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        if let Some(handle) = self.lookup::<T>(key)? {
            return Ok(handle);
        }

        let lock = self
            .build_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // A racing caller may have finished construction while we waited.
        if let Some(handle) = self.lookup::<T>(key)? {
            return Ok(handle);
        }

        tracing::info!(key, "Loading model");
        let started = std::time::Instant::now();

        let built = tokio::task::spawn_blocking(constructor)
            .await
            .map_err(|e| Error::model_load(key, format!("constructor panicked: {e}")))??;

        let handle = Arc::new(built);
        self.handles
            .insert(key.to_string(), handle.clone() as Handle);

        tracing::info!(
            key,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Model loaded"
        );
        Ok(handle)
    }

    /// Drop the handle for `key`. Backing memory is released once the
    /// last borrowed reference goes away.
    pub fn unload(&self, key: &str) -> bool {
        let removed = self.handles.remove(key).is_some();
        if removed {
            tracing::info!(key, "Model unloaded");
        }
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handles.contains_key(key)
    }

    /// Keys with a constructed handle
    pub fn loaded_keys(&self) -> Vec<String> {
        self.handles.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_load_constructs_once() {
        let cache = Arc::new(ModelCache::new());
        let constructions = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let constructions = constructions.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .load::<String, _>("recognition-multilingual", move || {
                        constructions.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        Ok("model".to_string())
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }

        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        for handle in &handles[1..] {
            assert!(Arc::ptr_eq(&handles[0], handle));
        }
    }

    #[tokio::test]
    async fn test_failed_construction_is_retried() {
        let cache = ModelCache::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let result = cache
            .load::<String, _>("translation", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::model_load("translation", "missing weights"))
            })
            .await;
        assert!(result.is_err());
        assert!(!cache.contains("translation"));

        let counter = attempts.clone();
        let handle = cache
            .load::<String, _>("translation", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("model".to_string())
            })
            .await
            .unwrap();
        assert_eq!(*handle, "model");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_key_reuse_with_different_type_is_an_error() {
        let cache = ModelCache::new();
        cache
            .load::<String, _>("recognition-default", || Ok("model".to_string()))
            .await
            .unwrap();

        let err = cache
            .load::<u32, _>("recognition-default", || Ok(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ModelLoad { .. }));

        // The live handle is untouched.
        let handle = cache.get::<String>("recognition-default").unwrap();
        assert_eq!(*handle, "model");
    }

    #[tokio::test]
    async fn test_get_never_constructs() {
        let cache = ModelCache::new();
        assert!(cache.get::<String>("synthesis-hi").is_none());
        assert!(!cache.contains("synthesis-hi"));
    }

    #[tokio::test]
    async fn test_unload_then_reload() {
        let cache = ModelCache::new();
        cache
            .load::<u32, _>("synthesis-hi", || Ok(7))
            .await
            .unwrap();
        assert!(cache.unload("synthesis-hi"));
        assert!(!cache.contains("synthesis-hi"));
        assert!(!cache.unload("synthesis-hi"));

        let handle = cache
            .load::<u32, _>("synthesis-hi", || Ok(9))
            .await
            .unwrap();
        assert_eq!(*handle, 9);
    }

    #[tokio::test]
    async fn test_independent_keys_do_not_serialize() {
        let cache = Arc::new(ModelCache::new());

        // Hold the build lock for one key, then load another; the
        // second load must complete while the first is still building.
        let slow_cache = cache.clone();
        let slow = tokio::spawn(async move {
            slow_cache
                .load::<String, _>("slow", || {
                    std::thread::sleep(std::time::Duration::from_millis(200));
                    Ok("slow".to_string())
                })
                .await
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let fast = tokio::time::timeout(
            std::time::Duration::from_millis(150),
            cache.load::<String, _>("fast", || Ok("fast".to_string())),
        )
        .await;
        assert!(fast.is_ok(), "independent key was blocked");

        slow.await.unwrap().unwrap();
    }
}
