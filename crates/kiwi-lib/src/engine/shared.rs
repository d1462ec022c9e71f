//! Process-wide engine handle
//!
//! The engine client is created lazily on first use and reused afterwards.
//! Initialization runs at most once even when many requests race on first
//! use; a failed initialization is retried by the next caller.

use super::{ContainerEngine, DockerEngine, EngineError};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

type EngineFactory = Box<dyn Fn() -> Result<Arc<dyn ContainerEngine>, EngineError> + Send + Sync>;

/// Lazily-initialized, shared container engine client
pub struct SharedEngine {
    engine: OnceCell<Arc<dyn ContainerEngine>>,
    factory: EngineFactory,
}

impl SharedEngine {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn ContainerEngine>, EngineError> + Send + Sync + 'static,
    {
        Self {
            engine: OnceCell::new(),
            factory: Box::new(factory),
        }
    }

    /// Shared handle to the local Docker daemon
    pub fn docker() -> Self {
        Self::new(|| {
            let engine: Arc<dyn ContainerEngine> = Arc::new(DockerEngine::connect_local()?);
            Ok(engine)
        })
    }

    /// Wrap an already constructed engine
    pub fn from_engine(engine: Arc<dyn ContainerEngine>) -> Self {
        Self::new(move || Ok(engine.clone()))
    }

    /// Get the engine, creating it on first call
    pub async fn get(&self) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        let engine = self
            .engine
            .get_or_try_init(|| async {
                let engine = (self.factory)()?;
                info!("Container engine client initialized");
                Ok::<_, EngineError>(engine)
            })
            .await?;
        Ok(engine.clone())
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::InMemoryEngine;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_initializes_once_under_concurrent_use() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let shared = Arc::new(SharedEngine::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let engine: Arc<dyn ContainerEngine> = Arc::new(InMemoryEngine::new());
            Ok(engine)
        }));

        assert!(!shared.is_initialized());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let shared = shared.clone();
                tokio::spawn(async move { shared.get().await.map(|_| ()) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(shared.is_initialized());
    }

    #[tokio::test]
    async fn test_failed_init_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let shared = SharedEngine::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(EngineError::Unavailable("daemon not running".to_string()));
            }
            let engine: Arc<dyn ContainerEngine> = Arc::new(InMemoryEngine::new());
            Ok(engine)
        });

        assert!(matches!(shared.get().await, Err(EngineError::Unavailable(_))));
        assert!(!shared.is_initialized());
        assert!(shared.get().await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
