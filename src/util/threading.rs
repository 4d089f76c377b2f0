use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

// Tracks the engine's named worker threads so teardown can report what is
// still alive. Handles deregister themselves on join or drop.
#[derive(Clone, Default)]
pub struct ThreadRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicUsize,
    names: Mutex<HashMap<usize, String>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, name: impl Into<String>, f: F) -> Result<ThreadHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let join_handle = thread::Builder::new()
            .name(name.clone())
            .spawn(f)
            .map_err(|e| anyhow!("failed to spawn thread '{name}': {e}"))?;

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .names
            .lock()
            .expect("thread registry mutex poisoned")
            .insert(id, name.clone());

        Ok(ThreadHandle {
            name,
            id,
            handle: Some(join_handle),
            inner: Arc::clone(&self.inner),
        })
    }

    pub fn active_thread_names(&self) -> Vec<String> {
        self.inner
            .names
            .lock()
            .expect("thread registry mutex poisoned")
            .values()
            .cloned()
            .collect()
    }
}

pub struct ThreadHandle {
    name: String,
    id: usize,
    handle: Option<JoinHandle<()>>,
    inner: Arc<RegistryInner>,
}

impl ThreadHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn join(mut self) -> thread::Result<()> {
        self.deregister();
        if let Some(handle) = self.handle.take() {
            handle.join()
        } else {
            Ok(())
        }
    }

    fn deregister(&self) {
        let _ = self
            .inner
            .names
            .lock()
            .expect("thread registry mutex poisoned")
            .remove(&self.id);
    }
}

impl Drop for ThreadHandle {
    fn drop(&mut self) {
        self.deregister();
        // Dropping the JoinHandle detaches the thread; never block in drop.
    }
}
