// Decoded-sample cache shared by live playback and offline rendering.
//
// Keyed by the sample's source string. Reads are shared; a decode for a key is
// exclusive, and a second caller asking for the same key while it is in flight
// waits for that decode instead of starting another.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};

use log::debug;

use super::sample_buffer::SampleBuffer;
use crate::error::SampleError;

type Shared = Arc<SampleBuffer>;

#[derive(Default)]
struct InFlight {
    done: Mutex<Option<Result<Shared, String>>>,
    cv: Condvar,
}

impl InFlight {
    fn wait(&self) -> Result<Shared, String> {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(result) = done.as_ref() {
                return result.clone();
            }
            done = self.cv.wait(done).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn finish(&self, result: Result<Shared, String>) {
        *self.done.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
        self.cv.notify_all();
    }
}

pub struct SampleCache {
    target_rate: u32,
    ready: RwLock<HashMap<String, Shared>>,
    in_flight: Mutex<HashMap<String, Arc<InFlight>>>,
}

impl SampleCache {
    pub fn new(target_rate: u32) -> Self {
        Self {
            target_rate,
            ready: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn get(&self, key: &str) -> Option<Shared> {
        self.ready.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, buffer: SampleBuffer) -> Shared {
        let shared = Arc::new(buffer);
        self.ready
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), Arc::clone(&shared));
        shared
    }

    // Drops the cached buffer. Holders of an `Arc` keep theirs alive.
    pub fn remove(&self, key: &str) -> bool {
        self.ready.write().unwrap_or_else(PoisonError::into_inner).remove(key).is_some()
    }

    pub fn clear(&self) {
        self.ready.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.ready.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Decodes a WAV file at the cache's target rate, keyed by its path.
    pub fn load_wav(&self, path: &Path) -> Result<Shared, SampleError> {
        let key = path.to_string_lossy().into_owned();
        let rate = self.target_rate;
        self.get_or_load(&key, || SampleBuffer::load_wav(path, rate))
    }

    // Returns the cached buffer for `key`, running `loader` at most once per key
    // even under concurrent callers. Failures are not cached.
    pub fn get_or_load<F>(&self, key: &str, loader: F) -> Result<Shared, SampleError>
    where
        F: FnOnce() -> Result<SampleBuffer, SampleError>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }

        let (slot, owner) = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            // it may have landed between the read above and taking this lock
            if let Some(hit) = self.get(key) {
                return Ok(hit);
            }
            match in_flight.get(key) {
                Some(slot) => (Arc::clone(slot), false),
                None => {
                    let slot = Arc::new(InFlight::default());
                    in_flight.insert(key.to_string(), Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if !owner {
            debug!("waiting on in-flight decode of {key}");
            return slot.wait().map_err(|reason| SampleError::Failed { key: key.to_string(), reason });
        }

        let mut guard = LoadGuard { cache: self, key, slot, result: None };
        let outcome = loader().map(|buffer| self.insert(key, buffer));
        guard.result = Some(outcome.as_ref().map(Arc::clone).map_err(|e| e.to_string()));
        outcome
    }
}

// Retires an in-flight decode on every exit path, a panicking loader included,
// so waiters never block on a slot nobody will fill.
struct LoadGuard<'a> {
    cache: &'a SampleCache,
    key: &'a str,
    slot: Arc<InFlight>,
    result: Option<Result<Shared, String>>,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.cache
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.key);
        let result = self.result.take().unwrap_or_else(|| Err("decoder panicked".to_string()));
        self.slot.finish(result);
    }
}
