use std::sync::{Arc, Mutex};

use goalwork::work::{DoneCallback, WorkHandle};

/// A [`WorkHandle`] finished by the test itself.
#[derive(Clone, Default)]
pub struct ManualHandle {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    done: bool,
    cancelled: Option<bool>,
    callbacks: Vec<DoneCallback>,
}

impl ManualHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> (Self, Arc<dyn WorkHandle>) {
        let handle = Self::new();
        let dynamic: Arc<dyn WorkHandle> = Arc::new(handle.clone());
        (handle, dynamic)
    }

    /// Mark done and fire the registered callbacks.
    pub fn finish(&self) {
        let callbacks = {
            let mut state = self.inner.lock().unwrap();
            if state.done {
                return;
            }
            state.done = true;
            std::mem::take(&mut state.callbacks)
        };
        for callback in callbacks {
            callback();
        }
    }

    /// `Some(interrupt)` once cancel was requested.
    pub fn cancel_request(&self) -> Option<bool> {
        self.inner.lock().unwrap().cancelled
    }
}

impl WorkHandle for ManualHandle {
    fn is_done(&self) -> bool {
        self.inner.lock().unwrap().done
    }

    fn cancel(&self, interrupt: bool) {
        self.inner.lock().unwrap().cancelled = Some(interrupt);
        self.finish();
    }

    fn on_done(&self, callback: DoneCallback) {
        let mut state = self.inner.lock().unwrap();
        if state.done {
            drop(state);
            callback();
        } else {
            state.callbacks.push(callback);
        }
    }
}
