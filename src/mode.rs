//! Connectivity mode publisher
//!
//! A single owned state cell holding the current [`Mode`] plus the registered
//! listeners. Mutations happen under the state mutex; notifications run after
//! it is released, under a separate notify lock, so subscribers observe
//! transitions in the order they were applied and never see the same value
//! twice in a row.
//!
//! Listeners may read the publisher (`current`, `listener_count`) and drop
//! their own subscription. They must not call `set_mode` or `subscribe`.

use std::sync::{Arc, Mutex, Weak};

use log::info;

use crate::types::Mode;

/// A registered mode observer
pub type Listener = Arc<dyn Fn(Mode) + Send + Sync>;

struct PublisherState {
    mode: Mode,
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Process-wide observable connectivity mode
pub struct ModePublisher {
    state: Mutex<PublisherState>,
    /// Held while listeners run; orders notifications between writers
    notify: Mutex<()>,
}

impl ModePublisher {
    /// Create a publisher starting at the optimistic default (`remote`)
    pub fn new() -> Arc<Self> {
        Self::with_mode(Mode::default())
    }

    pub fn with_mode(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PublisherState {
                mode,
                next_id: 1,
                listeners: Vec::new(),
            }),
            notify: Mutex::new(()),
        })
    }

    /// Current mode
    pub fn current(&self) -> Mode {
        self.state.lock().unwrap().mode
    }

    /// Register a listener. It is invoked immediately with the current mode and
    /// then once per transition until the returned subscription is dropped or
    /// unsubscribed.
    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(Mode) + Send + Sync + 'static,
    {
        let _notify = self.notify.lock().unwrap();
        let listener: Listener = Arc::new(listener);
        let (id, mode) = {
            let mut state = self.state.lock().unwrap();
            let id = state.next_id;
            state.next_id += 1;
            state.listeners.push((id, Arc::clone(&listener)));
            (id, state.mode)
        };
        listener(mode);

        Subscription {
            publisher: Arc::downgrade(self),
            id,
        }
    }

    /// Set the mode, notifying listeners in registration order. Returns true if
    /// the mode actually changed.
    pub fn set_mode(&self, mode: Mode) -> bool {
        let _notify = self.notify.lock().unwrap();
        let listeners: Vec<Listener> = {
            let mut state = self.state.lock().unwrap();
            if state.mode == mode {
                return false;
            }
            info!("Connectivity mode: {} -> {}", state.mode, mode);
            state.mode = mode;
            state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        for listener in listeners {
            listener(mode);
        }
        true
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.state.lock().unwrap().listeners.len()
    }

    fn remove(&self, id: u64) {
        let mut state = self.state.lock().unwrap();
        state.listeners.retain(|(listener_id, _)| *listener_id != id);
    }
}

/// Handle returned by [`ModePublisher::subscribe`]; removes the listener when
/// unsubscribed or dropped.
pub struct Subscription {
    publisher: Weak<ModePublisher>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(publisher) = self.publisher.upgrade() {
            publisher.remove(self.id);
        }
    }
}
