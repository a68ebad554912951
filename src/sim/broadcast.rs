//! Ready-state broadcaster with replay to late subscribers
//!
//! Used for signals that may already have happened by the time someone cares:
//! "local player is ready", "game started", "game ended".

/// Broadcaster that hands back subscriber tokens instead of calling them, so
/// the owner can notify them with whatever mutable access it has.
#[derive(Debug, Clone)]
pub struct ReadyBroadcaster<T, S> {
    latest: Option<T>,
    persistent: Vec<S>,
    once: Vec<S>,
}

impl<T, S> Default for ReadyBroadcaster<T, S> {
    fn default() -> Self {
        Self {
            latest: None,
            persistent: Vec::new(),
            once: Vec::new(),
        }
    }
}

impl<T: Clone, S: Clone + PartialEq> ReadyBroadcaster<T, S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every publish. Returns the latest value for immediate replay.
    pub fn subscribe(&mut self, subscriber: S) -> Option<T> {
        if !self.persistent.contains(&subscriber) {
            self.persistent.push(subscriber);
        }
        self.latest.clone()
    }

    /// Subscribe to the next value only. If one is already available it is
    /// returned and nothing is queued.
    pub fn subscribe_once(&mut self, subscriber: S) -> Option<T> {
        if let Some(latest) = &self.latest {
            return Some(latest.clone());
        }
        if !self.once.contains(&subscriber) {
            self.once.push(subscriber);
        }
        None
    }

    pub fn unsubscribe(&mut self, subscriber: &S) {
        self.persistent.retain(|s| s != subscriber);
        self.once.retain(|s| s != subscriber);
    }

    /// Record `value` and return everyone who should hear about it
    pub fn publish(&mut self, value: T) -> Vec<S> {
        self.latest = Some(value);
        let mut targets = self.persistent.clone();
        targets.append(&mut self.once);
        targets
    }

    pub fn latest(&self) -> Option<&T> {
        self.latest.as_ref()
    }

    /// Forget the latest value; subscribers stay
    pub fn clear(&mut self) {
        self.latest = None;
    }

    pub fn subscriber_count(&self) -> usize {
        self.persistent.len() + self.once.len()
    }
}

/// One-shot callback
pub type Callback<T> = Box<dyn FnOnce(&T)>;

/// Closure flavour: callbacks run immediately if the value is ready,
/// otherwise on the next publish.
pub struct CallbackBroadcaster<T> {
    latest: Option<T>,
    pending: Vec<Callback<T>>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for CallbackBroadcaster<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackBroadcaster")
            .field("latest", &self.latest)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl<T> Default for CallbackBroadcaster<T> {
    fn default() -> Self {
        Self {
            latest: None,
            pending: Vec::new(),
        }
    }
}

impl<T> CallbackBroadcaster<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_once(&mut self, callback: impl FnOnce(&T) + 'static) {
        match &self.latest {
            Some(value) => callback(value),
            None => self.pending.push(Box::new(callback)),
        }
    }

    pub fn publish(&mut self, value: T) {
        for callback in self.pending.drain(..) {
            callback(&value);
        }
        self.latest = Some(value);
    }

    pub fn latest(&self) -> Option<&T> {
        self.latest.as_ref()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
