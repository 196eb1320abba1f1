//! Signals and accessors supplied by the embedding application.
//!
//! The core consumes three boolean signals (connectivity, visibility,
//! registration-entry-in-progress) and a current-operator accessor. Each
//! signal is a watch channel: the app writes transitions, core loops
//! select on `changed()`.

use fieldreg_types::OperatorId;
use std::sync::Arc;
use tokio::sync::watch;

/// A boolean signal with transition notifications.
#[derive(Clone)]
pub struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Signal {
    /// Creates a signal with an initial value.
    #[must_use]
    pub fn new(initial: bool) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> bool {
        *self.tx.borrow()
    }

    /// Sets the value, notifying watchers only on an actual change.
    pub fn set(&self, value: bool) {
        self.tx.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }

    /// Opens a receiver for transition notifications.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// The app-provided signals consumed by the core.
#[derive(Clone)]
pub struct Signals {
    /// Network connectivity.
    pub online: Signal,
    /// Whether the app is in the foreground/visible.
    pub visible: Signal,
    /// Whether an operator is mid-way through a registration form.
    /// Gates disruptive restarts.
    pub entry_in_progress: Signal,
}

impl Signals {
    /// Creates the signal set with the given initial connectivity;
    /// visible starts true, entry-in-progress starts false.
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self {
            online: Signal::new(online),
            visible: Signal::new(true),
            entry_in_progress: Signal::new(false),
        }
    }
}

/// Supplies the operator id used for `registered_by` attribution.
pub trait OperatorProvider: Send + Sync {
    /// The operator currently logged in on this device.
    fn current_operator(&self) -> OperatorId;
}

/// An [`OperatorProvider`] that always returns the same operator.
pub struct FixedOperator(OperatorId);

impl FixedOperator {
    /// Wraps an operator id.
    #[must_use]
    pub fn new(operator: OperatorId) -> Self {
        Self(operator)
    }
}

impl OperatorProvider for FixedOperator {
    fn current_operator(&self) -> OperatorId {
        self.0
    }
}
