//! Listener registration and synchronous notification fan-out

use crate::content::Resource;
use serde_json::Value;
use std::fmt;

/// What listeners are told after a successful dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A command, batch, undo or redo changed the document.
    ///
    /// `args` is the positional argument list, `[]` for undo and `null` for redo.
    Changed {
        command: String,
        args: Value,
        session: Option<String>,
    },

    ResourceStored {
        content: Resource,
        key: String,
        session: Option<String>,
    },
}

impl Notification {
    pub fn session(&self) -> Option<&str> {
        match self {
            Notification::Changed { session, .. } | Notification::ResourceStored { session, .. } => {
                session.as_deref()
            }
        }
    }

    /// Command name for `Changed`, `None` for resource notifications
    pub fn command(&self) -> Option<&str> {
        match self {
            Notification::Changed { command, .. } => Some(command),
            Notification::ResourceStored { .. } => None,
        }
    }
}

/// Returned by `subscribe`; pass it to `unsubscribe` to stop notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

type Listener = Box<dyn FnMut(&Notification)>;

#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(ListenerHandle, Listener)>,
    next_handle: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&Notification) + 'static) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle);
        self.next_handle += 1;
        self.listeners.push((handle, Box::new(listener)));
        handle
    }

    /// False when the handle was not registered
    pub fn unsubscribe(&mut self, handle: ListenerHandle) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(registered, _)| *registered != handle);
        self.listeners.len() != before
    }

    /// Call every listener in registration order
    pub fn emit(&mut self, notification: &Notification) {
        for (_, listener) in &mut self.listeners {
            listener(notification);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}
