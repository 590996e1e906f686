//! # Edit Session Management
//!
//! Tracks per-session editing state that is not part of the shared history.
//!
//! Sessions are identified by their tag; `None` is the untagged session used
//! when neither the caller nor the document supplies one. Each session may
//! have one open batch accumulating applied commands until it is flushed.

use crate::undo_stack::AppliedCommand;
use std::collections::HashMap;

/// State of one editing session
#[derive(Debug, Default)]
pub struct EditSession {
    /// Commands applied since the batch was opened, `None` when no batch is open
    open_batch: Option<Vec<AppliedCommand>>,
}

impl EditSession {
    pub fn has_open_batch(&self) -> bool {
        self.open_batch.is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.open_batch.as_ref().map_or(0, Vec::len)
    }
}

/// All sessions that ever opened a batch on a document
#[derive(Debug, Default)]
pub struct Sessions {
    sessions: HashMap<Option<String>, EditSession>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session: Option<&str>) -> Option<&EditSession> {
        self.sessions.get(&session.map(str::to_string))
    }

    pub fn has_open_batch(&self, session: Option<&str>) -> bool {
        self.get(session).is_some_and(EditSession::has_open_batch)
    }

    /// Open an empty batch, returning the batch it replaces so it can be flushed
    pub fn open_batch(&mut self, session: Option<&str>) -> Option<Vec<AppliedCommand>> {
        self.entry(session).open_batch.replace(Vec::new())
    }

    /// Append to the open batch; hands the command back when none is open
    pub fn record(
        &mut self,
        session: Option<&str>,
        applied: AppliedCommand,
    ) -> Result<(), AppliedCommand> {
        let key = session.map(str::to_string);
        match self
            .sessions
            .get_mut(&key)
            .and_then(|state| state.open_batch.as_mut())
        {
            Some(batch) => {
                batch.push(applied);
                Ok(())
            }
            None => Err(applied),
        }
    }

    /// Close the open batch and return its commands
    pub fn take_batch(&mut self, session: Option<&str>) -> Option<Vec<AppliedCommand>> {
        let key = session.map(str::to_string);
        let state = self.sessions.get_mut(&key)?;
        let batch = state.open_batch.take();
        self.sessions.remove(&key);
        batch
    }

    fn entry(&mut self, session: Option<&str>) -> &mut EditSession {
        self.sessions.entry(session.map(str::to_string)).or_default()
    }
}
