//! # Undo/Redo Stack
//!
//! One shared history for every session, undone selectively per session.
//!
//! ## Design
//!
//! - Each entry records the resolved commands of one undo step and, for each,
//!   the forward/inverse intent pairs planned for it
//! - Undo takes the *nearest entry of the calling session*, wherever it sits,
//!   applies its inverses backwards and moves it to the redo stack
//! - Redo is the mirror image, replaying forwards in original order
//! - A new entry clears the redo entries of its own session only
//! - Entries of other sessions are never touched
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut stack = UndoStack::new();
//! stack.push(HistoryEntry::single(Some("a".into()), applied));
//!
//! // Undo the latest edit of session "a", even if "b" edited since
//! stack.undo(Some("a"), &mut content)?;
//! stack.redo(Some("a"), &mut content)?;
//! ```

use crate::content::Content;
use crate::intent::{apply_steps, revert_steps, Step};
use crate::mutations::{Command, MutationError, MutationResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A successfully applied command together with the steps it was planned into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedCommand {
    pub command: Command,
    pub steps: Vec<Step>,
}

impl AppliedCommand {
    pub fn new(command: Command, steps: Vec<Step>) -> Self {
        Self { command, steps }
    }
}

/// One undo step: a single command or a flushed batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub session: Option<String>,
    pub commands: Vec<AppliedCommand>,
}

impl HistoryEntry {
    pub fn single(session: Option<String>, applied: AppliedCommand) -> Self {
        Self {
            session,
            commands: vec![applied],
        }
    }

    pub fn batch(session: Option<String>, commands: Vec<AppliedCommand>) -> Self {
        Self { session, commands }
    }

    pub fn is_batch(&self) -> bool {
        self.commands.len() > 1
    }

    /// Every step of every command, in application order
    pub fn steps(&self) -> impl DoubleEndedIterator<Item = &Step> {
        self.commands.iter().flat_map(|applied| applied.steps.iter())
    }

    fn belongs_to(&self, session: Option<&str>) -> bool {
        self.session.as_deref() == session
    }
}

/// Shared undo/redo history for a document
#[derive(Debug, Default)]
pub struct UndoStack {
    /// Most recent last
    undo_stack: Vec<HistoryEntry>,

    /// Most recent last
    redo_stack: Vec<HistoryEntry>,

    /// Maximum number of undo entries (0 = unlimited)
    max_levels: usize,
}

impl UndoStack {
    /// Create an unbounded undo stack
    pub fn new() -> Self {
        Self::with_max_levels(0)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
        }
    }

    pub fn set_max_levels(&mut self, max_levels: usize) {
        self.max_levels = max_levels;
        self.trim();
    }

    /// Record a new entry, invalidating the redo entries of its session
    pub fn push(&mut self, entry: HistoryEntry) {
        let session = entry.session.clone();
        self.redo_stack
            .retain(|pending| !pending.belongs_to(session.as_deref()));
        self.undo_stack.push(entry);
        self.trim();
    }

    /// Most recent undo entry of `session`
    pub fn latest_mut(&mut self, session: Option<&str>) -> Option<&mut HistoryEntry> {
        self.undo_stack
            .iter_mut()
            .rev()
            .find(|entry| entry.belongs_to(session))
    }

    pub fn clear_redo(&mut self, session: Option<&str>) {
        self.redo_stack.retain(|pending| !pending.belongs_to(session));
    }

    /// Revert the nearest entry of `session` and move it to the redo stack
    pub fn undo(&mut self, session: Option<&str>, content: &mut Content) -> MutationResult<()> {
        let index = Self::nearest(&self.undo_stack, session).ok_or(MutationError::NothingToUndo)?;
        let entry = self.undo_stack.remove(index);
        if let Err(err) = revert_steps(entry.steps(), content) {
            warn!(error = %err, index, "undo entry no longer applies");
            self.undo_stack.insert(index, entry);
            return Err(MutationError::StaleHistory(err.to_string()));
        }
        debug!(
            index,
            depth = self.undo_stack.len(),
            commands = entry.commands.len(),
            "undid entry"
        );
        self.redo_stack.push(entry);
        Ok(())
    }

    /// Replay the nearest redo entry of `session` and move it back to the undo stack
    pub fn redo(&mut self, session: Option<&str>, content: &mut Content) -> MutationResult<()> {
        let index = Self::nearest(&self.redo_stack, session).ok_or(MutationError::NothingToRedo)?;
        let entry = self.redo_stack.remove(index);
        if let Err(err) = apply_steps(entry.steps(), content) {
            warn!(error = %err, index, "redo entry no longer applies");
            self.redo_stack.insert(index, entry);
            return Err(MutationError::StaleHistory(err.to_string()));
        }
        debug!(index, commands = entry.commands.len(), "redid entry");
        self.undo_stack.push(entry);
        self.trim();
        Ok(())
    }

    pub fn can_undo(&self, session: Option<&str>) -> bool {
        Self::nearest(&self.undo_stack, session).is_some()
    }

    pub fn can_redo(&self, session: Option<&str>) -> bool {
        Self::nearest(&self.redo_stack, session).is_some()
    }

    /// Number of undo entries across all sessions
    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.undo_stack
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    fn nearest(stack: &[HistoryEntry], session: Option<&str>) -> Option<usize> {
        stack.iter().rposition(|entry| entry.belongs_to(session))
    }

    fn trim(&mut self) {
        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            let excess = self.undo_stack.len() - self.max_levels;
            self.undo_stack.drain(..excess);
        }
    }
}
