//! # Ideamap Editor
//!
//! Shared editing engine for mind-map documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: nested JSON → idea tree, ids, ranks  │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: Document aggregate                  │
//! │  - Named commands with validation           │
//! │  - Planned, reversible intents              │
//! │  - Per-session selective undo/redo          │
//! │  - Per-session batches                      │
//! │  - Resource store shared by reference       │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ listeners: changed / resourceStored         │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Commands are the only writers**: every change goes through dispatch
//! 2. **Plan before write**: a rejected command leaves no trace
//! 3. **History records intents**: entries can be inspected and serialized
//! 4. **Sessions own their undo**: undo never reverts another session's edit
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ideamap_editor::{Command, Document};
//! use serde_json::json;
//!
//! let mut doc = Document::from_value(&json!({"id": 1, "title": "root"}), Some("alice"))?;
//!
//! let child = doc.add_sub_idea(1, Some("first"))?;
//! doc.exec_named("updateTitle", &[child.to_value(), json!("renamed")], Some("bob"))?;
//!
//! // Only alice's edit is reverted
//! doc.undo_for(Some("alice"))?;
//! ```

mod config;
mod content;
mod document;
mod errors;
mod events;
mod intent;
mod mutations;
mod planner;
mod post_effects;
mod resources;
mod session;
mod undo_stack;

pub use config::Configuration;
pub use content::{Content, Resource};
pub use document::{CommandOutput, Document};
pub use errors::EditorError;
pub use events::{EventBus, ListenerHandle, Notification};
pub use intent::{apply_steps, revert_steps, Intent, Step};
pub use mutations::{Command, MutationError, MutationResult};
pub use post_effects::{CascadeLinkRemoval, PostEffect, PostEffectEngine};
pub use resources::ResourceKeys;
pub use session::{EditSession, Sessions};
pub use undo_stack::{AppliedCommand, HistoryEntry, UndoStack};

// Re-export common types for convenience
pub use ideamap_model::{Idea, IdeaId, Link, Rank, RankGroup};
