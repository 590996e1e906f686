//! # Document Handle
//!
//! The aggregate every session edits: one idea tree, one link list, one
//! resource map, one shared history and the listeners told about changes.
//!
//! ## Dispatch
//!
//! ```text
//! Command ─→ plan (read only) ─→ apply steps ─→ record ─→ notify
//!               │ reject              │ roll back   │
//!               ↓                     ↓             ├─ open batch of the session
//!          MutationError        MutationError       └─ undo stack entry
//! ```
//!
//! Every command runs under an *effective session*: the session passed to
//! the dispatch, else the document's default session, else none. Generated
//! ids, history entries, open batches and notifications all carry it.

use crate::config::Configuration;
use crate::content::{Content, Resource};
use crate::events::{EventBus, ListenerHandle, Notification};
use crate::intent::apply_steps;
use crate::mutations::{Command, MutationError, MutationResult};
use crate::planner::Planner;
use crate::post_effects::PostEffectEngine;
use crate::resources::ResourceKeys;
use crate::session::Sessions;
use crate::undo_stack::{AppliedCommand, HistoryEntry, UndoStack};
use crate::EditorError;
use ideamap_model::{Idea, IdeaId, IdeaSummary, Link};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// What a successful dispatch hands back
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Applied,
    /// Id of the idea the command created
    Id(IdeaId),
    /// Key the content was stored under
    ResourceKey(String),
}

impl CommandOutput {
    pub fn id(&self) -> Option<&IdeaId> {
        match self {
            CommandOutput::Id(id) => Some(id),
            _ => None,
        }
    }

    pub fn resource_key(&self) -> Option<&str> {
        match self {
            CommandOutput::ResourceKey(key) => Some(key),
            _ => None,
        }
    }

    fn into_id(self, command: &str) -> MutationResult<IdeaId> {
        match self {
            CommandOutput::Id(id) => Ok(id),
            other => Err(MutationError::InvalidArguments {
                command: command.to_string(),
                message: format!("expected a new id, got {other:?}"),
            }),
        }
    }

    fn into_resource_key(self) -> MutationResult<String> {
        match self {
            CommandOutput::ResourceKey(key) => Ok(key),
            other => Err(MutationError::InvalidArguments {
                command: "storeResource".into(),
                message: format!("expected a resource key, got {other:?}"),
            }),
        }
    }
}

/// Editable mind map shared by any number of sessions
#[derive(Debug)]
pub struct Document {
    content: Content,
    configuration: Configuration,
    history: UndoStack,
    sessions: Sessions,
    listeners: EventBus,
    keys: ResourceKeys,
    effects: PostEffectEngine,

    /// Default session for dispatches that do not name one
    session: Option<String>,
}

impl Document {
    /// Build a document from its nested keyed form.
    ///
    /// `session` becomes the default session and tags the ids generated
    /// for ideas that arrive without one.
    pub fn from_value(raw: &Value, session: Option<&str>) -> Result<Self, EditorError> {
        let content = Content::from_value(raw, session)?;
        debug!(
            root = %content.root.id,
            links = content.links.len(),
            resources = content.resources.len(),
            "loaded document"
        );
        Ok(Self {
            content,
            configuration: Configuration::default(),
            history: UndoStack::new(),
            sessions: Sessions::new(),
            listeners: EventBus::new(),
            keys: ResourceKeys::new(),
            effects: PostEffectEngine::new(),
            session: session.map(str::to_string),
        })
    }

    pub fn from_json(source: &str, session: Option<&str>) -> Result<Self, EditorError> {
        let raw: Value = serde_json::from_str(source)?;
        Self::from_value(&raw, session)
    }

    pub fn with_configuration(mut self, configuration: Configuration) -> Self {
        self.set_configuration(configuration);
        self
    }

    pub fn set_configuration(&mut self, configuration: Configuration) {
        self.history.set_max_levels(configuration.max_undo_levels);
        self.configuration = configuration;
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Nested keyed form including links, resources and `formatVersion`
    pub fn to_value(&self) -> Value {
        self.content.to_value()
    }

    pub fn root(&self) -> &Idea {
        &self.content.root
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn links(&self) -> &[Link] {
        &self.content.links
    }

    /// Default session
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    pub fn history(&self) -> &UndoStack {
        &self.history
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&Notification) + 'static) -> ListenerHandle {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, handle: ListenerHandle) -> bool {
        self.listeners.unsubscribe(handle)
    }

    // ---------------------------------------------------------------------
    // Dispatch
    // ---------------------------------------------------------------------

    /// Run a command under `session` (the default session when `None`)
    #[instrument(level = "debug", skip_all, fields(command = command.name(), session = ?session))]
    pub fn exec_command(
        &mut self,
        command: Command,
        session: Option<&str>,
    ) -> MutationResult<CommandOutput> {
        let session = self.effective_session(session);
        let session = session.as_deref();
        match command {
            Command::Batch { commands } => self.exec_batch(commands, session),
            Command::Undo => self.undo_for(session).map(|()| CommandOutput::Applied),
            Command::Redo => self.redo_for(session).map(|()| CommandOutput::Applied),
            command => self.dispatch(command, session),
        }
    }

    /// Run a command given by name and positional arguments
    pub fn exec_named(
        &mut self,
        name: &str,
        args: &[Value],
        session: Option<&str>,
    ) -> MutationResult<CommandOutput> {
        let command = Command::from_named(name, args)?;
        self.exec_command(command, session)
    }

    /// Run a command given in its tagged JSON form
    pub fn exec_json(&mut self, source: &str, session: Option<&str>) -> Result<CommandOutput, EditorError> {
        let command: Command = serde_json::from_str(source)?;
        Ok(self.exec_command(command, session)?)
    }

    fn effective_session(&self, session: Option<&str>) -> Option<String> {
        session.map(str::to_string).or_else(|| self.session.clone())
    }

    /// Plan, apply and record one recordable command
    fn dispatch(&mut self, command: Command, session: Option<&str>) -> MutationResult<CommandOutput> {
        let planned = Planner {
            content: &self.content,
            configuration: &self.configuration,
            keys: &self.keys,
            effects: &self.effects,
            session,
        }
        .plan(&command);
        let plan = match planned {
            Ok(plan) => plan,
            Err(err) => {
                debug!(command = command.name(), error = %err, "rejected command");
                return Err(err);
            }
        };

        if plan.steps.is_empty() {
            trace!(command = plan.command.name(), "nothing to record");
            return Ok(plan.output);
        }
        apply_steps(&plan.steps, &mut self.content)?;
        debug!(
            command = plan.command.name(),
            steps = plan.steps.len(),
            "applied command"
        );

        if let Command::StoreResource { key: Some(key), .. } = &plan.command {
            if let Some(content) = self.content.resources.get(key).cloned() {
                self.listeners.emit(&Notification::ResourceStored {
                    content,
                    key: key.clone(),
                    session: session.map(str::to_string),
                });
            }
        }

        let applied = AppliedCommand::new(plan.command, plan.steps);
        if matches!(applied.command, Command::InitialiseTitle { .. }) {
            self.record_initialise_title(applied, session);
        } else {
            self.record(applied, session);
        }
        Ok(plan.output)
    }

    /// Join the open batch, or push a history entry and notify
    fn record(&mut self, applied: AppliedCommand, session: Option<&str>) {
        match self.sessions.record(session, applied) {
            Ok(()) => trace!(session = ?session, "added to open batch"),
            Err(applied) => {
                let notification = changed_notification(&applied.command, session);
                self.history
                    .push(HistoryEntry::single(session.map(str::to_string), applied));
                if let Some(notification) = notification {
                    self.listeners.emit(&notification);
                }
            }
        }
    }

    /// Naming a fresh idea belongs to the undo step that created it
    fn record_initialise_title(&mut self, applied: AppliedCommand, session: Option<&str>) {
        let applied = match self.sessions.record(session, applied) {
            Ok(()) => return,
            Err(applied) => applied,
        };
        let notification = changed_notification(&applied.command, session);
        match self.history.latest_mut(session) {
            Some(entry) => {
                entry.commands.push(applied);
                self.history.clear_redo(session);
                debug!(session = ?session, "merged title into previous entry");
            }
            None => self
                .history
                .push(HistoryEntry::single(session.map(str::to_string), applied)),
        }
        if let Some(notification) = notification {
            self.listeners.emit(&notification);
        }
    }

    fn exec_batch(&mut self, commands: Vec<Command>, session: Option<&str>) -> MutationResult<CommandOutput> {
        self.start_batch_for(session);
        let mut applied = 0;
        for command in commands {
            match self.dispatch(command, session) {
                Ok(_) => applied += 1,
                Err(err) => debug!(error = %err, "skipped batch command"),
            }
        }
        self.end_batch_for(session);
        if applied == 0 {
            return Err(MutationError::NoChange);
        }
        Ok(CommandOutput::Applied)
    }

    // ---------------------------------------------------------------------
    // Batches
    // ---------------------------------------------------------------------

    pub fn start_batch(&mut self) {
        let session = self.session.clone();
        self.start_batch_for(session.as_deref());
    }

    /// Open a batch for `session`, flushing the one already open
    pub fn start_batch_for(&mut self, session: Option<&str>) {
        if let Some(previous) = self.sessions.open_batch(session) {
            self.flush(previous, session);
        }
        trace!(session = ?session, "opened batch");
    }

    pub fn end_batch(&mut self) {
        let session = self.session.clone();
        self.end_batch_for(session.as_deref());
    }

    pub fn end_batch_for(&mut self, session: Option<&str>) {
        if let Some(commands) = self.sessions.take_batch(session) {
            self.flush(commands, session);
        }
    }

    /// Run `f` inside a batch of the default session
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let session = self.session.clone();
        self.batch_for(session.as_deref(), f)
    }

    pub fn batch_for<R>(&mut self, session: Option<&str>, f: impl FnOnce(&mut Self) -> R) -> R {
        self.start_batch_for(session);
        let result = f(self);
        self.end_batch_for(session);
        result
    }

    fn flush(&mut self, mut commands: Vec<AppliedCommand>, session: Option<&str>) {
        let owner = session.map(str::to_string);
        match commands.len() {
            0 => trace!(session = ?session, "discarded empty batch"),
            1 => {
                if let Some(applied) = commands.pop() {
                    let notification = changed_notification(&applied.command, session);
                    self.history.push(HistoryEntry::single(owner, applied));
                    if let Some(notification) = notification {
                        self.listeners.emit(&notification);
                    }
                }
            }
            count => {
                let tuples = commands
                    .iter()
                    .map(|applied| applied.command.to_tuple())
                    .collect();
                self.history.push(HistoryEntry::batch(owner.clone(), commands));
                debug!(session = ?session, commands = count, "flushed batch");
                self.listeners.emit(&Notification::Changed {
                    command: "batch".into(),
                    args: Value::Array(tuples),
                    session: owner,
                });
            }
        }
    }

    // ---------------------------------------------------------------------
    // History
    // ---------------------------------------------------------------------

    pub fn undo(&mut self) -> MutationResult<()> {
        self.exec_command(Command::Undo, None).map(drop)
    }

    pub fn redo(&mut self) -> MutationResult<()> {
        self.exec_command(Command::Redo, None).map(drop)
    }

    /// Revert the most recent undo step of `session`
    pub fn undo_for(&mut self, session: Option<&str>) -> MutationResult<()> {
        self.end_batch_for(session);
        self.history.undo(session, &mut self.content)?;
        self.listeners.emit(&Notification::Changed {
            command: "undo".into(),
            args: Value::Array(Vec::new()),
            session: session.map(str::to_string),
        });
        Ok(())
    }

    pub fn redo_for(&mut self, session: Option<&str>) -> MutationResult<()> {
        self.end_batch_for(session);
        self.history.redo(session, &mut self.content)?;
        self.listeners.emit(&Notification::Changed {
            command: "redo".into(),
            args: Value::Null,
            session: session.map(str::to_string),
        });
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo(self.session())
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo(self.session())
    }

    // ---------------------------------------------------------------------
    // Commands under the default session
    // ---------------------------------------------------------------------

    pub fn update_title(&mut self, id: impl Into<IdeaId>, title: &str) -> MutationResult<()> {
        self.run(Command::UpdateTitle {
            id: id.into(),
            title: title.to_string(),
        })
    }

    /// Set a title, merged into the previous undo step of the session
    pub fn initialise_title(&mut self, id: impl Into<IdeaId>, title: &str) -> MutationResult<()> {
        self.run(Command::InitialiseTitle {
            id: id.into(),
            title: title.to_string(),
        })
    }

    pub fn add_sub_idea(&mut self, parent_id: impl Into<IdeaId>, title: Option<&str>) -> MutationResult<IdeaId> {
        self.add_sub_idea_with_id(parent_id, title, None)
    }

    pub fn add_sub_idea_with_id(
        &mut self,
        parent_id: impl Into<IdeaId>,
        title: Option<&str>,
        id: Option<IdeaId>,
    ) -> MutationResult<IdeaId> {
        self.exec_command(
            Command::AddSubIdea {
                parent_id: parent_id.into(),
                title: title.map(str::to_string),
                id,
            },
            None,
        )?
        .into_id("addSubIdea")
    }

    pub fn remove_sub_idea(&mut self, id: impl Into<IdeaId>) -> MutationResult<()> {
        self.run(Command::RemoveSubIdea { id: id.into() })
    }

    pub fn change_parent(&mut self, id: impl Into<IdeaId>, new_parent_id: impl Into<IdeaId>) -> MutationResult<()> {
        self.run(Command::ChangeParent {
            id: id.into(),
            new_parent_id: new_parent_id.into(),
        })
    }

    /// Put a new idea between `id` and its parent, returning the new id
    pub fn insert_intermediate(
        &mut self,
        id: impl Into<IdeaId>,
        title: &str,
        new_id: Option<IdeaId>,
    ) -> MutationResult<IdeaId> {
        self.exec_command(
            Command::InsertIntermediate {
                id: id.into(),
                title: title.to_string(),
                new_id,
            },
            None,
        )?
        .into_id("insertIntermediate")
    }

    pub fn paste(
        &mut self,
        target_id: impl Into<IdeaId>,
        json: &Value,
        new_id: Option<IdeaId>,
    ) -> MutationResult<IdeaId> {
        self.exec_command(
            Command::Paste {
                target_id: target_id.into(),
                json: json.clone(),
                new_id,
            },
            None,
        )?
        .into_id("paste")
    }

    pub fn update_attr(&mut self, id: impl Into<IdeaId>, key: &str, value: Value) -> MutationResult<()> {
        self.run(Command::UpdateAttr {
            id: id.into(),
            key: key.to_string(),
            value,
        })
    }

    pub fn merge_attr_property(
        &mut self,
        id: impl Into<IdeaId>,
        key: &str,
        prop: &str,
        value: Value,
    ) -> MutationResult<()> {
        self.run(Command::MergeAttrProperty {
            id: id.into(),
            key: key.to_string(),
            prop: prop.to_string(),
            value,
        })
    }

    pub fn add_link(&mut self, from: impl Into<IdeaId>, to: impl Into<IdeaId>) -> MutationResult<()> {
        self.run(Command::AddLink {
            from: from.into(),
            to: to.into(),
        })
    }

    pub fn remove_link(&mut self, from: impl Into<IdeaId>, to: impl Into<IdeaId>) -> MutationResult<()> {
        self.run(Command::RemoveLink {
            from: from.into(),
            to: to.into(),
        })
    }

    pub fn update_link_attr(
        &mut self,
        from: impl Into<IdeaId>,
        to: impl Into<IdeaId>,
        key: &str,
        value: Value,
    ) -> MutationResult<()> {
        self.run(Command::UpdateLinkAttr {
            from: from.into(),
            to: to.into(),
            key: key.to_string(),
            value,
        })
    }

    /// Move `id` right before `before_id`, or to the end of its group
    pub fn position_before(&mut self, id: impl Into<IdeaId>, before_id: Option<IdeaId>) -> MutationResult<()> {
        self.run(Command::PositionBefore {
            id: id.into(),
            before_id,
        })
    }

    pub fn move_relative(&mut self, id: impl Into<IdeaId>, direction: i64) -> MutationResult<()> {
        self.run(Command::MoveRelative {
            id: id.into(),
            direction,
        })
    }

    pub fn flip(&mut self, id: impl Into<IdeaId>) -> MutationResult<()> {
        self.run(Command::Flip { id: id.into() })
    }

    /// Store `content`, returning its key. Equal content stored before
    /// without a key is shared instead of stored again.
    pub fn store_resource(&mut self, content: Value, key: Option<&str>) -> MutationResult<String> {
        self.store_shared_resource(Arc::new(content), key)
    }

    /// Like `store_resource`, keeping the caller's allocation
    pub fn store_shared_resource(&mut self, content: Resource, key: Option<&str>) -> MutationResult<String> {
        self.exec_command(
            Command::StoreResource {
                content,
                key: key.map(str::to_string),
            },
            None,
        )?
        .into_resource_key()
    }

    fn run(&mut self, command: Command) -> MutationResult<()> {
        self.exec_command(command, None).map(drop)
    }

    // ---------------------------------------------------------------------
    // Multi-idea operations, each one undo step
    // ---------------------------------------------------------------------

    pub fn remove_multiple(&mut self, ids: &[IdeaId]) -> Vec<MutationResult<()>> {
        self.batch(|document| {
            ids.iter()
                .map(|id| document.remove_sub_idea(id.clone()))
                .collect()
        })
    }

    pub fn paste_multiple(&mut self, target_id: impl Into<IdeaId>, items: &[Value]) -> Vec<MutationResult<IdeaId>> {
        let target_id = target_id.into();
        self.batch(|document| {
            items
                .iter()
                .map(|item| document.paste(target_id.clone(), item, None))
                .collect()
        })
    }

    /// Group `ids` under one new idea placed where the first of them was.
    ///
    /// Ideas after the first that cannot be moved under it are skipped.
    pub fn insert_intermediate_multiple(&mut self, ids: &[IdeaId]) -> MutationResult<IdeaId> {
        let Some((first, rest)) = ids.split_first() else {
            return Err(MutationError::InvalidArguments {
                command: "insertIntermediateMultiple".into(),
                message: "no ideas given".into(),
            });
        };
        self.batch(|document| -> MutationResult<IdeaId> {
            let parent = document.insert_intermediate(first.clone(), "", None)?;
            for id in rest {
                if let Err(err) = document.change_parent(id.clone(), parent.clone()) {
                    debug!(id = %id, error = %err, "skipped idea while grouping");
                }
            }
            Ok(parent)
        })
    }

    /// Owned copy of an idea and its subtree, the root when `id` is `None`
    pub fn clone_idea(&self, id: Option<&IdeaId>) -> Option<Idea> {
        match id {
            None => Some(self.content.root.clone()),
            Some(id) => self.content.find_idea(id).cloned(),
        }
    }

    /// Owned copies of every idea found
    pub fn clone_multiple(&self, ids: &[IdeaId]) -> Vec<Idea> {
        ids.iter()
            .filter_map(|id| self.clone_idea(Some(id)))
            .collect()
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn find_idea(&self, id: &IdeaId) -> Option<&Idea> {
        self.content.find_idea(id)
    }

    /// Root attribute, copied
    pub fn get_attr(&self, key: &str) -> Option<Value> {
        self.content.root.get_attr(key).cloned()
    }

    pub fn get_attr_by_id(&self, id: &IdeaId, key: &str) -> Option<Value> {
        self.content.find_idea(id)?.get_attr(key).cloned()
    }

    pub fn get_link(&self, from: &IdeaId, to: &IdeaId) -> Option<&Link> {
        self.content
            .links
            .iter()
            .find(|link| link.matches(from, to))
    }

    pub fn get_link_attr(&self, from: &IdeaId, to: &IdeaId, key: &str) -> Option<Value> {
        self.get_link(from, to)?.attr.get(key).cloned()
    }

    /// Shared view of stored content
    pub fn get_resource(&self, key: &str) -> Option<Resource> {
        self.content.resources.get(key).cloned()
    }

    pub fn find<P: Fn(&Idea) -> bool>(&self, predicate: P) -> Vec<IdeaSummary> {
        self.content.root.find(predicate)
    }

    pub fn traverse<F: FnMut(&Idea)>(&self, callback: F, post_order: bool) {
        self.content.root.traverse(callback, post_order);
    }
}

/// `changed` for a recorded command; storing a resource has its own notification
fn changed_notification(command: &Command, session: Option<&str>) -> Option<Notification> {
    if matches!(command, Command::StoreResource { .. }) {
        return None;
    }
    Some(Notification::Changed {
        command: command.name().to_string(),
        args: Value::Array(command.args()),
        session: session.map(str::to_string),
    })
}
