//! # Commands
//!
//! The closed set of named operations a session can dispatch.
//!
//! ## Wire forms
//!
//! - **Tagged**: `{"type": "updateTitle", "id": 1, "title": "new"}` (serde)
//! - **Named**: `("updateTitle", [1, "new"])`, the positional form carried
//!   in `changed` notifications and in `batch` tuples
//!
//! ## Semantics
//!
//! Every command either succeeds completely or is rejected with a
//! [`MutationError`]. Rejection never changes the document and never fires
//! a notification.

use crate::content::Resource;
use ideamap_model::IdeaId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Operations on the document, dispatched through `Document::exec_command`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    UpdateTitle {
        id: IdeaId,
        title: String,
    },

    /// Like `UpdateTitle`, but merged into the session's previous history entry
    InitialiseTitle {
        id: IdeaId,
        title: String,
    },

    AddSubIdea {
        parent_id: IdeaId,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        id: Option<IdeaId>,
    },

    RemoveSubIdea {
        id: IdeaId,
    },

    ChangeParent {
        id: IdeaId,
        new_parent_id: IdeaId,
    },

    /// Insert a new idea between `id` and its parent
    InsertIntermediate {
        id: IdeaId,
        title: String,
        #[serde(default)]
        new_id: Option<IdeaId>,
    },

    Paste {
        target_id: IdeaId,
        json: Value,
        #[serde(default)]
        new_id: Option<IdeaId>,
    },

    UpdateAttr {
        id: IdeaId,
        key: String,
        value: Value,
    },

    /// Set or remove one property of a map-valued attribute
    MergeAttrProperty {
        id: IdeaId,
        key: String,
        prop: String,
        value: Value,
    },

    AddLink {
        from: IdeaId,
        to: IdeaId,
    },

    RemoveLink {
        from: IdeaId,
        to: IdeaId,
    },

    UpdateLinkAttr {
        from: IdeaId,
        to: IdeaId,
        key: String,
        value: Value,
    },

    PositionBefore {
        id: IdeaId,
        #[serde(default)]
        before_id: Option<IdeaId>,
    },

    MoveRelative {
        id: IdeaId,
        direction: i64,
    },

    Flip {
        id: IdeaId,
    },

    /// `content` is shared with the store, history and notifications
    StoreResource {
        content: Resource,
        #[serde(default)]
        key: Option<String>,
    },

    Batch {
        commands: Vec<Command>,
    },

    Undo,

    Redo,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("Idea not found: {0}")]
    IdeaNotFound(IdeaId),

    #[error("Parent not found: {0}")]
    ParentNotFound(IdeaId),

    #[error("Id already used: {0}")]
    IdAlreadyUsed(IdeaId),

    #[error("Would create cycle")]
    CycleDetected,

    #[error("Nothing changed")]
    NoChange,

    #[error("Idea has no parent: {0}")]
    NoParent(IdeaId),

    #[error("Ideas are not siblings")]
    NotSiblings,

    #[error("Ideas are in different rank groups")]
    SignGroupMismatch,

    #[error("Idea is already in position")]
    AlreadyInPosition,

    #[error("Idea is not a child of the root: {0}")]
    NotRootChild(IdeaId),

    #[error("Invalid link: {0}")]
    InvalidLink(String),

    #[error("Link already exists")]
    LinkExists,

    #[error("Link not found")]
    LinkNotFound,

    #[error("Nothing to paste")]
    NothingToPaste,

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid arguments for {command}: {message}")]
    InvalidArguments { command: String, message: String },

    #[error("History entry no longer applies: {0}")]
    StaleHistory(String),

    #[error("Command cannot be recorded: {0}")]
    NotRecordable(&'static str),

    #[error("No free rank left among the children of {0}")]
    RankExhausted(IdeaId),

    #[error("No idea id left to allocate")]
    IdsExhausted,
}

pub type MutationResult<T> = Result<T, MutationError>;

impl Command {
    /// Name used by the positional form and in notifications
    pub fn name(&self) -> &'static str {
        match self {
            Command::UpdateTitle { .. } => "updateTitle",
            Command::InitialiseTitle { .. } => "initialiseTitle",
            Command::AddSubIdea { .. } => "addSubIdea",
            Command::RemoveSubIdea { .. } => "removeSubIdea",
            Command::ChangeParent { .. } => "changeParent",
            Command::InsertIntermediate { .. } => "insertIntermediate",
            Command::Paste { .. } => "paste",
            Command::UpdateAttr { .. } => "updateAttr",
            Command::MergeAttrProperty { .. } => "mergeAttrProperty",
            Command::AddLink { .. } => "addLink",
            Command::RemoveLink { .. } => "removeLink",
            Command::UpdateLinkAttr { .. } => "updateLinkAttr",
            Command::PositionBefore { .. } => "positionBefore",
            Command::MoveRelative { .. } => "moveRelative",
            Command::Flip { .. } => "flip",
            Command::StoreResource { .. } => "storeResource",
            Command::Batch { .. } => "batch",
            Command::Undo => "undo",
            Command::Redo => "redo",
        }
    }

    /// Positional arguments; trailing optional arguments are left out when absent
    pub fn args(&self) -> Vec<Value> {
        let id = IdeaId::to_value;
        match self {
            Command::UpdateTitle { id: target, title }
            | Command::InitialiseTitle { id: target, title } => {
                vec![id(target), Value::from(title.as_str())]
            }
            Command::AddSubIdea {
                parent_id,
                title,
                id: new_id,
            } => {
                let mut args = vec![id(parent_id)];
                if title.is_some() || new_id.is_some() {
                    args.push(title.as_deref().map_or(Value::Null, Value::from));
                }
                args.extend(new_id.as_ref().map(id));
                args
            }
            Command::RemoveSubIdea { id: target } | Command::Flip { id: target } => {
                vec![id(target)]
            }
            Command::ChangeParent { id: target, new_parent_id } => {
                vec![id(target), id(new_parent_id)]
            }
            Command::InsertIntermediate {
                id: target,
                title,
                new_id,
            } => {
                let mut args = vec![id(target), Value::from(title.as_str())];
                args.extend(new_id.as_ref().map(id));
                args
            }
            Command::Paste {
                target_id,
                json,
                new_id,
            } => {
                let mut args = vec![id(target_id), json.clone()];
                args.extend(new_id.as_ref().map(id));
                args
            }
            Command::UpdateAttr {
                id: target,
                key,
                value,
            } => vec![id(target), Value::from(key.as_str()), value.clone()],
            Command::MergeAttrProperty {
                id: target,
                key,
                prop,
                value,
            } => vec![
                id(target),
                Value::from(key.as_str()),
                Value::from(prop.as_str()),
                value.clone(),
            ],
            Command::AddLink { from, to } | Command::RemoveLink { from, to } => {
                vec![id(from), id(to)]
            }
            Command::UpdateLinkAttr {
                from,
                to,
                key,
                value,
            } => vec![id(from), id(to), Value::from(key.as_str()), value.clone()],
            Command::PositionBefore {
                id: target,
                before_id,
            } => {
                let mut args = vec![id(target)];
                args.extend(before_id.as_ref().map(id));
                args
            }
            Command::MoveRelative {
                id: target,
                direction,
            } => vec![id(target), Value::from(*direction)],
            Command::StoreResource { content, key } => {
                let mut args = vec![Value::clone(content)];
                args.extend(key.as_deref().map(Value::from));
                args
            }
            Command::Batch { commands } => commands.iter().map(Command::to_tuple).collect(),
            Command::Undo | Command::Redo => Vec::new(),
        }
    }

    /// `[name, ...args]`, the element shape of a `batch` notification
    pub fn to_tuple(&self) -> Value {
        let mut tuple = vec![Value::from(self.name())];
        tuple.extend(self.args());
        Value::Array(tuple)
    }

    /// Build a command from its name and positional arguments.
    ///
    /// Ids may be numbers or strings. Missing trailing optional arguments
    /// and `null` are equivalent.
    pub fn from_named(name: &str, args: &[Value]) -> MutationResult<Command> {
        let args = Args { command: name, args };
        let command = match name {
            "updateTitle" => Command::UpdateTitle {
                id: args.id(0)?,
                title: args.string(1)?,
            },
            "initialiseTitle" => Command::InitialiseTitle {
                id: args.id(0)?,
                title: args.string(1)?,
            },
            "addSubIdea" => Command::AddSubIdea {
                parent_id: args.id(0)?,
                title: args.optional_string(1)?,
                id: args.optional_id(2)?,
            },
            "removeSubIdea" => Command::RemoveSubIdea { id: args.id(0)? },
            "changeParent" => Command::ChangeParent {
                id: args.id(0)?,
                new_parent_id: args.id(1)?,
            },
            "insertIntermediate" => Command::InsertIntermediate {
                id: args.id(0)?,
                title: args.optional_string(1)?.unwrap_or_default(),
                new_id: args.optional_id(2)?,
            },
            "paste" => Command::Paste {
                target_id: args.id(0)?,
                json: args.value(1),
                new_id: args.optional_id(2)?,
            },
            "updateAttr" => Command::UpdateAttr {
                id: args.id(0)?,
                key: args.string(1)?,
                value: args.value(2),
            },
            "mergeAttrProperty" => Command::MergeAttrProperty {
                id: args.id(0)?,
                key: args.string(1)?,
                prop: args.string(2)?,
                value: args.value(3),
            },
            "addLink" => Command::AddLink {
                from: args.id(0)?,
                to: args.id(1)?,
            },
            "removeLink" => Command::RemoveLink {
                from: args.id(0)?,
                to: args.id(1)?,
            },
            "updateLinkAttr" => Command::UpdateLinkAttr {
                from: args.id(0)?,
                to: args.id(1)?,
                key: args.string(2)?,
                value: args.value(3),
            },
            "positionBefore" => Command::PositionBefore {
                id: args.id(0)?,
                before_id: args.optional_id(1)?,
            },
            "moveRelative" => Command::MoveRelative {
                id: args.id(0)?,
                direction: args.integer(1)?,
            },
            "flip" => Command::Flip { id: args.id(0)? },
            "storeResource" => Command::StoreResource {
                content: Arc::new(args.value(0)),
                key: args.optional_string(1)?,
            },
            "batch" => Command::Batch {
                commands: args.tuples()?,
            },
            "undo" => Command::Undo,
            "redo" => Command::Redo,
            other => return Err(MutationError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

/// Positional argument reader for `Command::from_named`
struct Args<'a> {
    command: &'a str,
    args: &'a [Value],
}

impl Args<'_> {
    fn invalid(&self, message: impl Into<String>) -> MutationError {
        MutationError::InvalidArguments {
            command: self.command.to_string(),
            message: message.into(),
        }
    }

    fn present(&self, index: usize) -> Option<&Value> {
        self.args.get(index).filter(|value| !value.is_null())
    }

    fn value(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or(Value::Null)
    }

    fn id(&self, index: usize) -> MutationResult<IdeaId> {
        self.optional_id(index)?
            .ok_or_else(|| self.invalid(format!("missing id at position {index}")))
    }

    fn optional_id(&self, index: usize) -> MutationResult<Option<IdeaId>> {
        self.present(index)
            .map(|value| {
                IdeaId::from_value(value)
                    .ok_or_else(|| self.invalid(format!("{value} is not an idea id")))
            })
            .transpose()
    }

    fn string(&self, index: usize) -> MutationResult<String> {
        self.optional_string(index)?
            .ok_or_else(|| self.invalid(format!("missing string at position {index}")))
    }

    fn optional_string(&self, index: usize) -> MutationResult<Option<String>> {
        match self.present(index) {
            None => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.clone())),
            Some(Value::Number(number)) => Ok(Some(number.to_string())),
            Some(Value::Bool(flag)) => Ok(Some(flag.to_string())),
            Some(other) => Err(self.invalid(format!("{other} is not a string"))),
        }
    }

    fn integer(&self, index: usize) -> MutationResult<i64> {
        let value = self
            .present(index)
            .ok_or_else(|| self.invalid(format!("missing number at position {index}")))?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|float| float as i64))
            .or_else(|| value.as_str().and_then(|text| text.trim().parse().ok()))
            .ok_or_else(|| self.invalid(format!("{value} is not a number")))
    }

    fn tuples(&self) -> MutationResult<Vec<Command>> {
        self.args
            .iter()
            .map(|tuple| {
                let items = tuple
                    .as_array()
                    .ok_or_else(|| self.invalid("batch entries must be [name, ...args]"))?;
                let (name, rest) = items
                    .split_first()
                    .ok_or_else(|| self.invalid("empty batch entry"))?;
                let name = name
                    .as_str()
                    .ok_or_else(|| self.invalid("batch entry name must be a string"))?;
                Command::from_named(name, rest)
            })
            .collect()
    }
}
