//! Turns a command into recorded steps without touching the document.
//!
//! Planning resolves everything the command leaves implicit (generated ids,
//! target ranks, resource keys) so that the resolved command is what gets
//! announced and replayed. Every rejection happens here, before any write.

use crate::config::Configuration;
use crate::content::{Content, Resource};
use crate::document::CommandOutput;
use crate::intent::{Intent, Step};
use crate::mutations::{Command, MutationError, MutationResult};
use crate::post_effects::PostEffectEngine;
use crate::resources::{self, ResourceKeys};
use ideamap_model::rank::{self, Rank, RankGroup};
use ideamap_model::{
    AttributeStripper, IdAllocator, Idea, IdeaId, Link, ParseError, Parser, VisitorMut,
};
use serde_json::Value;
use std::sync::Arc;

/// The outcome of planning one command
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    /// The command with every implicit argument filled in
    pub command: Command,
    pub steps: Vec<Step>,
    pub output: CommandOutput,
}

impl Plan {
    fn new(command: Command, steps: Vec<Step>, output: CommandOutput) -> Self {
        Self {
            command,
            steps,
            output,
        }
    }

    fn applied(command: Command, forward: Intent, inverse: Intent) -> Self {
        Self::new(command, vec![Step::new(forward, inverse)], CommandOutput::Applied)
    }
}

pub(crate) struct Planner<'a> {
    pub content: &'a Content,
    pub configuration: &'a Configuration,
    pub keys: &'a ResourceKeys,
    pub effects: &'a PostEffectEngine,
    /// Effective session of the dispatch
    pub session: Option<&'a str>,
}

impl<'a> Planner<'a> {
    pub fn plan(&self, command: &Command) -> MutationResult<Plan> {
        let mut plan = match command {
            Command::UpdateTitle { id, title } | Command::InitialiseTitle { id, title } => {
                self.plan_title(command, id, title)
            }
            Command::AddSubIdea {
                parent_id,
                title,
                id,
            } => self.plan_add_sub_idea(parent_id, title.as_deref(), id.as_ref()),
            Command::RemoveSubIdea { id } => self.plan_remove_sub_idea(id),
            Command::ChangeParent { id, new_parent_id } => self.plan_change_parent(id, new_parent_id),
            Command::InsertIntermediate { id, title, new_id } => {
                self.plan_insert_intermediate(id, title, new_id.as_ref())
            }
            Command::Paste {
                target_id,
                json,
                new_id,
            } => self.plan_paste(target_id, json, new_id.as_ref()),
            Command::UpdateAttr { id, key, value } => self.plan_update_attr(id, key, value),
            Command::MergeAttrProperty {
                id,
                key,
                prop,
                value,
            } => self.plan_merge_attr_property(id, key, prop, value),
            Command::AddLink { from, to } => self.plan_add_link(from, to),
            Command::RemoveLink { from, to } => self.plan_remove_link(from, to),
            Command::UpdateLinkAttr {
                from,
                to,
                key,
                value,
            } => self.plan_update_link_attr(from, to, key, value),
            Command::PositionBefore { id, before_id } => {
                self.plan_position_before(id, before_id.as_ref())
            }
            Command::MoveRelative { id, direction } => self.plan_move_relative(id, *direction),
            Command::Flip { id } => self.plan_flip(id),
            Command::StoreResource { content, key } => self.plan_store_resource(content, key.as_deref()),
            Command::Batch { .. } | Command::Undo | Command::Redo => {
                Err(MutationError::NotRecordable(command.name()))
            }
        }?;
        let secondary = self.effects.analyze(&plan.command, self.content);
        plan.steps.extend(secondary);
        Ok(plan)
    }

    fn idea(&self, id: &IdeaId) -> MutationResult<&'a Idea> {
        self.content
            .find_idea(id)
            .ok_or_else(|| MutationError::IdeaNotFound(id.clone()))
    }

    /// Parent of a non-root idea
    fn parent_of(&self, id: &IdeaId) -> MutationResult<&'a Idea> {
        if self.content.is_root(id) {
            return Err(MutationError::NoParent(id.clone()));
        }
        self.content
            .root
            .find_parent(id)
            .ok_or_else(|| MutationError::IdeaNotFound(id.clone()))
    }

    /// Slot for a new last child: balanced groups under the root, positive elsewhere
    fn append_slot_under(&self, parent: &Idea) -> Slot {
        let group = if self.content.is_root(&parent.id) {
            rank::balanced_group(&parent.ideas)
        } else {
            RankGroup::Positive
        };
        append_slot(parent, group)
    }

    fn fresh_id(&self, requested: Option<&IdeaId>) -> MutationResult<IdeaId> {
        match requested {
            Some(id) if self.content.root.is_base_used(id.base()) => {
                Err(MutationError::IdAlreadyUsed(id.clone()))
            }
            Some(id) => Ok(id.clone()),
            None => self
                .content
                .next_id_base()
                .map(|base| IdeaId::with_session(base, self.session))
                .ok_or(MutationError::IdsExhausted),
        }
    }

    fn plan_title(&self, command: &Command, id: &IdeaId, title: &str) -> MutationResult<Plan> {
        let idea = self.idea(id)?;
        if idea.title == title {
            return Err(MutationError::NoChange);
        }
        Ok(Plan::applied(
            command.clone(),
            Intent::SetTitle {
                id: id.clone(),
                title: title.to_string(),
            },
            Intent::SetTitle {
                id: id.clone(),
                title: idea.title.clone(),
            },
        ))
    }

    fn plan_add_sub_idea(
        &self,
        parent_id: &IdeaId,
        title: Option<&str>,
        id: Option<&IdeaId>,
    ) -> MutationResult<Plan> {
        let new_id = self.fresh_id(id)?;
        let parent = self
            .content
            .find_idea(parent_id)
            .ok_or_else(|| MutationError::ParentNotFound(parent_id.clone()))?;
        let slot = self.append_slot_under(parent);
        let insert = Step::new(
            Intent::InsertIdea {
                parent_id: parent_id.clone(),
                rank: slot.rank,
                idea: Idea::new(new_id.clone(), title.unwrap_or_default()),
            },
            Intent::RemoveIdea { id: new_id.clone() },
        );

        Ok(Plan::new(
            Command::AddSubIdea {
                parent_id: parent_id.clone(),
                title: title.map(str::to_string),
                id: Some(new_id.clone()),
            },
            slot.then(insert),
            CommandOutput::Id(new_id),
        ))
    }

    fn plan_remove_sub_idea(&self, id: &IdeaId) -> MutationResult<Plan> {
        let parent = self.parent_of(id)?;
        let (rank, idea) = parent
            .ideas
            .iter()
            .find(|(_, child)| &child.id == id)
            .ok_or_else(|| MutationError::IdeaNotFound(id.clone()))?;

        Ok(Plan::applied(
            Command::RemoveSubIdea { id: id.clone() },
            Intent::RemoveIdea { id: id.clone() },
            Intent::InsertIdea {
                parent_id: parent.id.clone(),
                rank: *rank,
                idea: idea.clone(),
            },
        ))
    }

    fn plan_change_parent(&self, id: &IdeaId, new_parent_id: &IdeaId) -> MutationResult<Plan> {
        if id == new_parent_id {
            return Err(MutationError::CycleDetected);
        }
        let idea = self.idea(id)?;
        let new_parent = self
            .content
            .find_idea(new_parent_id)
            .ok_or_else(|| MutationError::ParentNotFound(new_parent_id.clone()))?;
        if idea.is_in_subtree(new_parent_id) {
            return Err(MutationError::CycleDetected);
        }
        let old_parent = self.parent_of(id)?;
        if &old_parent.id == new_parent_id {
            return Err(MutationError::NoChange);
        }
        let old_rank = old_parent
            .find_child_rank_by_id(id)
            .ok_or_else(|| MutationError::IdeaNotFound(id.clone()))?;

        let slot = self.append_slot_under(new_parent);
        let step = Step::new(
            Intent::MoveIdea {
                id: id.clone(),
                parent_id: new_parent_id.clone(),
                rank: slot.rank,
            },
            Intent::MoveIdea {
                id: id.clone(),
                parent_id: old_parent.id.clone(),
                rank: old_rank,
            },
        );

        Ok(Plan::new(
            Command::ChangeParent {
                id: id.clone(),
                new_parent_id: new_parent_id.clone(),
            },
            slot.then(step),
            CommandOutput::Applied,
        ))
    }

    fn plan_insert_intermediate(
        &self,
        id: &IdeaId,
        title: &str,
        new_id: Option<&IdeaId>,
    ) -> MutationResult<Plan> {
        let parent = self.parent_of(id)?;
        let new_id = self.fresh_id(new_id)?;
        let old_rank = parent
            .find_child_rank_by_id(id)
            .ok_or_else(|| MutationError::IdeaNotFound(id.clone()))?;
        // Parking spot for the new idea until `id` has moved under it
        let slot = append_slot(parent, old_rank.group());
        let parked = slot.rank;
        let home = slot.rank_after(id).unwrap_or(old_rank);

        let steps = slot.then_all([
            Step::new(
                Intent::InsertIdea {
                    parent_id: parent.id.clone(),
                    rank: parked,
                    idea: Idea::new(new_id.clone(), title),
                },
                Intent::RemoveIdea { id: new_id.clone() },
            ),
            Step::new(
                Intent::MoveIdea {
                    id: id.clone(),
                    parent_id: new_id.clone(),
                    rank: Rank::from(1),
                },
                Intent::MoveIdea {
                    id: id.clone(),
                    parent_id: parent.id.clone(),
                    rank: home,
                },
            ),
            Step::new(
                Intent::MoveIdea {
                    id: new_id.clone(),
                    parent_id: parent.id.clone(),
                    rank: home,
                },
                Intent::MoveIdea {
                    id: new_id.clone(),
                    parent_id: parent.id.clone(),
                    rank: parked,
                },
            ),
        ]);

        Ok(Plan::new(
            Command::InsertIntermediate {
                id: id.clone(),
                title: title.to_string(),
                new_id: Some(new_id.clone()),
            },
            steps,
            CommandOutput::Id(new_id),
        ))
    }

    fn plan_paste(
        &self,
        target_id: &IdeaId,
        json: &Value,
        new_id: Option<&IdeaId>,
    ) -> MutationResult<Plan> {
        if !has_pastable_content(json) {
            return Err(MutationError::NothingToPaste);
        }
        let target = self.idea(target_id)?;
        let allocator = match new_id {
            Some(id) if self.content.root.is_base_used(id.base()) => {
                return Err(MutationError::IdAlreadyUsed(id.clone()));
            }
            Some(id) => IdAllocator::starting_at(id.base(), id.session(), self.content.root.used_bases()),
            None => IdAllocator::after(self.content.root.max_id_base(), self.session),
        };

        let mut pasted = Parser::parse_with_fresh_ids(json, allocator).map_err(|err| match err {
            ParseError::IdsExhausted { .. } => MutationError::IdsExhausted,
            err => MutationError::InvalidArguments {
                command: "paste".into(),
                message: err.to_string(),
            },
        })?;
        AttributeStripper::new(&self.configuration.non_cloned_attributes).visit_idea_mut(&mut pasted);
        rerank_recursively(&mut pasted);

        let pasted_id = pasted.id.clone();
        let slot = self.append_slot_under(target);
        let insert = Step::new(
            Intent::InsertIdea {
                parent_id: target_id.clone(),
                rank: slot.rank,
                idea: pasted,
            },
            Intent::RemoveIdea {
                id: pasted_id.clone(),
            },
        );

        Ok(Plan::new(
            Command::Paste {
                target_id: target_id.clone(),
                json: json.clone(),
                new_id: Some(pasted_id.clone()),
            },
            slot.then(insert),
            CommandOutput::Id(pasted_id),
        ))
    }

    fn plan_update_attr(&self, id: &IdeaId, key: &str, value: &Value) -> MutationResult<Plan> {
        let idea = self.idea(id)?;
        let current = idea.attr.get(key);
        let updated = resolve_attr_update(current, value)?;

        Ok(Plan::applied(
            Command::UpdateAttr {
                id: id.clone(),
                key: key.to_string(),
                value: value.clone(),
            },
            Intent::SetAttr {
                id: id.clone(),
                key: key.to_string(),
                value: updated,
            },
            Intent::SetAttr {
                id: id.clone(),
                key: key.to_string(),
                value: current.cloned(),
            },
        ))
    }

    fn plan_merge_attr_property(
        &self,
        id: &IdeaId,
        key: &str,
        prop: &str,
        value: &Value,
    ) -> MutationResult<Plan> {
        let idea = self.idea(id)?;
        let mut merged = idea
            .attr
            .get(key)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        if is_removal_marker(value) {
            merged.remove(prop);
        } else {
            merged.insert(prop.to_string(), value.clone());
        }
        self.plan_update_attr(id, key, &Value::Object(merged))
    }

    fn plan_add_link(&self, from: &IdeaId, to: &IdeaId) -> MutationResult<Plan> {
        if from == to {
            return Err(MutationError::InvalidLink(format!("{from} cannot link to itself")));
        }
        let start = self.idea(from)?;
        let end = self.idea(to)?;
        if start.is_in_subtree(to) || end.is_in_subtree(from) {
            return Err(MutationError::InvalidLink(format!(
                "{from} and {to} are on the same branch"
            )));
        }
        if self.content.links.iter().any(|link| link.connects(from, to)) {
            return Err(MutationError::LinkExists);
        }

        Ok(Plan::applied(
            Command::AddLink {
                from: from.clone(),
                to: to.clone(),
            },
            Intent::InsertLink {
                index: self.content.links.len(),
                link: Link::new(from.clone(), to.clone()),
            },
            Intent::RemoveLink {
                from: from.clone(),
                to: to.clone(),
            },
        ))
    }

    fn plan_remove_link(&self, from: &IdeaId, to: &IdeaId) -> MutationResult<Plan> {
        let index = self
            .content
            .link_index(from, to)
            .ok_or(MutationError::LinkNotFound)?;

        Ok(Plan::applied(
            Command::RemoveLink {
                from: from.clone(),
                to: to.clone(),
            },
            Intent::RemoveLink {
                from: from.clone(),
                to: to.clone(),
            },
            Intent::InsertLink {
                index,
                link: self.content.links[index].clone(),
            },
        ))
    }

    fn plan_update_link_attr(
        &self,
        from: &IdeaId,
        to: &IdeaId,
        key: &str,
        value: &Value,
    ) -> MutationResult<Plan> {
        let index = self
            .content
            .link_index(from, to)
            .ok_or(MutationError::LinkNotFound)?;
        let current = self.content.links[index].attr.get(key);
        let updated = resolve_attr_update(current, value)?;
        let set = |value: Option<Value>| Intent::SetLinkAttr {
            from: from.clone(),
            to: to.clone(),
            key: key.to_string(),
            value,
        };

        Ok(Plan::applied(
            Command::UpdateLinkAttr {
                from: from.clone(),
                to: to.clone(),
                key: key.to_string(),
                value: value.clone(),
            },
            set(updated),
            set(current.cloned()),
        ))
    }

    fn plan_position_before(&self, id: &IdeaId, before_id: Option<&IdeaId>) -> MutationResult<Plan> {
        if before_id == Some(id) {
            return Err(MutationError::AlreadyInPosition);
        }
        let parent = self.parent_of(id)?;
        let current = parent
            .find_child_rank_by_id(id)
            .ok_or_else(|| MutationError::IdeaNotFound(id.clone()))?;
        let group = current.group();
        let members = rank::group_ranks(&parent.ideas, group);
        let command = Command::PositionBefore {
            id: id.clone(),
            before_id: before_id.cloned(),
        };

        let Some(before_id) = before_id else {
            if members.last() == Some(&current) {
                return Err(MutationError::AlreadyInPosition);
            }
            if let Some(tail) = rank::append_rank(&parent.ideas, group) {
                return Ok(rerank_one(command, &parent.id, id, tail, current));
            }
            let mut order: Vec<(Rank, IdeaId)> = group_members(parent, group)
                .into_iter()
                .filter(|(rank, _)| *rank != current)
                .collect();
            order.push((current, id.clone()));
            return Ok(Plan::new(
                command,
                vec![respread(&parent.id, &order, group)],
                CommandOutput::Applied,
            ));
        };

        let before_parent = self
            .content
            .root
            .find_parent(before_id)
            .ok_or_else(|| MutationError::IdeaNotFound(before_id.clone()))?;
        if before_parent.id != parent.id {
            return Err(MutationError::NotSiblings);
        }
        let before_rank = parent
            .find_child_rank_by_id(before_id)
            .ok_or_else(|| MutationError::IdeaNotFound(before_id.clone()))?;
        if before_rank.group() != group {
            return Err(MutationError::SignGroupMismatch);
        }

        let preceding = members
            .iter()
            .copied()
            .filter(|rank| rank.magnitude() < before_rank.magnitude())
            .last();
        if preceding == Some(current) {
            return Err(MutationError::AlreadyInPosition);
        }

        if let Some(target) = rank::between(preceding, before_rank) {
            return Ok(rerank_one(command, &parent.id, id, target, current));
        }

        // No representable midpoint: renumber the whole group in the wanted order
        let mut order: Vec<(Rank, IdeaId)> = group_members(parent, group)
            .into_iter()
            .filter(|(rank, _)| *rank != current)
            .collect();
        let slot = order
            .iter()
            .position(|(rank, _)| *rank == before_rank)
            .unwrap_or(order.len());
        order.insert(slot, (current, id.clone()));

        Ok(Plan::new(
            command,
            vec![respread(&parent.id, &order, group)],
            CommandOutput::Applied,
        ))
    }

    fn plan_move_relative(&self, id: &IdeaId, direction: i64) -> MutationResult<Plan> {
        let parent = self.parent_of(id)?;
        let current = parent
            .find_child_rank_by_id(id)
            .ok_or_else(|| MutationError::IdeaNotFound(id.clone()))?;
        let members = parent.group_children(current.group());
        let index = members
            .iter()
            .position(|(rank, _)| *rank == current)
            .ok_or_else(|| MutationError::IdeaNotFound(id.clone()))? as i64;

        // The idea lands before the sibling at `target`
        let target = if direction > 0 {
            index.saturating_add(direction).saturating_add(1)
        } else {
            index.saturating_add(direction)
        };
        if target < 0 {
            return Err(MutationError::AlreadyInPosition);
        }
        let before_id = usize::try_from(target)
            .ok()
            .and_then(|target| members.get(target))
            .map(|(_, sibling)| sibling.id.clone());
        self.plan_position_before(id, before_id.as_ref())
    }

    fn plan_flip(&self, id: &IdeaId) -> MutationResult<Plan> {
        let root = &self.content.root;
        let Some(current) = root.find_child_rank_by_id(id) else {
            self.idea(id)?;
            return Err(MutationError::NotRootChild(id.clone()));
        };
        let command = Command::Flip { id: id.clone() };
        let opposite = current.group().opposite();
        if let Some(flipped) = rank::append_rank(&root.ideas, opposite) {
            return Ok(rerank_one(command, &root.id, id, flipped, current));
        }
        let mut order = group_members(root, opposite);
        order.push((current, id.clone()));
        Ok(Plan::new(
            command,
            vec![respread(&root.id, &order, opposite)],
            CommandOutput::Applied,
        ))
    }

    fn plan_store_resource(&self, content: &Resource, key: Option<&str>) -> MutationResult<Plan> {
        let stored = &self.content.resources;
        let key = match key {
            Some(key) => key.to_string(),
            None => {
                if let Some(existing) = resources::find_equal(stored, content) {
                    // Re-reference: nothing to record or announce
                    return Ok(Plan::new(
                        Command::StoreResource {
                            content: Arc::clone(content),
                            key: Some(existing.clone()),
                        },
                        Vec::new(),
                        CommandOutput::ResourceKey(existing),
                    ));
                }
                self.keys.issue(stored, self.session)
            }
        };
        Ok(Plan::new(
            Command::StoreResource {
                content: Arc::clone(content),
                key: Some(key.clone()),
            },
            vec![Step::new(
                Intent::SetResource {
                    key: key.clone(),
                    content: Some(Arc::clone(content)),
                },
                Intent::SetResource {
                    key: key.clone(),
                    content: stored.get(&key).cloned(),
                },
            )],
            CommandOutput::ResourceKey(key),
        ))
    }
}

/// Where a new last child of a group goes.
///
/// A group whose largest magnitude can no longer be extended is renumbered
/// first by `respread`; `rank` is then the position after its members.
struct Slot {
    rank: Rank,
    respread: Option<Step>,
}

impl Slot {
    fn then(self, step: Step) -> Vec<Step> {
        self.then_all([step])
    }

    fn then_all<const N: usize>(self, steps: [Step; N]) -> Vec<Step> {
        self.respread.into_iter().chain(steps).collect()
    }

    /// Rank of `id` once the respread ran, `None` when it does not move
    fn rank_after(&self, id: &IdeaId) -> Option<Rank> {
        match self.respread.as_ref().map(|step| &step.forward) {
            Some(Intent::Rerank { ranks, .. }) => ranks
                .iter()
                .find(|(child, _)| child == id)
                .map(|(_, rank)| *rank),
            _ => None,
        }
    }
}

fn append_slot(parent: &Idea, group: RankGroup) -> Slot {
    if let Some(rank) = rank::append_rank(&parent.ideas, group) {
        return Slot {
            rank,
            respread: None,
        };
    }
    let order = group_members(parent, group);
    Slot {
        rank: rank::nth_rank(group, order.len() + 1),
        respread: Some(respread(&parent.id, &order, group)),
    }
}

/// `(rank, id)` of the children in `group`, display order
fn group_members(parent: &Idea, group: RankGroup) -> Vec<(Rank, IdeaId)> {
    parent
        .group_children(group)
        .into_iter()
        .map(|(rank, child)| (rank, child.id.clone()))
        .collect()
}

/// Renumber `order` to `±1, ±2, …` in one step
fn respread(parent_id: &IdeaId, order: &[(Rank, IdeaId)], group: RankGroup) -> Step {
    let (forward, inverse) = order
        .iter()
        .zip(rank::spread(group, order.len()))
        .map(|((old, child), new)| ((child.clone(), new), (child.clone(), *old)))
        .unzip();
    Step::new(
        Intent::Rerank {
            parent_id: parent_id.clone(),
            ranks: forward,
        },
        Intent::Rerank {
            parent_id: parent_id.clone(),
            ranks: inverse,
        },
    )
}

fn rerank_one(command: Command, parent_id: &IdeaId, id: &IdeaId, to: Rank, from: Rank) -> Plan {
    let ranks = |rank| Intent::Rerank {
        parent_id: parent_id.clone(),
        ranks: vec![(id.clone(), rank)],
    };
    Plan::applied(command, ranks(to), ranks(from))
}

/// `null`, `false`, `"false"`, `{}` and `[]` remove an attribute
pub(crate) fn is_removal_marker(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(text) => text == "false",
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// The value to store (`None` removes), or `NoChange` when nothing would change
fn resolve_attr_update(current: Option<&Value>, value: &Value) -> MutationResult<Option<Value>> {
    if is_removal_marker(value) {
        match current {
            None => Err(MutationError::NoChange),
            Some(_) => Ok(None),
        }
    } else if current == Some(value) {
        Err(MutationError::NoChange)
    } else {
        Ok(Some(value.clone()))
    }
}

fn has_pastable_content(json: &Value) -> bool {
    let Some(object) = json.as_object() else {
        return false;
    };
    let titled = match object.get("title") {
        None | Some(Value::Null) => false,
        Some(Value::String(title)) => !title.is_empty(),
        Some(_) => true,
    };
    let attributed = object
        .get("attr")
        .and_then(Value::as_object)
        .is_some_and(|attr| !attr.is_empty());
    titled || attributed
}

/// Renumber children `1..n` in display order at every level
fn rerank_recursively(idea: &mut Idea) {
    let order = rank::display_order(&idea.ideas);
    let mut children = std::mem::take(&mut idea.ideas);
    for (old, new) in order.into_iter().zip(rank::spread(RankGroup::Positive, children.len())) {
        if let Some(mut child) = children.remove(&old) {
            rerank_recursively(&mut child);
            idea.ideas.insert(new, child);
        }
    }
}
