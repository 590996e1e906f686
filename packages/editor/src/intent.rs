//! # Recorded Intents
//!
//! Primitive, position-independent writes that commands are planned into.
//!
//! Each planned [`Step`] pairs a forward intent with its inverse, so a
//! history entry can be undone by applying inverses in reverse and redone by
//! applying forwards in order. Intents address ideas and links by identity,
//! never by path, so they still apply after foreign edits moved things around.
//!
//! ```text
//!   plan (read-only)          apply (transactional)
//!   Command ──→ [Step] ──→ forward₀ forward₁ … forwardₙ
//!                              ↑ on failure at k: inverseₖ₋₁ … inverse₀
//! ```

use crate::content::{Content, Resource};
use crate::mutations::{MutationError, MutationResult};
use ideamap_model::rank::{self, Rank};
use ideamap_model::{Idea, IdeaId, Link};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{trace, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Intent {
    SetTitle {
        id: IdeaId,
        title: String,
    },

    /// Insert a whole subtree. An occupied rank is nudged to a free one, or refused when none is left.
    InsertIdea {
        parent_id: IdeaId,
        rank: Rank,
        idea: Idea,
    },

    RemoveIdea {
        id: IdeaId,
    },

    MoveIdea {
        id: IdeaId,
        parent_id: IdeaId,
        rank: Rank,
    },

    /// Assign new ranks to several children of one parent at once
    Rerank {
        parent_id: IdeaId,
        ranks: Vec<(IdeaId, Rank)>,
    },

    /// `None` removes the key
    SetAttr {
        id: IdeaId,
        key: String,
        value: Option<Value>,
    },

    InsertLink {
        index: usize,
        link: Link,
    },

    RemoveLink {
        from: IdeaId,
        to: IdeaId,
    },

    SetLinkAttr {
        from: IdeaId,
        to: IdeaId,
        key: String,
        value: Option<Value>,
    },

    SetResource {
        key: String,
        content: Option<Resource>,
    },
}

/// A forward write and the write that undoes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub forward: Intent,
    pub inverse: Intent,
}

impl Step {
    pub fn new(forward: Intent, inverse: Intent) -> Self {
        Self { forward, inverse }
    }
}

impl Intent {
    /// Apply to `content`. On error nothing was changed.
    pub fn apply(&self, content: &mut Content) -> MutationResult<()> {
        trace!(intent = ?self, "applying intent");
        match self {
            Intent::SetTitle { id, title } => {
                let idea = content
                    .find_idea_mut(id)
                    .ok_or_else(|| MutationError::IdeaNotFound(id.clone()))?;
                idea.title = title.clone();
                Ok(())
            }

            Intent::InsertIdea {
                parent_id,
                rank,
                idea,
            } => Self::apply_insert(content, parent_id, *rank, idea),

            Intent::RemoveIdea { id } => {
                let parent = content
                    .root
                    .find_parent_mut(id)
                    .ok_or_else(|| MutationError::IdeaNotFound(id.clone()))?;
                parent
                    .take_child(id)
                    .map(|_| ())
                    .ok_or_else(|| MutationError::IdeaNotFound(id.clone()))
            }

            Intent::MoveIdea {
                id,
                parent_id,
                rank,
            } => Self::apply_move(content, id, parent_id, *rank),

            Intent::Rerank { parent_id, ranks } => Self::apply_rerank(content, parent_id, ranks),

            Intent::SetAttr { id, key, value } => {
                let idea = content
                    .find_idea_mut(id)
                    .ok_or_else(|| MutationError::IdeaNotFound(id.clone()))?;
                match value {
                    Some(value) => idea.attr.insert(key.clone(), value.clone()),
                    None => idea.attr.remove(key),
                };
                Ok(())
            }

            Intent::InsertLink { index, link } => {
                let index = (*index).min(content.links.len());
                content.links.insert(index, link.clone());
                Ok(())
            }

            Intent::RemoveLink { from, to } => {
                let index = content
                    .link_index(from, to)
                    .ok_or(MutationError::LinkNotFound)?;
                content.links.remove(index);
                Ok(())
            }

            Intent::SetLinkAttr {
                from,
                to,
                key,
                value,
            } => {
                let index = content
                    .link_index(from, to)
                    .ok_or(MutationError::LinkNotFound)?;
                let attr = &mut content.links[index].attr;
                match value {
                    Some(value) => attr.insert(key.clone(), value.clone()),
                    None => attr.remove(key),
                };
                Ok(())
            }

            Intent::SetResource { key, content: stored } => {
                match stored {
                    Some(stored) => content.resources.insert(key.clone(), Resource::clone(stored)),
                    None => content.resources.remove(key),
                };
                Ok(())
            }
        }
    }

    fn apply_insert(
        content: &mut Content,
        parent_id: &IdeaId,
        rank: Rank,
        idea: &Idea,
    ) -> MutationResult<()> {
        let mut clash = None;
        idea.traverse(
            |incoming| {
                if clash.is_none() && content.find_idea(&incoming.id).is_some() {
                    clash = Some(incoming.id.clone());
                }
            },
            false,
        );
        if let Some(id) = clash {
            return Err(MutationError::IdAlreadyUsed(id));
        }
        let parent = content
            .find_idea_mut(parent_id)
            .ok_or_else(|| MutationError::ParentNotFound(parent_id.clone()))?;
        let rank = rank::free_rank_near(&parent.ideas, rank)
            .ok_or_else(|| MutationError::RankExhausted(parent_id.clone()))?;
        place(parent, rank, idea.clone())
    }

    fn apply_move(
        content: &mut Content,
        id: &IdeaId,
        parent_id: &IdeaId,
        rank: Rank,
    ) -> MutationResult<()> {
        let moving = content
            .find_idea(id)
            .ok_or_else(|| MutationError::IdeaNotFound(id.clone()))?;
        if moving.is_in_subtree(parent_id) {
            return Err(MutationError::CycleDetected);
        }
        let target = content
            .find_idea(parent_id)
            .ok_or_else(|| MutationError::ParentNotFound(parent_id.clone()))?;
        // Chosen before detaching, so a full group fails without losing the idea
        let rank = rank::free_rank_near(&target.ideas, rank)
            .ok_or_else(|| MutationError::RankExhausted(parent_id.clone()))?;
        let (_, idea) = content
            .root
            .find_parent_mut(id)
            .and_then(|old_parent| old_parent.take_child(id))
            .ok_or_else(|| MutationError::NoParent(id.clone()))?;
        // The new parent is outside the moved subtree, so it is still reachable
        let parent = content
            .find_idea_mut(parent_id)
            .ok_or_else(|| MutationError::ParentNotFound(parent_id.clone()))?;
        place(parent, rank, idea)
    }

    fn apply_rerank(
        content: &mut Content,
        parent_id: &IdeaId,
        ranks: &[(IdeaId, Rank)],
    ) -> MutationResult<()> {
        let parent = content
            .find_idea_mut(parent_id)
            .ok_or_else(|| MutationError::ParentNotFound(parent_id.clone()))?;
        if let Some((missing, _)) = ranks
            .iter()
            .find(|(id, _)| !parent.contains_direct_child(id))
        {
            return Err(MutationError::IdeaNotFound(missing.clone()));
        }
        let mut taken = Vec::with_capacity(ranks.len());
        for (id, rank) in ranks {
            if let Some((old, child)) = parent.take_child(id) {
                taken.push((old, *rank, child));
            }
        }

        let mut occupied: BTreeMap<Rank, ()> = parent.ideas.keys().map(|rank| (*rank, ())).collect();
        let mut placed = Vec::with_capacity(taken.len());
        for (_, wanted, _) in &taken {
            let Some(rank) = rank::free_rank_near(&occupied, *wanted) else {
                break;
            };
            occupied.insert(rank, ());
            placed.push(rank);
        }
        if placed.len() < taken.len() {
            for (old, _, child) in taken {
                parent.ideas.insert(old, child);
            }
            return Err(MutationError::RankExhausted(parent_id.clone()));
        }
        for ((_, _, child), rank) in taken.into_iter().zip(placed) {
            parent.ideas.insert(rank, child);
        }
        Ok(())
    }
}

/// Put `child` at a rank known to be free; an occupied rank is refused
fn place(parent: &mut Idea, rank: Rank, child: Idea) -> MutationResult<()> {
    match parent.ideas.entry(rank) {
        Entry::Vacant(slot) => {
            slot.insert(child);
            Ok(())
        }
        Entry::Occupied(_) => Err(MutationError::RankExhausted(parent.id.clone())),
    }
}

/// Apply the forward intents in order, rolling back on failure
pub fn apply_steps<'a, I>(steps: I, content: &mut Content) -> MutationResult<()>
where
    I: IntoIterator<Item = &'a Step>,
{
    run(
        steps.into_iter().map(|step| (&step.forward, &step.inverse)),
        content,
    )
}

/// Apply the inverse intents in reverse order, rolling back on failure
pub fn revert_steps<'a, I>(steps: I, content: &mut Content) -> MutationResult<()>
where
    I: IntoIterator<Item = &'a Step>,
    I::IntoIter: DoubleEndedIterator,
{
    run(
        steps
            .into_iter()
            .rev()
            .map(|step| (&step.inverse, &step.forward)),
        content,
    )
}

fn run<'a>(
    pairs: impl Iterator<Item = (&'a Intent, &'a Intent)>,
    content: &mut Content,
) -> MutationResult<()> {
    let mut done: Vec<&Intent> = Vec::new();
    for (action, undo) in pairs {
        if let Err(err) = action.apply(content) {
            warn!(error = %err, applied = done.len(), "rolling back partially applied steps");
            for undo in done.into_iter().rev() {
                if let Err(rollback) = undo.apply(content) {
                    warn!(error = %rollback, "rollback step failed");
                }
            }
            return Err(err);
        }
        done.push(undo);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content() -> Content {
        Content::from_value(
            &json!({"id": 1, "ideas": {"1": {"id": 2, "title": "a"}, "2": {"id": 3, "title": "b"}}}),
            None,
        )
        .unwrap()
    }

    fn id(base: i64) -> IdeaId {
        IdeaId::new(base)
    }

    #[test]
    fn test_insert_nudges_occupied_rank() {
        let mut content = content();
        Intent::InsertIdea {
            parent_id: id(1),
            rank: Rank::from(1),
            idea: Idea::new(4, "c"),
        }
        .apply(&mut content)
        .unwrap();
        assert_eq!(content.root.ideas[&Rank::from(1)].id, id(2));
        let rank = content.root.find_child_rank_by_id(&id(4)).unwrap();
        assert!(rank.value() > 1.0 && rank.value() < 2.0);
    }

    #[test]
    fn test_insert_rejects_present_id() {
        let mut content = content();
        let before = content.clone();
        let result = Intent::InsertIdea {
            parent_id: id(1),
            rank: Rank::from(5),
            idea: Idea::new(9, "").with_child(1, Idea::new(3, "")),
        }
        .apply(&mut content);
        assert_eq!(result, Err(MutationError::IdAlreadyUsed(id(3))));
        assert_eq!(content, before);
    }

    #[test]
    fn test_insert_accepts_same_base_with_other_tag() {
        let mut content = content();
        Intent::InsertIdea {
            parent_id: id(1),
            rank: Rank::from(5),
            idea: Idea::new(IdeaId::tagged(3, "other"), ""),
        }
        .apply(&mut content)
        .unwrap();
        assert!(content.find_idea(&IdeaId::tagged(3, "other")).is_some());
    }

    fn crowded() -> Content {
        // Past 2^53 a step of one no longer moves the float
        Content::from_value(
            &json!({"id": 1, "ideas": {"1": {"id": 2, "ideas": {"1e17": {"id": 3, "title": "keep"}}}}}),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_insert_refuses_exhausted_rank() {
        let mut content = crowded();
        let before = content.clone();
        let result = Intent::InsertIdea {
            parent_id: id(2),
            rank: Rank::new(1e17).unwrap(),
            idea: Idea::new(4, "new"),
        }
        .apply(&mut content);
        assert_eq!(result, Err(MutationError::RankExhausted(id(2))));
        assert_eq!(content, before);
    }

    #[test]
    fn test_move_into_exhausted_rank_keeps_idea() {
        let mut content = crowded();
        content.root.ideas.insert(Rank::from(2), Idea::new(5, "mover"));
        let before = content.clone();
        let result = Intent::MoveIdea {
            id: id(5),
            parent_id: id(2),
            rank: Rank::new(1e17).unwrap(),
        }
        .apply(&mut content);
        assert_eq!(result, Err(MutationError::RankExhausted(id(2))));
        assert_eq!(content, before);
    }

    #[test]
    fn test_rerank_into_exhausted_rank_restores_children() {
        let mut content = crowded();
        let parent = content.find_idea_mut(&id(2)).unwrap();
        parent.ideas.insert(Rank::from(1), Idea::new(4, "small"));
        let before = content.clone();
        let result = Intent::Rerank {
            parent_id: id(2),
            ranks: vec![(id(4), Rank::new(1e17).unwrap())],
        }
        .apply(&mut content);
        assert_eq!(result, Err(MutationError::RankExhausted(id(2))));
        assert_eq!(content, before);
    }

    #[test]
    fn test_move_rejects_cycle() {
        let mut content = content();
        Intent::MoveIdea {
            id: id(3),
            parent_id: id(2),
            rank: Rank::from(1),
        }
        .apply(&mut content)
        .unwrap();
        let result = Intent::MoveIdea {
            id: id(2),
            parent_id: id(3),
            rank: Rank::from(1),
        }
        .apply(&mut content);
        assert_eq!(result, Err(MutationError::CycleDetected));
    }

    #[test]
    fn test_rerank_swaps_children() {
        let mut content = content();
        Intent::Rerank {
            parent_id: id(1),
            ranks: vec![(id(2), Rank::from(2)), (id(3), Rank::from(1))],
        }
        .apply(&mut content)
        .unwrap();
        assert_eq!(content.root.ideas[&Rank::from(1)].id, id(3));
        assert_eq!(content.root.ideas[&Rank::from(2)].id, id(2));
    }

    #[test]
    fn test_failed_step_rolls_back_earlier_ones() {
        let mut content = content();
        let before = content.clone();
        let steps = vec![
            Step::new(
                Intent::SetTitle {
                    id: id(2),
                    title: "changed".into(),
                },
                Intent::SetTitle {
                    id: id(2),
                    title: "a".into(),
                },
            ),
            Step::new(
                Intent::RemoveIdea { id: id(99) },
                Intent::RemoveIdea { id: id(99) },
            ),
        ];
        assert!(apply_steps(&steps, &mut content).is_err());
        assert_eq!(content, before);
    }

    #[test]
    fn test_revert_applies_inverses_backwards() {
        let mut content = content();
        let before = content.clone();
        let steps = vec![
            Step::new(
                Intent::InsertIdea {
                    parent_id: id(1),
                    rank: Rank::from(3),
                    idea: Idea::new(4, "new"),
                },
                Intent::RemoveIdea { id: id(4) },
            ),
            Step::new(
                Intent::SetTitle {
                    id: id(4),
                    title: "renamed".into(),
                },
                Intent::SetTitle {
                    id: id(4),
                    title: "new".into(),
                },
            ),
        ];
        apply_steps(&steps, &mut content).unwrap();
        assert_eq!(content.find_idea(&id(4)).unwrap().title, "renamed");
        revert_steps(&steps, &mut content).unwrap();
        assert_eq!(content, before);
    }

    #[test]
    fn test_fields_serialize_in_camel_case() {
        let intent = Intent::MoveIdea {
            id: id(3),
            parent_id: id(2),
            rank: Rank::from(-1),
        };
        let value = serde_json::to_value(&intent).unwrap();
        assert_eq!(value, json!({"type": "moveIdea", "id": 3, "parentId": 2, "rank": -1.0}));
        let back: Intent = serde_json::from_value(value).unwrap();
        assert_eq!(back, intent);
    }
}
