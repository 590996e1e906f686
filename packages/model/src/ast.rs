use crate::id_generator::IdeaId;
use crate::rank::{self, Rank, RankGroup};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Free-form metadata attached to an idea or a link
pub type Attributes = Map<String, Value>;

/// Children of an idea keyed by rank
pub type Children = BTreeMap<Rank, Idea>;

/// A node of the idea tree
#[derive(Debug, Clone, PartialEq)]
pub struct Idea {
    pub id: IdeaId,
    pub title: String,
    pub attr: Attributes,
    pub ideas: Children,
    /// Opaque passthrough, never interpreted
    pub meta: Option<Value>,
}

impl Idea {
    pub fn new(id: impl Into<IdeaId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            attr: Attributes::new(),
            ideas: Children::new(),
            meta: None,
        }
    }

    /// Builder-style child insertion, mostly for fixtures
    pub fn with_child(mut self, rank: impl Into<Rank>, child: Idea) -> Self {
        self.ideas.insert(rank.into(), child);
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attr.insert(key.into(), value);
        self
    }

    /// Direct children in display order
    pub fn sorted_sub_ideas(&self) -> Vec<&Idea> {
        rank::display_order(&self.ideas)
            .into_iter()
            .filter_map(|rank| self.ideas.get(&rank))
            .collect()
    }

    /// Direct children of one group, ascending by magnitude
    pub fn group_children(&self, group: RankGroup) -> Vec<(Rank, &Idea)> {
        rank::group_ranks(&self.ideas, group)
            .into_iter()
            .filter_map(|rank| self.ideas.get(&rank).map(|child| (rank, child)))
            .collect()
    }

    /// Remove a direct child, returning it with the rank it occupied
    pub fn take_child(&mut self, id: &IdeaId) -> Option<(Rank, Idea)> {
        let rank = self.find_child_rank_by_id(id)?;
        self.ideas.remove(&rank).map(|child| (rank, child))
    }

    pub fn get_attr(&self, key: &str) -> Option<&Value> {
        self.attr.get(key)
    }
}

/// A directed cross-reference between two ideas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub idea_id_from: IdeaId,
    pub idea_id_to: IdeaId,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attr: Attributes,
}

impl Link {
    pub fn new(from: IdeaId, to: IdeaId) -> Self {
        Self {
            idea_id_from: from,
            idea_id_to: to,
            attr: Attributes::new(),
        }
    }

    /// Exact directional match
    pub fn matches(&self, from: &IdeaId, to: &IdeaId) -> bool {
        &self.idea_id_from == from && &self.idea_id_to == to
    }

    /// Match in either direction
    pub fn connects(&self, a: &IdeaId, b: &IdeaId) -> bool {
        self.matches(a, b) || self.matches(b, a)
    }

    pub fn references(&self, id: &IdeaId) -> bool {
        &self.idea_id_from == id || &self.idea_id_to == id
    }
}

/// `{id, title}` pair returned by searches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaSummary {
    pub id: IdeaId,
    pub title: String,
}
