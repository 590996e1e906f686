//! Structural queries over an idea tree.
//!
//! Every lookup returns `Option`/`bool`; a missing id is an expected outcome,
//! not an error.

use crate::ast::{Idea, IdeaSummary};
use crate::id_generator::IdeaId;
use crate::rank::{Rank, RankGroup};
use crate::visitor::{Traversal, Visitor};
use std::collections::{HashSet, VecDeque};

impl Idea {
    /// Find a descendant by id. The idea itself never matches.
    pub fn find_sub_idea_by_id(&self, id: &IdeaId) -> Option<&Idea> {
        self.ideas.values().find_map(|child| {
            if &child.id == id {
                Some(child)
            } else {
                child.find_sub_idea_by_id(id)
            }
        })
    }

    pub fn find_sub_idea_by_id_mut(&mut self, id: &IdeaId) -> Option<&mut Idea> {
        for child in self.ideas.values_mut() {
            if &child.id == id {
                return Some(child);
            }
            if let Some(found) = child.find_sub_idea_by_id_mut(id) {
                return Some(found);
            }
        }
        None
    }

    /// Find this idea or a descendant by id
    pub fn find_idea(&self, id: &IdeaId) -> Option<&Idea> {
        if &self.id == id {
            Some(self)
        } else {
            self.find_sub_idea_by_id(id)
        }
    }

    pub fn find_idea_mut(&mut self, id: &IdeaId) -> Option<&mut Idea> {
        if &self.id == id {
            Some(self)
        } else {
            self.find_sub_idea_by_id_mut(id)
        }
    }

    /// Rank of a direct child
    pub fn find_child_rank_by_id(&self, id: &IdeaId) -> Option<Rank> {
        self.ideas
            .iter()
            .find(|(_, child)| &child.id == id)
            .map(|(rank, _)| *rank)
    }

    pub fn contains_direct_child(&self, id: &IdeaId) -> bool {
        self.find_child_rank_by_id(id).is_some()
    }

    /// Direct parent of `id` anywhere below this idea
    pub fn find_parent(&self, id: &IdeaId) -> Option<&Idea> {
        if self.contains_direct_child(id) {
            return Some(self);
        }
        self.ideas.values().find_map(|child| child.find_parent(id))
    }

    pub fn find_parent_mut(&mut self, id: &IdeaId) -> Option<&mut Idea> {
        if self.contains_direct_child(id) {
            return Some(self);
        }
        for child in self.ideas.values_mut() {
            if let Some(parent) = child.find_parent_mut(id) {
                return Some(parent);
            }
        }
        None
    }

    /// Ancestors of `id`, immediate parent first, this idea last.
    ///
    /// Empty for this idea's own id, `None` when `id` is absent.
    pub fn calculate_path(&self, id: &IdeaId) -> Option<Vec<&Idea>> {
        if &self.id == id {
            return Some(Vec::new());
        }
        self.ideas.values().find_map(|child| {
            child.calculate_path(id).map(|mut path| {
                path.push(self);
                path
            })
        })
    }

    /// True when `id` is this idea or below it
    pub fn is_in_subtree(&self, id: &IdeaId) -> bool {
        self.find_idea(id).is_some()
    }

    /// Ids of all descendants, depth-first in display order, each subtree before its root
    pub fn get_sub_tree_ids(&self) -> Vec<IdeaId> {
        let mut ids = Vec::new();
        for child in self.sorted_sub_ideas() {
            ids.extend(child.get_sub_tree_ids());
            ids.push(child.id.clone());
        }
        ids
    }

    /// Summaries of every idea matching `predicate`, shallow levels first
    pub fn find<P: Fn(&Idea) -> bool>(&self, predicate: P) -> Vec<IdeaSummary> {
        let mut found = Vec::new();
        let mut queue = VecDeque::from([self]);
        while let Some(idea) = queue.pop_front() {
            if predicate(idea) {
                found.push(IdeaSummary {
                    id: idea.id.clone(),
                    title: idea.title.clone(),
                });
            }
            queue.extend(idea.sorted_sub_ideas());
        }
        found
    }

    /// Visit every idea including this one; children in display order
    pub fn traverse<F: FnMut(&Idea)>(&self, callback: F, post_order: bool) {
        Traversal::new(callback, post_order).visit_idea(self);
    }

    /// Next sibling in the same group, display order
    pub fn next_sibling_id(&self, id: &IdeaId) -> Option<IdeaId> {
        self.neighbour_id(id, 1)
    }

    pub fn previous_sibling_id(&self, id: &IdeaId) -> Option<IdeaId> {
        self.neighbour_id(id, -1)
    }

    fn neighbour_id(&self, id: &IdeaId, offset: isize) -> Option<IdeaId> {
        let parent = self.find_parent(id)?;
        let rank = parent.find_child_rank_by_id(id)?;
        let group = parent.group_children(rank.group());
        let index = group.iter().position(|(r, _)| *r == rank)?;
        let target = index.checked_add_signed(offset)?;
        group.get(target).map(|(_, child)| child.id.clone())
    }

    /// Siblings sharing the sign group of `id`, excluding it, in display order
    pub fn same_side_sibling_ids(&self, id: &IdeaId) -> Vec<IdeaId> {
        let Some(parent) = self.find_parent(id) else {
            return Vec::new();
        };
        let group = parent
            .find_child_rank_by_id(id)
            .map_or(RankGroup::Positive, Rank::group);
        parent
            .group_children(group)
            .into_iter()
            .filter(|(_, child)| &child.id != id)
            .map(|(_, child)| child.id.clone())
            .collect()
    }

    /// True when the parent of `id` has any other child
    pub fn has_siblings(&self, id: &IdeaId) -> bool {
        self.find_parent(id)
            .is_some_and(|parent| parent.ideas.len() > 1)
    }

    /// Largest numeric id base in this subtree
    pub fn max_id_base(&self) -> i64 {
        self.ideas
            .values()
            .map(Idea::max_id_base)
            .fold(self.id.base(), i64::max)
    }

    /// All numeric id bases in this subtree
    pub fn used_bases(&self) -> HashSet<i64> {
        let mut bases = HashSet::new();
        self.traverse(
            |idea| {
                bases.insert(idea.id.base());
            },
            false,
        );
        bases
    }

    /// "Already used" check, by numeric base
    pub fn is_base_used(&self, base: i64) -> bool {
        self.id.base() == base || self.ideas.values().any(|child| child.is_base_used(base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(base: i64) -> IdeaId {
        IdeaId::new(base)
    }

    /// 1 ─┬─ (1) 11 ── (1) 111 ── (1) 1111
    ///    ├─ (2) 12
    ///    └─ (-1) 13 ── (1) 131
    fn sample() -> Idea {
        Idea::new(1, "root")
            .with_child(
                1,
                Idea::new(11, "one").with_child(
                    1,
                    Idea::new(111, "one one").with_child(1, Idea::new(1111, "deep")),
                ),
            )
            .with_child(2, Idea::new(12, "two"))
            .with_child(-1, Idea::new(13, "three").with_child(1, Idea::new(131, "one")))
    }

    #[test]
    fn test_find_sub_idea_by_id_excludes_self() {
        let idea = sample();
        assert!(idea.find_sub_idea_by_id(&id(1)).is_none());
        assert_eq!(idea.find_sub_idea_by_id(&id(1111)).unwrap().title, "deep");
        assert!(idea.find_sub_idea_by_id(&id(99)).is_none());
        assert_eq!(idea.find_idea(&id(1)).unwrap().title, "root");
    }

    #[test]
    fn test_find_parent() {
        let idea = sample();
        assert_eq!(idea.find_parent(&id(131)).unwrap().id, id(13));
        assert_eq!(idea.find_parent(&id(12)).unwrap().id, id(1));
        assert!(idea.find_parent(&id(1)).is_none());
        assert!(idea.find_parent(&id(99)).is_none());
    }

    #[test]
    fn test_calculate_path() {
        let idea = sample();
        let path: Vec<i64> = idea
            .calculate_path(&id(1111))
            .unwrap()
            .iter()
            .map(|i| i.id.base())
            .collect();
        assert_eq!(path, vec![111, 11, 1]);
        assert!(idea.calculate_path(&id(1)).unwrap().is_empty());
        assert!(idea.calculate_path(&id(99)).is_none());
    }

    #[test]
    fn test_get_sub_tree_ids_depth_first_in_group_order() {
        let ids: Vec<i64> = sample().get_sub_tree_ids().iter().map(IdeaId::base).collect();
        assert_eq!(ids, vec![1111, 111, 11, 12, 131, 13]);
    }

    #[test]
    fn test_find_is_breadth_first_and_includes_root() {
        let found: Vec<i64> = sample()
            .find(|idea| idea.title.contains("one") || idea.title == "root")
            .iter()
            .map(|s| s.id.base())
            .collect();
        assert_eq!(found, vec![1, 11, 111, 131]);
    }

    #[test]
    fn test_siblings_stay_inside_group() {
        let idea = sample();
        assert_eq!(idea.next_sibling_id(&id(11)), Some(id(12)));
        assert_eq!(idea.next_sibling_id(&id(12)), None);
        assert_eq!(idea.previous_sibling_id(&id(12)), Some(id(11)));
        assert_eq!(idea.previous_sibling_id(&id(13)), None);
        assert_eq!(idea.next_sibling_id(&id(1)), None);
        assert_eq!(idea.same_side_sibling_ids(&id(11)), vec![id(12)]);
        assert!(idea.same_side_sibling_ids(&id(13)).is_empty());
    }

    #[test]
    fn test_has_siblings_ignores_group() {
        let idea = sample();
        assert!(idea.has_siblings(&id(13)));
        assert!(!idea.has_siblings(&id(131)));
        assert!(!idea.has_siblings(&id(1)));
        assert!(!idea.has_siblings(&id(99)));
    }

    #[test]
    fn test_id_bases() {
        let idea = sample();
        assert_eq!(idea.max_id_base(), 1111);
        assert!(idea.is_base_used(131));
        assert!(!idea.is_base_used(132));
        assert_eq!(idea.used_bases().len(), 7);
    }
}
