use crate::ast::Idea;
use crate::rank;

/// Visitor pattern for traversing the idea tree immutably
///
/// The default implementation walks every child in display order.
/// Override `visit_idea` to act on nodes, calling `walk_idea` to descend.
pub trait Visitor: Sized {
    fn visit_idea(&mut self, idea: &Idea) {
        walk_idea(self, idea);
    }
}

/// Mutable visitor for transforming ideas in place
///
/// `walk_idea_mut` reads the display order when it is called, so an
/// override may renumber a node's children before descending.
pub trait VisitorMut: Sized {
    fn visit_idea_mut(&mut self, idea: &mut Idea) {
        walk_idea_mut(self, idea);
    }
}

pub fn walk_idea<V: Visitor>(visitor: &mut V, idea: &Idea) {
    for child in idea.sorted_sub_ideas() {
        visitor.visit_idea(child);
    }
}

pub fn walk_idea_mut<V: VisitorMut>(visitor: &mut V, idea: &mut Idea) {
    for key in rank::display_order(&idea.ideas) {
        if let Some(child) = idea.ideas.get_mut(&key) {
            visitor.visit_idea_mut(child);
        }
    }
}

/// Calls a closure for every idea, pre-order or post-order
pub struct Traversal<F> {
    callback: F,
    post_order: bool,
}

impl<F: FnMut(&Idea)> Traversal<F> {
    pub fn new(callback: F, post_order: bool) -> Self {
        Self {
            callback,
            post_order,
        }
    }
}

impl<F: FnMut(&Idea)> Visitor for Traversal<F> {
    fn visit_idea(&mut self, idea: &Idea) {
        if !self.post_order {
            (self.callback)(idea);
        }
        walk_idea(self, idea);
        if self.post_order {
            (self.callback)(idea);
        }
    }
}

/// Removes the given attribute keys from every idea of a subtree
pub struct AttributeStripper<'a> {
    keys: &'a [String],
}

impl<'a> AttributeStripper<'a> {
    pub fn new(keys: &'a [String]) -> Self {
        Self { keys }
    }
}

impl VisitorMut for AttributeStripper<'_> {
    fn visit_idea_mut(&mut self, idea: &mut Idea) {
        for key in self.keys {
            idea.attr.remove(key);
        }
        walk_idea_mut(self, idea);
    }
}
