//! # Post-Effect System
//!
//! Commands trigger cascading steps to keep the document consistent.
//!
//! ## Design
//!
//! When a command is planned, it may require additional writes so that no
//! part of the document refers to something that is gone. For example:
//! - Removing an idea → remove every link touching it or its descendants
//!
//! Post-effects are:
//! - **Deterministic**: Same command and content always produce the same steps
//! - **Recorded**: Their steps join the command's history entry, so one undo
//!   reverts both
//! - **Planned up front**: They read the content before anything is applied

use crate::content::Content;
use crate::intent::{Intent, Step};
use crate::mutations::Command;
use std::collections::HashSet;

/// Post-effect that can be triggered by a command
pub trait PostEffect: std::fmt::Debug {
    /// Secondary steps to run after the command's own steps
    fn analyze(&self, command: &Command, content: &Content) -> Vec<Step>;
}

/// Remove links pointing into a removed subtree
#[derive(Debug)]
pub struct CascadeLinkRemoval;

impl PostEffect for CascadeLinkRemoval {
    fn analyze(&self, command: &Command, content: &Content) -> Vec<Step> {
        let Command::RemoveSubIdea { id } = command else {
            return Vec::new();
        };
        let Some(removed) = content.find_idea(id) else {
            return Vec::new();
        };
        let mut doomed: HashSet<_> = removed.get_sub_tree_ids().into_iter().collect();
        doomed.insert(id.clone());

        // Each removal shifts later links down by one
        let mut steps = Vec::new();
        for (index, link) in content.links.iter().enumerate() {
            if doomed.contains(&link.idea_id_from) || doomed.contains(&link.idea_id_to) {
                let shifted = index - steps.len();
                steps.push(Step::new(
                    Intent::RemoveLink {
                        from: link.idea_id_from.clone(),
                        to: link.idea_id_to.clone(),
                    },
                    Intent::InsertLink {
                        index: shifted,
                        link: link.clone(),
                    },
                ));
            }
        }
        steps
    }
}

/// Post-effect engine that applies all registered effects
#[derive(Debug)]
pub struct PostEffectEngine {
    effects: Vec<Box<dyn PostEffect>>,
}

impl PostEffectEngine {
    /// Create engine with default effects
    pub fn new() -> Self {
        Self {
            effects: vec![Box::new(CascadeLinkRemoval)],
        }
    }

    pub fn with_effect(mut self, effect: impl PostEffect + 'static) -> Self {
        self.effects.push(Box::new(effect));
        self
    }

    /// Analyze a command and generate all secondary steps
    pub fn analyze(&self, command: &Command, content: &Content) -> Vec<Step> {
        let mut secondary = Vec::new();

        for effect in &self.effects {
            secondary.append(&mut effect.analyze(command, content));
        }

        secondary
    }
}

impl Default for PostEffectEngine {
    fn default() -> Self {
        Self::new()
    }
}
