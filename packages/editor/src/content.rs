use ideamap_model::{parse, serialize, Idea, IdeaId, Link, ParseResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared read-only view of stored resource content
pub type Resource = Arc<Value>;

/// Everything a command can change: the idea tree, the link list and the
/// resource map
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub root: Idea,
    pub links: Vec<Link>,
    pub resources: HashMap<String, Resource>,
}

impl Content {
    pub fn from_value(raw: &Value, session: Option<&str>) -> ParseResult<Self> {
        let parsed = parse(raw, session)?;
        Ok(Self {
            root: parsed.root,
            links: parsed.links,
            resources: parsed
                .resources
                .into_iter()
                .map(|(key, content)| (key, Arc::new(content)))
                .collect(),
        })
    }

    pub fn to_value(&self) -> Value {
        serialize(
            &self.root,
            &self.links,
            self.resources
                .iter()
                .map(|(key, content)| (key, content.as_ref())),
        )
    }

    pub fn find_idea(&self, id: &IdeaId) -> Option<&Idea> {
        self.root.find_idea(id)
    }

    pub fn find_idea_mut(&mut self, id: &IdeaId) -> Option<&mut Idea> {
        self.root.find_idea_mut(id)
    }

    pub fn is_root(&self, id: &IdeaId) -> bool {
        &self.root.id == id
    }

    /// Next numeric base for a generated id, `None` past `i64::MAX`
    pub fn next_id_base(&self) -> Option<i64> {
        self.root.max_id_base().checked_add(1)
    }

    pub fn link_index(&self, from: &IdeaId, to: &IdeaId) -> Option<usize> {
        self.links.iter().position(|link| link.matches(from, to))
    }
}
