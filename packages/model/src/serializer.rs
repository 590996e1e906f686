use crate::ast::{Idea, Link};
use crate::parser::FORMAT_VERSION;
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Serialize an idea to the nested keyed shape.
///
/// `attr` and `ideas` are omitted when empty; rank keys use the shortest
/// float form (`1`, `2.5`, `-3`).
pub fn idea_to_value(idea: &Idea) -> Value {
    let mut object = Map::new();
    object.insert("id".to_string(), idea.id.to_value());
    object.insert("title".to_string(), Value::String(idea.title.clone()));
    if !idea.attr.is_empty() {
        object.insert("attr".to_string(), Value::Object(idea.attr.clone()));
    }
    if !idea.ideas.is_empty() {
        let children = idea
            .ideas
            .iter()
            .map(|(rank, child)| (rank.to_string(), idea_to_value(child)))
            .collect();
        object.insert("ideas".to_string(), Value::Object(children));
    }
    if let Some(meta) = &idea.meta {
        object.insert("meta".to_string(), meta.clone());
    }
    Value::Object(object)
}

/// Serialize a whole document: the root idea plus `formatVersion`, `links`
/// and, when any are stored, `resources`
pub fn serialize<'a, R>(root: &Idea, links: &[Link], resources: R) -> Value
where
    R: IntoIterator<Item = (&'a String, &'a Value)>,
{
    let mut value = idea_to_value(root);
    if let Value::Object(object) = &mut value {
        object.insert("formatVersion".to_string(), Value::from(FORMAT_VERSION));
        object.insert(
            "links".to_string(),
            Value::Array(
                links
                    .iter()
                    .filter_map(|link| serde_json::to_value(link).ok())
                    .collect(),
            ),
        );
        let resources: BTreeMap<&String, &Value> = resources.into_iter().collect();
        if !resources.is_empty() {
            let resources = resources
                .into_iter()
                .map(|(key, content)| (key.clone(), content.clone()))
                .collect();
            object.insert("resources".to_string(), Value::Object(resources));
        }
    }
    value
}

impl Serialize for Idea {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        idea_to_value(self).serialize(serializer)
    }
}
