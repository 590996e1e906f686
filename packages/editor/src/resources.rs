//! Resource key issuance
//!
//! Generated keys have the shape `<sequence>/<salt>/<session>`. The salt is
//! random per document instance, so two replicas storing identical content
//! for the same session never produce the same key.

use crate::content::Resource;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ResourceKeys {
    salt: String,
}

impl ResourceKeys {
    pub fn new() -> Self {
        Self {
            salt: Uuid::new_v4().to_string(),
        }
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// A fresh key for `session`
    pub fn issue(&self, resources: &HashMap<String, Resource>, session: Option<&str>) -> String {
        let sequence = next_sequence(resources.keys().map(String::as_str), session);
        format!("{sequence}/{}/{}", self.salt, session.unwrap_or(""))
    }
}

impl Default for ResourceKeys {
    fn default() -> Self {
        Self::new()
    }
}

/// One past the largest leading integer among the keys of `session`
/// (all keys when `session` is `None`), `1` when there are none.
pub fn next_sequence<'a>(keys: impl Iterator<Item = &'a str>, session: Option<&str>) -> u64 {
    let suffix = session.map(|session| format!("/{session}"));
    keys.filter(|key| {
        suffix
            .as_deref()
            .map_or(true, |suffix| key.ends_with(suffix))
    })
    .filter_map(leading_integer)
    .max()
    .map_or(1, |max| max + 1)
}

/// Key of a stored resource structurally equal to `content`.
///
/// The smallest matching key wins so the answer does not depend on map order.
pub fn find_equal(resources: &HashMap<String, Resource>, content: &Value) -> Option<String> {
    resources
        .iter()
        .filter(|(_, stored)| stored.as_ref() == content)
        .map(|(key, _)| key)
        .min()
        .cloned()
}

fn leading_integer(key: &str) -> Option<u64> {
    let end = key
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(key.len());
    key[..end].parse().ok()
}
