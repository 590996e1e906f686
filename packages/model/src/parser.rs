use crate::ast::{Attributes, Children, Idea, Link};
use crate::error::{ParseError, ParseResult};
use crate::id_generator::{IdAllocator, IdeaId};
use crate::rank::Rank;
use serde::de::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// Current attribute scheme version stamped on every parsed document
pub const FORMAT_VERSION: u32 = 2;

/// Normalized document content
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedContent {
    pub root: Idea,
    pub links: Vec<Link>,
    pub resources: BTreeMap<String, Value>,
    pub format_version: u32,
}

/// How identifiers found in the raw input are treated
#[derive(Debug, Clone)]
enum IdPolicy {
    /// Keep existing ids, allocate for missing ones
    Complete(IdAllocator),
    /// Every node must carry an id
    Require,
    /// Ignore raw ids and allocate every one
    Reassign(IdAllocator),
}

/// Builds normalized ideas from the raw nested keyed shape
pub struct Parser {
    policy: IdPolicy,
    seen: HashSet<IdeaId>,
}

impl Parser {
    fn new(policy: IdPolicy) -> Self {
        Self {
            policy,
            seen: HashSet::new(),
        }
    }

    /// Parse a full document: ids are completed past the largest base in the
    /// input and new ones are tagged with `session`
    pub fn parse_document(raw: &Value, session: Option<&str>) -> ParseResult<ParsedContent> {
        let raw_root = raw.as_object().ok_or_else(|| ParseError::not_an_object(""))?;
        let version = format_version(raw_root);

        let mut upgraded = Value::Object(raw_root.clone());
        if version < FORMAT_VERSION {
            upgrade_legacy_styles(&mut upgraded);
        }

        let max_base = max_raw_base(&upgraded, "")?;
        let mut parser = Self::new(IdPolicy::Complete(IdAllocator::after(max_base, session)));
        let root = parser.parse_idea(&upgraded, "")?;

        Ok(ParsedContent {
            root,
            links: parse_links(raw_root.get("links"))?,
            resources: parse_resources(raw_root.get("resources"))?,
            format_version: FORMAT_VERSION,
        })
    }

    /// Parse a subtree whose ids must all be present
    pub fn parse_strict(raw: &Value) -> ParseResult<Idea> {
        Self::new(IdPolicy::Require).parse_idea(raw, "")
    }

    /// Parse a subtree, replacing every id with one from `allocator` in pre-order
    pub fn parse_with_fresh_ids(raw: &Value, allocator: IdAllocator) -> ParseResult<Idea> {
        Self::new(IdPolicy::Reassign(allocator)).parse_idea(raw, "")
    }

    fn parse_idea(&mut self, raw: &Value, path: &str) -> ParseResult<Idea> {
        let object = raw
            .as_object()
            .ok_or_else(|| ParseError::not_an_object(path))?;

        let id = self.resolve_id(object.get("id"), path)?;
        if !self.seen.insert(id.clone()) {
            return Err(ParseError::DuplicateId { id: id.to_string() });
        }

        let attr = match object.get("attr") {
            None | Some(Value::Null) => Attributes::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(ParseError::not_an_object(join(path, "attr"))),
        };

        let ideas = match object.get("ideas") {
            None | Some(Value::Null) => Children::new(),
            Some(Value::Object(children)) => self.parse_children(children, path)?,
            Some(_) => return Err(ParseError::not_an_object(join(path, "ideas"))),
        };

        Ok(Idea {
            id,
            title: coerce_title(object.get("title")),
            attr,
            ideas,
            meta: object.get("meta").cloned(),
        })
    }

    fn parse_children(&mut self, raw: &Map<String, Value>, path: &str) -> ParseResult<Children> {
        let ideas_path = join(path, "ideas");

        // Pre-order over display order so allocated ids follow what the user sees
        let mut keyed = Vec::with_capacity(raw.len());
        for (key, child) in raw {
            let rank =
                Rank::parse_key(key).ok_or_else(|| ParseError::invalid_rank(&ideas_path, key))?;
            keyed.push((rank, key, child));
        }
        keyed.sort_by(|a, b| a.0.display_cmp(&b.0));

        let mut children = Children::new();
        for (rank, key, child) in keyed {
            if children.contains_key(&rank) {
                return Err(ParseError::duplicate_rank(&ideas_path, key));
            }
            let idea = self.parse_idea(child, &join(&ideas_path, key))?;
            children.insert(rank, idea);
        }
        Ok(children)
    }

    fn resolve_id(&mut self, raw: Option<&Value>, path: &str) -> ParseResult<IdeaId> {
        let present = raw.filter(|value| !value.is_null());
        match (&mut self.policy, present) {
            (IdPolicy::Reassign(allocator), _) | (IdPolicy::Complete(allocator), None) => {
                allocator
                    .next_id()
                    .ok_or_else(|| ParseError::ids_exhausted(path))
            }
            (IdPolicy::Require, None) => Err(ParseError::missing_id(path)),
            (_, Some(value)) => {
                IdeaId::from_value(value).ok_or_else(|| ParseError::invalid_id(path, value.to_string()))
            }
        }
    }
}

/// Parse a raw document, completing ids for `session`
pub fn parse(raw: &Value, session: Option<&str>) -> ParseResult<ParsedContent> {
    Parser::parse_document(raw, session)
}

impl TryFrom<Value> for Idea {
    type Error = ParseError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Parser::parse_strict(&value)
    }
}

impl<'de> Deserialize<'de> for Idea {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Parser::parse_strict(&value).map_err(serde::de::Error::custom)
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

fn coerce_title(raw: Option<&Value>) -> String {
    match raw {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(title)) => title.clone(),
        Some(other) => other.to_string(),
    }
}

fn format_version(raw: &Map<String, Value>) -> u32 {
    raw.get("formatVersion")
        .and_then(Value::as_f64)
        .map_or(1, |version| version as u32)
}

/// Largest id base anywhere in the raw input, `0` when none is present
fn max_raw_base(raw: &Value, path: &str) -> ParseResult<i64> {
    let Some(object) = raw.as_object() else {
        return Err(ParseError::not_an_object(path));
    };
    let mut max = match object.get("id") {
        None | Some(Value::Null) => 0,
        Some(value) => IdeaId::from_value(value)
            .map(|id| id.base())
            .ok_or_else(|| ParseError::invalid_id(path, value.to_string()))?,
    };
    if let Some(Value::Object(children)) = object.get("ideas") {
        let ideas_path = join(path, "ideas");
        for (key, child) in children {
            max = max.max(max_raw_base(child, &join(&ideas_path, key))?);
        }
    }
    Ok(max)
}

/// Move pre-version-2 `style` objects into `attr`.
///
/// `style.collapsed` becomes `attr.collapsed`; the rest of `style` becomes `attr.style`.
fn upgrade_legacy_styles(raw: &mut Value) {
    let Some(object) = raw.as_object_mut() else {
        return;
    };
    if let Some(Value::Object(mut style)) = object.remove("style") {
        let attr = object
            .entry("attr")
            .or_insert_with(|| Value::Object(Map::new()));
        if !attr.is_object() {
            *attr = Value::Object(Map::new());
        }
        if let Value::Object(attr) = attr {
            if let Some(collapsed) = style.remove("collapsed") {
                attr.insert("collapsed".to_string(), collapsed);
            }
            if !style.is_empty() {
                attr.insert("style".to_string(), Value::Object(style));
            }
        }
    }
    if let Some(Value::Object(children)) = object.get_mut("ideas") {
        for child in children.values_mut() {
            upgrade_legacy_styles(child);
        }
    }
}

fn parse_links(raw: Option<&Value>) -> ParseResult<Vec<Link>> {
    let Some(Value::Array(items)) = raw else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let object = item
                .as_object()
                .ok_or_else(|| ParseError::invalid_link(index, "expected an object"))?;
            let endpoint = |name: &str| {
                object
                    .get(name)
                    .and_then(IdeaId::from_value)
                    .ok_or_else(|| ParseError::invalid_link(index, format!("bad {name}")))
            };
            let attr = match object.get("attr") {
                Some(Value::Object(attr)) => attr.clone(),
                _ => Attributes::new(),
            };
            Ok(Link {
                idea_id_from: endpoint("ideaIdFrom")?,
                idea_id_to: endpoint("ideaIdTo")?,
                attr,
            })
        })
        .collect()
}

fn parse_resources(raw: Option<&Value>) -> ParseResult<BTreeMap<String, Value>> {
    match raw {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(resources)) => Ok(resources
            .iter()
            .map(|(key, content)| (key.clone(), content.clone()))
            .collect()),
        Some(_) => Err(ParseError::not_an_object("resources")),
    }
}
