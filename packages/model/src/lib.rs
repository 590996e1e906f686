//! Idea tree data model: identifiers, sibling ranks, the node and link
//! types, structural queries, and conversion from/to the nested keyed shape.

pub mod ast;
pub mod error;
pub mod id_generator;
pub mod parser;
pub mod rank;
pub mod serializer;
pub mod tree;
pub mod visitor;

pub use ast::{Attributes, Children, Idea, IdeaSummary, Link};
pub use error::{ParseError, ParseResult};
pub use id_generator::{IdAllocator, IdeaId};
pub use parser::{parse, ParsedContent, Parser, FORMAT_VERSION};
pub use rank::{Rank, RankGroup};
pub use serializer::{idea_to_value, serialize};
pub use visitor::{AttributeStripper, Traversal, Visitor, VisitorMut};
