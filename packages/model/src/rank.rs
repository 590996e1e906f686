//! # Sibling Ranks
//!
//! Children of an idea are keyed by a floating-point rank. The sign splits
//! siblings into two independently ordered groups:
//!
//! ```text
//!   display order:  +1  +2.5  +10   |   -1  -3  -40
//!                   positive group  |   negative group
//!                   (ascending)     |   (ascending magnitude)
//! ```
//!
//! Ranks are private ordering keys. New positions are found by extending a
//! group past its largest magnitude or by halving the gap between two
//! neighbours; when the gap can no longer be halved the group is re-spread.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Magnitude added when extending a group past its current boundary
pub const RANK_STEP: f64 = 1.0;

/// Which side of the parent a child sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankGroup {
    Positive,
    Negative,
}

impl RankGroup {
    pub fn sign(self) -> f64 {
        match self {
            RankGroup::Positive => 1.0,
            RankGroup::Negative => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            RankGroup::Positive => RankGroup::Negative,
            RankGroup::Negative => RankGroup::Positive,
        }
    }
}

/// A finite float position key within a parent's children
#[derive(Debug, Clone, Copy)]
pub struct Rank(f64);

impl Rank {
    /// Returns `None` for NaN and infinities. `-0.0` is normalized to `0.0`.
    pub fn new(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Some(Self(if value == 0.0 { 0.0 } else { value }))
    }

    /// Parse a raw child key such as `"2.0"`, `"-15"` or `"0.0625"`
    pub fn parse_key(key: &str) -> Option<Self> {
        key.trim().parse::<f64>().ok().and_then(Self::new)
    }

    fn signed(group: RankGroup, magnitude: f64) -> Self {
        let value = group.sign() * magnitude;
        Self::new(value).unwrap_or(Self(group.sign() * f64::MAX))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn magnitude(self) -> f64 {
        self.0.abs()
    }

    pub fn group(self) -> RankGroup {
        if self.0 < 0.0 {
            RankGroup::Negative
        } else {
            RankGroup::Positive
        }
    }

    /// Ordering used for display and traversal
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        match (self.group(), other.group()) {
            (RankGroup::Positive, RankGroup::Negative) => Ordering::Less,
            (RankGroup::Negative, RankGroup::Positive) => Ordering::Greater,
            _ => self.magnitude().total_cmp(&other.magnitude()),
        }
    }
}

impl From<i32> for Rank {
    fn from(value: i32) -> Self {
        Self(f64::from(value))
    }
}

impl PartialEq for Rank {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Rank {}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Rank {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Rank {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

impl<'de> Deserialize<'de> for Rank {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Self::new(value).ok_or_else(|| serde::de::Error::custom("rank must be finite"))
    }
}

/// All child ranks in display order
pub fn display_order<V>(children: &BTreeMap<Rank, V>) -> Vec<Rank> {
    let mut ranks: Vec<Rank> = children.keys().copied().collect();
    ranks.sort_by(Rank::display_cmp);
    ranks
}

/// Ranks of one group, ascending by magnitude
pub fn group_ranks<V>(children: &BTreeMap<Rank, V>, group: RankGroup) -> Vec<Rank> {
    let mut ranks: Vec<Rank> = children
        .keys()
        .copied()
        .filter(|rank| rank.group() == group)
        .collect();
    ranks.sort_by(Rank::display_cmp);
    ranks
}

/// Largest magnitude in a group, `0` when the group is empty
pub fn max_magnitude<V>(children: &BTreeMap<Rank, V>, group: RankGroup) -> f64 {
    children
        .keys()
        .filter(|rank| rank.group() == group)
        .map(|rank| rank.magnitude())
        .fold(0.0, f64::max)
}

/// A rank past the current end of `group`.
///
/// `None` once the largest magnitude is so big that adding [`RANK_STEP`]
/// no longer yields a strictly greater float; the group has to be re-spread.
pub fn append_rank<V>(children: &BTreeMap<Rank, V>, group: RankGroup) -> Option<Rank> {
    let max = max_magnitude(children, group);
    let next = max + RANK_STEP;
    (next > max && next.is_finite()).then(|| Rank::signed(group, next))
}

/// Group for a new child of the document root: the smaller side, positive on a tie
pub fn balanced_group<V>(children: &BTreeMap<Rank, V>) -> RankGroup {
    let negative = children
        .keys()
        .filter(|rank| rank.group() == RankGroup::Negative)
        .count();
    let positive = children.len() - negative;
    if negative < positive {
        RankGroup::Negative
    } else {
        RankGroup::Positive
    }
}

/// A rank strictly between `lower` (or zero) and `upper`, in `upper`'s group.
///
/// `None` when floating-point precision leaves no room between the two.
pub fn between(lower: Option<Rank>, upper: Rank) -> Option<Rank> {
    let low = lower.map_or(0.0, Rank::magnitude);
    let high = upper.magnitude();
    let middle = low + (high - low) / 2.0;
    if low < middle && middle < high {
        Some(Rank::signed(upper.group(), middle))
    } else {
        None
    }
}

/// `desired` if it is free, otherwise the closest free rank after it in the same group.
///
/// `None` when the group has no free rank left after `desired`.
pub fn free_rank_near<V>(children: &BTreeMap<Rank, V>, desired: Rank) -> Option<Rank> {
    if !children.contains_key(&desired) {
        return Some(desired);
    }
    let group = desired.group();
    let next = group_ranks(children, group)
        .into_iter()
        .find(|rank| rank.magnitude() > desired.magnitude());
    next.and_then(|next| between(Some(desired), next))
        .filter(|rank| !children.contains_key(rank))
        .or_else(|| append_rank(children, group))
}

/// The rank at 1-based `position` of an evenly spaced group
pub fn nth_rank(group: RankGroup, position: usize) -> Rank {
    Rank::signed(group, position as f64 * RANK_STEP)
}

/// Evenly spaced ranks `±1, ±2, …` for `count` members of `group`
pub fn spread(group: RankGroup, count: usize) -> Vec<Rank> {
    (1..=count).map(|position| nth_rank(group, position)).collect()
}
