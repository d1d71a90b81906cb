//! Replica selection.
//!
//! Every sortable logical index has pre-sorted physical replicas named
//! `<logical>_<suffix>`. Indices whose rows have a single natural order
//! (denormalized join tables) have no replicas and are marked unsortable.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Sort orders the search service keeps replicas for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    /// Newest first.
    Date,
    DateAsc,
    PriceAsc,
    PriceDesc,
    RatingDesc,
    NameAsc,
}

impl SortKey {
    pub const ALL: [SortKey; 6] = [
        SortKey::Date,
        SortKey::DateAsc,
        SortKey::PriceAsc,
        SortKey::PriceDesc,
        SortKey::RatingDesc,
        SortKey::NameAsc,
    ];

    /// Replica name suffix for this sort order.
    pub fn suffix(self) -> &'static str {
        match self {
            SortKey::Date => "createdAt_desc",
            SortKey::DateAsc => "createdAt_asc",
            SortKey::PriceAsc => "price_asc",
            SortKey::PriceDesc => "price_desc",
            SortKey::RatingDesc => "rating_desc",
            SortKey::NameAsc => "name_asc",
        }
    }

    /// The key as accepted on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Date => "date",
            SortKey::DateAsc => "date_asc",
            SortKey::PriceAsc => "price_asc",
            SortKey::PriceDesc => "price_desc",
            SortKey::RatingDesc => "rating_desc",
            SortKey::NameAsc => "name_asc",
        }
    }

    /// Lenient parse: unknown keys mean "no sort".
    pub fn parse_lenient(s: &str) -> Option<SortKey> {
        s.parse().ok()
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown sort key: {}", s))
    }
}

/// Maps (logical index, sort key) to the physical index to query.
#[derive(Debug, Clone, Default)]
pub struct ReplicaTable {
    unsortable: HashSet<String>,
}

impl ReplicaTable {
    pub fn new<I, S>(unsortable: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unsortable: unsortable.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_sortable(&self, logical: &str) -> bool {
        !self.unsortable.contains(logical)
    }

    /// Resolve the physical index name.
    ///
    /// Unsortable indices always resolve to their base name so a replica that
    /// does not exist is never requested.
    pub fn resolve(&self, logical: &str, sort: Option<SortKey>) -> String {
        match sort {
            Some(key) if self.is_sortable(logical) => format!("{}_{}", logical, key.suffix()),
            _ => logical.to_string(),
        }
    }
}
