use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

pub type TaxId = u32;

/// Ranks in nodes.dmp order, from superkingdom (0) down to forma (27).
pub const RANKS: [&str; 28] = [
    "superkingdom",
    "kingdom",
    "subkingdom",
    "superphylum",
    "phylum",
    "subphylum",
    "superclass",
    "class",
    "subclass",
    "infraclass",
    "superorder",
    "order",
    "suborder",
    "infraorder",
    "parvorder",
    "superfamily",
    "family",
    "subfamily",
    "tribe",
    "subtribe",
    "genus",
    "subgenus",
    "species group",
    "species subgroup",
    "species",
    "subspecies",
    "varietas",
    "forma",
];

pub const NO_RANK: &str = "no rank";

/// A taxonomic rank. Ranks outside [`RANKS`] are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Rank {
    Ranked(u8),
    NoRank,
    Other(String),
}

impl Rank {
    /// Position in [`RANKS`]; `None` for "no rank" and unlisted ranks.
    pub fn index(&self) -> Option<u8> {
        match self {
            Rank::Ranked(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Rank::Ranked(i) => RANKS[*i as usize],
            Rank::NoRank => NO_RANK,
            Rank::Other(name) => name,
        }
    }
}

impl FromStr for Rank {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == NO_RANK {
            return Ok(Rank::NoRank);
        }
        Ok(match RANKS.iter().position(|&r| r == s) {
            Some(i) => Rank::Ranked(i as u8),
            None => Rank::Other(s.to_string()),
        })
    }
}

impl From<String> for Rank {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(rank) => rank,
            Err(never) => match never {},
        }
    }
}

impl From<Rank> for String {
    fn from(rank: Rank) -> Self {
        rank.as_str().to_string()
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A name field holding zero, one or many values.
///
/// Serialized as nothing, a string, or an array, so a taxon with a single
/// common name stores it as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NameValue {
    #[default]
    Absent,
    Single(String),
    Multiple(Vec<String>),
}

impl NameValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, NameValue::Absent)
    }

    /// Adds a value, promoting Absent -> Single -> Multiple.
    pub fn push(&mut self, value: String) {
        *self = match std::mem::take(self) {
            NameValue::Absent => NameValue::Single(value),
            NameValue::Single(first) => NameValue::Multiple(vec![first, value]),
            NameValue::Multiple(mut values) => {
                values.push(value);
                NameValue::Multiple(values)
            }
        };
    }

    pub fn extend(&mut self, other: NameValue) {
        for value in other.into_values() {
            self.push(value);
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            NameValue::Absent => Vec::new(),
            NameValue::Single(v) => vec![v.as_str()],
            NameValue::Multiple(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    pub fn into_values(self) -> Vec<String> {
        match self {
            NameValue::Absent => Vec::new(),
            NameValue::Single(v) => vec![v],
            NameValue::Multiple(vs) => vs,
        }
    }
}

impl Serialize for NameValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NameValue::Absent => serializer.serialize_none(),
            NameValue::Single(v) => serializer.serialize_str(v),
            NameValue::Multiple(vs) => vs.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for NameValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Option::<Repr>::deserialize(deserializer)? {
            None => NameValue::Absent,
            Some(Repr::One(v)) => NameValue::Single(v),
            Some(Repr::Many(vs)) => match vs.len() {
                0 => NameValue::Absent,
                _ => NameValue::Multiple(vs),
            },
        })
    }
}

/// One taxon document. Per-source records leave unknown fields empty;
/// merged records always carry `parent_taxid`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxonNode {
    pub taxid: TaxId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_taxid: Option<TaxId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<Rank>,
    #[serde(rename = "rank#", default, skip_serializing_if = "Option::is_none")]
    pub rank_index: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    #[serde(default, skip_serializing_if = "NameValue::is_absent")]
    pub common_name: NameValue,
    #[serde(default, skip_serializing_if = "NameValue::is_absent")]
    pub genbank_common_name: NameValue,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub other_names: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniprot_name: Option<String>,
    #[serde(default)]
    pub has_gene: bool,
    #[serde(default)]
    pub lineage: Vec<TaxId>,
    /// Remaining names.dmp classes (authority, type material, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Vec<String>>,
}

impl TaxonNode {
    pub fn new(taxid: TaxId) -> Self {
        TaxonNode {
            taxid,
            ..Default::default()
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_taxid == Some(self.taxid)
    }
}

/// Summary of the merged collection, recomputed on every build.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub unique_taxonomy_id_count: u64,
    pub distribution_by_rank: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub built_at: Option<DateTime<Utc>>,
}

impl Metadata {
    /// Rank counts, largest first.
    pub fn ranks_by_count(&self) -> Vec<(&str, u64)> {
        let mut ranks: Vec<_> = self
            .distribution_by_rank
            .iter()
            .map(|(rank, count)| (rank.as_str(), *count))
            .collect();
        ranks.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranks
    }
}
