use crate::model::TaxId;
use thiserror::Error;

/// Errors raised while loading, merging or building the taxonomy.
#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {input} at line {line}: {message}")]
    Parse {
        input: &'static str,
        line: usize,
        message: String,
    },

    #[error(transparent)]
    Lineage(#[from] LineageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl TaxonomyError {
    pub fn parse(input: &'static str, line: usize, message: impl Into<String>) -> Self {
        TaxonomyError::Parse {
            input,
            line,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TaxonomyError {
    fn from(err: reqwest::Error) -> Self {
        TaxonomyError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for TaxonomyError {
    fn from(err: toml::de::Error) -> Self {
        TaxonomyError::Config(err.to_string())
    }
}

/// Failures of a parent-chain walk. Each carries the chain walked so far.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineageError {
    #[error("taxid {missing} has no entry in the parent table (chain: {chain:?})")]
    MissingParent { missing: TaxId, chain: Vec<TaxId> },

    #[error("parent chain of taxid {taxid} does not reach the root (chain: {chain:?})")]
    Cycle { taxid: TaxId, chain: Vec<TaxId> },

    #[error("parent table has no root (no taxid is its own parent)")]
    NoRoot,

    #[error("parent table has more than one root: {0:?}")]
    MultipleRoots(Vec<TaxId>),
}

impl LineageError {
    /// The taxid a report about this error should point at.
    pub fn offending_taxid(&self) -> Option<TaxId> {
        match self {
            LineageError::MissingParent { missing, .. } => Some(*missing),
            LineageError::Cycle { taxid, .. } => Some(*taxid),
            LineageError::NoRoot | LineageError::MultipleRoots(_) => None,
        }
    }
}

/// A merged record with no nodes.dmp entry. It cannot be placed in the tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("taxid {taxid} has no parent_taxid after merge")]
pub struct MergeIntegrityError {
    pub taxid: TaxId,
}

pub type Result<T> = std::result::Result<T, TaxonomyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let parse = TaxonomyError::parse("nodes.dmp", 3, "invalid taxid 'x'");
        assert_eq!(
            parse.to_string(),
            "Parse error in nodes.dmp at line 3: invalid taxid 'x'"
        );

        let missing = LineageError::MissingParent {
            missing: 5,
            chain: vec![7, 5],
        };
        assert_eq!(
            missing.to_string(),
            "taxid 5 has no entry in the parent table (chain: [7, 5])"
        );
        assert_eq!(missing.offending_taxid(), Some(5));

        let wrapped: TaxonomyError = missing.into();
        assert!(wrapped.to_string().starts_with("taxid 5"));

        assert_eq!(
            MergeIntegrityError { taxid: 9 }.to_string(),
            "taxid 9 has no parent_taxid after merge"
        );
    }
}
