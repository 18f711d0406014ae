use crate::error::{Result, TaxonomyError};
use crate::model::TaxId;
use std::collections::HashSet;
use std::io::{BufRead, Lines};

pub const GENE_INFO_FILE: &str = "gene_info";

/// Yields the first column of every non-header row.
pub struct GeneInfoParser<R> {
    lines: Lines<R>,
    line_no: usize,
    done: bool,
}

/// Reads the taxid column of NCBI `gene_info`, skipping `#` header lines.
pub fn parse_gene_info<R: BufRead>(reader: R) -> GeneInfoParser<R> {
    GeneInfoParser {
        lines: reader.lines(),
        line_no: 0,
        done: false,
    }
}

impl<R: BufRead> Iterator for GeneInfoParser<R> {
    type Item = Result<TaxId>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let line = match self.lines.next() {
                None => {
                    self.done = true;
                    break;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
                Some(Ok(line)) => line,
            };
            self.line_no += 1;
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            let field = line.split('\t').next().unwrap_or_default();
            let taxid = field.trim().parse::<TaxId>().map_err(|_| {
                TaxonomyError::parse(
                    GENE_INFO_FILE,
                    self.line_no,
                    format!("invalid taxid '{}'", field),
                )
            });
            self.done = taxid.is_err();
            return Some(taxid);
        }
        None
    }
}

/// The set of taxids that have at least one gene record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneIdSet {
    ids: HashSet<TaxId>,
}

impl GeneIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the taxid was already present.
    pub fn insert(&mut self, taxid: TaxId) -> bool {
        self.ids.insert(taxid)
    }

    pub fn contains(&self, taxid: TaxId) -> bool {
        self.ids.contains(&taxid)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<TaxId> for GeneIdSet {
    fn from_iter<I: IntoIterator<Item = TaxId>>(iter: I) -> Self {
        GeneIdSet {
            ids: iter.into_iter().collect(),
        }
    }
}
