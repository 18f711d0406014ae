use crate::error::{Result, TaxonomyError};
use crate::model::{TaxId, TaxonNode};
use std::io::{BufRead, Lines};

pub const NODES_FILE: &str = "nodes.dmp";
pub const NAMES_FILE: &str = "names.dmp";

/// Name classes folded into `other_names`.
pub const SYNONYM_CLASSES: [&str; 12] = [
    "acronym",
    "anamorph",
    "blast name",
    "equivalent name",
    "genbank acronym",
    "genbank anamorph",
    "genbank synonym",
    "includes",
    "misnomer",
    "misspelling",
    "synonym",
    "teleomorph",
];

/// Splits a `field\t|\tfield\t|` row into its fields.
pub fn split_dmp_line(line: &str) -> Vec<&str> {
    let line = line.trim_end_matches(&['\n', '\r'][..]);
    let line = line.strip_suffix("\t|").unwrap_or(line);
    line.split("\t|\t").collect()
}

fn parse_taxid(field: &str, input: &'static str, line: usize, what: &str) -> Result<TaxId> {
    field
        .trim()
        .parse::<TaxId>()
        .map_err(|_| TaxonomyError::parse(input, line, format!("invalid {} '{}'", what, field)))
}

/// Yields `{taxid, parent_taxid, rank}` per nodes.dmp row.
///
/// Any malformed row ends the stream with an error.
pub struct NodesParser<R> {
    lines: Lines<R>,
    line_no: usize,
    done: bool,
}

pub fn parse_nodes<R: BufRead>(reader: R) -> NodesParser<R> {
    NodesParser {
        lines: reader.lines(),
        line_no: 0,
        done: false,
    }
}

impl<R: BufRead> NodesParser<R> {
    fn parse_row(&self, line: &str) -> Result<TaxonNode> {
        let parts = split_dmp_line(line);
        if parts.len() < 3 {
            return Err(TaxonomyError::parse(
                NODES_FILE,
                self.line_no,
                format!("expected at least 3 fields, found {}", parts.len()),
            ));
        }
        let mut node = TaxonNode::new(parse_taxid(parts[0], NODES_FILE, self.line_no, "taxid")?);
        node.parent_taxid = Some(parse_taxid(
            parts[1],
            NODES_FILE,
            self.line_no,
            "parent taxid",
        )?);
        node.rank = parts[2].parse().ok();
        Ok(node)
    }
}

impl<R: BufRead> Iterator for NodesParser<R> {
    type Item = Result<TaxonNode>;

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
            if line.trim().is_empty() {
                continue;
            }
            let row = self.parse_row(&line);
            self.done = row.is_err();
            return Some(row);
        }
        None
    }
}

/// Groups names.dmp rows by their leading taxid, one record per group.
///
/// Groups are formed from consecutive rows only. The parser counts groups
/// whose taxid does not increase; callers reconcile those against earlier
/// records for the same taxid.
pub struct NamesParser<R> {
    lines: Lines<R>,
    line_no: usize,
    pending: Option<TaxonNode>,
    last_taxid: Option<TaxId>,
    skipped_rows: usize,
    out_of_order: usize,
    done: bool,
}

pub fn parse_names<R: BufRead>(reader: R) -> NamesParser<R> {
    NamesParser {
        lines: reader.lines(),
        line_no: 0,
        pending: None,
        last_taxid: None,
        skipped_rows: 0,
        out_of_order: 0,
        done: false,
    }
}

impl<R> NamesParser<R> {
    /// Rows dropped for lacking a name class.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    /// Groups that started with a taxid not greater than the previous one.
    pub fn out_of_order_groups(&self) -> usize {
        self.out_of_order
    }

    fn start_group(&mut self, taxid: TaxId) -> Option<TaxonNode> {
        if let Some(last) = self.last_taxid {
            if taxid <= last {
                self.out_of_order += 1;
                tracing::debug!("names.dmp taxid {} follows {}", taxid, last);
            }
        }
        self.last_taxid = Some(taxid);
        self.pending.replace(TaxonNode::new(taxid))
    }
}

/// Files one names.dmp value into the field its class maps to.
pub fn add_name(node: &mut TaxonNode, class: &str, name: String) {
    match class {
        "scientific name" => node.scientific_name = Some(name),
        "common name" => node.common_name.push(name),
        "genbank common name" => node.genbank_common_name.push(name),
        c if SYNONYM_CLASSES.contains(&c) => {
            node.other_names.insert(name);
        }
        c => node.extra.entry(c.to_string()).or_default().push(name),
    }
}

impl<R: BufRead> Iterator for NamesParser<R> {
    type Item = Result<TaxonNode>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let line = match self.lines.next() {
                None => {
                    self.done = true;
                    return self.pending.take().map(Ok);
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
                Some(Ok(line)) => line,
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }

            let parts = split_dmp_line(&line);
            let taxid = match parse_taxid(parts[0], NAMES_FILE, self.line_no, "taxid") {
                Ok(taxid) => taxid,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            if parts.len() < 4 {
                self.skipped_rows += 1;
                tracing::debug!("names.dmp line {} has no name class", self.line_no);
                continue;
            }

            let same_group = self.pending.as_ref().is_some_and(|n| n.taxid == taxid);
            let finished = if same_group {
                None
            } else {
                self.start_group(taxid)
            };
            if let Some(node) = self.pending.as_mut() {
                add_name(node, parts[3].trim(), parts[1].trim().to_lowercase());
            }
            if let Some(finished) = finished {
                return Some(Ok(finished));
            }
        }
        None
    }
}
