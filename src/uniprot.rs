use crate::error::{Result, TaxonomyError};
use crate::model::{TaxId, TaxonNode};
use std::io::{BufRead, Lines};

pub const SPECLIST_FILE: &str = "speclist.txt";

const SEPARATOR: &str = "_____";
const NAME_MARKER: &str = "N=";

/// Yields `{taxid, uniprot_name}` for every `N=` line after the header.
pub struct SpeciesParser<R> {
    lines: Lines<R>,
    line_no: usize,
    in_body: bool,
    done: bool,
}

/// Parses the UniProt controlled vocabulary of species (`speclist.txt`).
pub fn parse_species<R: BufRead>(reader: R) -> SpeciesParser<R> {
    SpeciesParser {
        lines: reader.lines(),
        line_no: 0,
        in_body: false,
        done: false,
    }
}

/// Parses a line such as `HUMAN E   9606: N=Homo sapiens`.
pub fn parse_species_line(line: &str, line_no: usize) -> Result<TaxonNode> {
    let name = line
        .rsplit(NAME_MARKER)
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    let token = line.split_whitespace().nth(2).ok_or_else(|| {
        TaxonomyError::parse(SPECLIST_FILE, line_no, "missing taxonomy id token")
    })?;
    let taxid = token
        .trim_end_matches(|c: char| !c.is_ascii_digit())
        .parse::<TaxId>()
        .map_err(|_| {
            TaxonomyError::parse(
                SPECLIST_FILE,
                line_no,
                format!("invalid taxonomy id token '{}'", token),
            )
        })?;

    let mut node = TaxonNode::new(taxid);
    node.uniprot_name = Some(name);
    Ok(node)
}

impl<R: BufRead> Iterator for SpeciesParser<R> {
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

            if !self.in_body {
                self.in_body = line.starts_with(SEPARATOR);
                continue;
            }
            // C= and S= continuation lines carry no taxid.
            if !line.contains(NAME_MARKER) {
                continue;
            }
            let row = parse_species_line(&line, self.line_no);
            self.done = row.is_err();
            return Some(row);
        }
        None
    }
}
