use crate::error::Result;
use crate::geneinfo::{parse_gene_info, GENE_INFO_FILE};
use crate::merge::merge_into;
use crate::model::{TaxId, TaxonNode};
use crate::ncbi::{parse_names, parse_nodes, NAMES_FILE, NODES_FILE};
use crate::store::{Collection, DocumentStore};
use crate::uniprot::{parse_species, SPECLIST_FILE};
use crate::update::GENE_INFO_ARCHIVE;
use crate::utils::open_text;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Source {
    Nodes,
    Names,
    Species,
    #[value(name = "geneinfo")]
    GeneInfo,
}

impl Source {
    pub const ALL: [Source; 4] = [Source::Nodes, Source::Names, Source::Species, Source::GeneInfo];

    pub fn collection(&self) -> Option<Collection> {
        match self {
            Source::Nodes => Some(Collection::Nodes),
            Source::Names => Some(Collection::Names),
            Source::Species => Some(Collection::Species),
            Source::GeneInfo => None,
        }
    }

    /// Input file under `data_dir`. gene_info may be kept compressed.
    pub fn input_path(&self, data_dir: &Path) -> PathBuf {
        match self {
            Source::Nodes => data_dir.join(NODES_FILE),
            Source::Names => data_dir.join(NAMES_FILE),
            Source::Species => data_dir.join(SPECLIST_FILE),
            Source::GeneInfo => {
                let plain = data_dir.join(GENE_INFO_FILE);
                if plain.exists() {
                    plain
                } else {
                    data_dir.join(GENE_INFO_ARCHIVE)
                }
            }
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::Nodes => "nodes",
            Source::Names => "names",
            Source::Species => "species",
            Source::GeneInfo => "geneinfo",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// Distinct records (or gene taxids) stored.
    pub stored: u64,
    /// Input rows dropped for lacking an optional marker.
    pub skipped_rows: usize,
    /// Records merged into an earlier record with the same taxid.
    pub reconciled: usize,
    /// Gene-info rows whose taxid was already present.
    pub duplicates: usize,
}

/// Loads one source file from `data_dir` into its own collection.
pub fn upload_source<S: DocumentStore>(
    store: &mut S,
    source: Source,
    data_dir: &Path,
    batch_size: usize,
) -> Result<UploadReport> {
    let path = source.input_path(data_dir);
    tracing::info!("Load data from file '{}'", path.display());
    let reader = open_text(&path)?;

    let report = match source {
        Source::Nodes => upload_records(store, Collection::Nodes, parse_nodes(reader), batch_size)?,
        Source::Names => {
            let mut parser = parse_names(reader);
            let mut report = upload_records(store, Collection::Names, parser.by_ref(), batch_size)?;
            report.skipped_rows = parser.skipped_rows();
            if parser.out_of_order_groups() > 0 {
                tracing::warn!(
                    "names.dmp is not sorted by taxid ({} groups out of order)",
                    parser.out_of_order_groups()
                );
            }
            report
        }
        Source::Species => {
            upload_records(store, Collection::Species, parse_species(reader), batch_size)?
        }
        Source::GeneInfo => upload_gene_ids(store, parse_gene_info(reader), batch_size)?,
    };

    tracing::info!(
        "Uploaded {}: {} stored, {} reconciled, {} skipped rows, {} duplicates",
        source,
        report.stored,
        report.reconciled,
        report.skipped_rows,
        report.duplicates
    );
    Ok(report)
}

/// Replaces `collection` with `records`, written in batches.
///
/// A record whose taxid was already seen is merged into the earlier one
/// with the merge field policies, so split groups of an unsorted input end
/// up in one document.
pub fn upload_records<S, I>(
    store: &mut S,
    collection: Collection,
    records: I,
    batch_size: usize,
) -> Result<UploadReport>
where
    S: DocumentStore,
    I: IntoIterator<Item = Result<TaxonNode>>,
{
    store.clear(collection)?;
    let batch_size = batch_size.max(1);
    let mut report = UploadReport::default();
    let mut seen: HashSet<TaxId> = HashSet::new();
    let mut batch: Vec<TaxonNode> = Vec::with_capacity(batch_size);

    for record in records {
        let mut record = record?;
        if !seen.insert(record.taxid) {
            let earlier = match batch.iter().position(|n| n.taxid == record.taxid) {
                Some(pos) => Some(batch.swap_remove(pos)),
                None => store.get(collection, record.taxid)?,
            };
            if let Some(mut earlier) = earlier {
                merge_into(&mut earlier, record);
                record = earlier;
            }
            report.reconciled += 1;
        }
        batch.push(record);

        if batch.len() >= batch_size {
            store.upsert(collection, &batch)?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        store.upsert(collection, &batch)?;
    }

    report.stored = store.count(collection)?;
    Ok(report)
}

/// Replaces the gene taxid set. Repeated taxids are counted, not rejected.
pub fn upload_gene_ids<S, I>(store: &mut S, ids: I, batch_size: usize) -> Result<UploadReport>
where
    S: DocumentStore,
    I: IntoIterator<Item = Result<TaxId>>,
{
    store.clear_gene_ids()?;
    let batch_size = batch_size.max(1);
    let mut rows = 0;
    let mut inserted = 0;
    let mut batch = Vec::with_capacity(batch_size);

    for taxid in ids {
        batch.push(taxid?);
        rows += 1;
        if batch.len() >= batch_size {
            batch.dedup();
            inserted += store.insert_gene_ids(&batch)?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        batch.dedup();
        inserted += store.insert_gene_ids(&batch)?;
    }

    Ok(UploadReport {
        stored: inserted as u64,
        duplicates: rows - inserted,
        ..Default::default()
    })
}
