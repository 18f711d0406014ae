use crate::annotate::annotate_has_gene;
use crate::config::{BuildConfig, MissingParentPolicy};
use crate::error::{LineageError, MergeIntegrityError, Result, TaxonomyError};
use crate::geneinfo::GeneIdSet;
use crate::lineage::{resolve_lineage, LineageArena, ParentTable};
use crate::merge::RecordMerger;
use crate::model::{Metadata, TaxId, TaxonNode};
use crate::store::{pages, Collection, DocumentStore};
use crate::upload::{upload_source, Source};
use chrono::Utc;
use rayon::prelude::*;
use std::path::Path;

#[derive(Debug, Default)]
pub struct MergeReport {
    pub merged: usize,
    pub dropped: Vec<MergeIntegrityError>,
}

#[derive(Debug, Default)]
pub struct BuildReport {
    /// Records written back with lineage and gene flag.
    pub processed: usize,
    /// Broken chains removed from the merged collection under the skip policy.
    pub skipped: Vec<LineageError>,
    pub metadata: Metadata,
}

/// Rebuilds the merged collection from names, nodes and species, in that
/// order.
pub fn merge_sources<S: DocumentStore>(store: &mut S, config: &BuildConfig) -> Result<MergeReport> {
    let mut merger = RecordMerger::new();
    for collection in Collection::SOURCES {
        tracing::info!("Merging collection '{}'", collection.name());
        for page in pages(&*store, collection, config.page_size) {
            merger.absorb_all(page?);
        }
    }

    let outcome = merger.finish();
    if !outcome.dropped.is_empty() {
        tracing::warn!(
            "{} records have no parent and were dropped",
            outcome.dropped.len()
        );
        for err in &outcome.dropped {
            tracing::debug!("{}", err);
        }
    }

    store.clear(Collection::Taxonomy)?;
    for chunk in outcome.nodes.chunks(config.batch_size.max(1)) {
        store.upsert(Collection::Taxonomy, chunk)?;
    }
    tracing::info!("Merged {} records", outcome.nodes.len());

    Ok(MergeReport {
        merged: outcome.nodes.len(),
        dropped: outcome.dropped,
    })
}

/// Read-only state shared by every worker during the post-merge pass.
pub struct BuildContext {
    pub parents: ParentTable,
    pub genes: GeneIdSet,
    pub arena: LineageArena,
}

impl BuildContext {
    pub fn load<S: DocumentStore + ?Sized>(store: &S) -> Result<Self> {
        let parents = store.parent_table(Collection::Taxonomy)?;
        let genes = store.gene_ids()?;
        let arena = LineageArena::build(&parents);
        tracing::info!(
            "Loaded {} parent links (root {}), {} gene taxids",
            parents.len(),
            parents.root(),
            genes.len()
        );
        if arena.broken_count() > 0 {
            tracing::warn!("{} taxids have a broken parent chain", arena.broken_count());
        }
        Ok(BuildContext {
            parents,
            genes,
            arena,
        })
    }

    /// The exact error for the smallest taxid whose chain is broken.
    pub fn first_broken_chain(&self) -> Option<LineageError> {
        self.arena.broken_taxids().into_iter().find_map(|taxid| {
            let parent = self.parents.parent(taxid)?;
            resolve_lineage(taxid, parent, &self.parents).err()
        })
    }

    fn lineage_of(&self, node: &TaxonNode) -> std::result::Result<Vec<TaxId>, LineageError> {
        match node.parent_taxid {
            Some(parent) => self.arena.lineage(node.taxid, parent, &self.parents),
            None => Err(LineageError::MissingParent {
                missing: node.taxid,
                chain: vec![node.taxid],
            }),
        }
    }
}

/// Sets `lineage` and `has_gene` on every merged record, then builds the
/// indexes and replaces the stored metadata.
///
/// Pages are processed one after another. Inside a page the lineages are
/// resolved on the worker pool and the page is written back by this thread.
/// Under [`MissingParentPolicy::Abort`] a broken chain anywhere fails the
/// build before the first write. Under [`MissingParentPolicy::Skip`] the
/// affected records are removed from the merged collection, so every stored
/// record has a lineage.
pub fn post_merge<S: DocumentStore>(store: &mut S, config: &BuildConfig) -> Result<BuildReport> {
    let context = BuildContext::load(&*store)?;
    if config.on_missing_parent == MissingParentPolicy::Abort {
        if let Some(err) = context.first_broken_chain() {
            return Err(err.into());
        }
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build()
        .map_err(|e| TaxonomyError::Config(format!("cannot start worker pool: {}", e)))?;

    let page_size = config.page_size.max(1);
    let mut report = BuildReport::default();
    let mut cursor: Option<TaxId> = None;

    loop {
        let mut page = store.read_page(Collection::Taxonomy, cursor, page_size)?;
        let Some(last) = page.last() else { break };
        cursor = Some(last.taxid);
        let is_last_page = page.len() < page_size;

        annotate_has_gene(&mut page, &context.genes);
        let lineages: Vec<_> =
            pool.install(|| page.par_iter().map(|node| context.lineage_of(node)).collect());

        let mut kept = Vec::with_capacity(page.len());
        let mut removed = Vec::new();
        for (mut node, lineage) in page.into_iter().zip(lineages) {
            match lineage {
                Ok(lineage) => {
                    node.lineage = lineage;
                    kept.push(node);
                }
                Err(err) => match config.on_missing_parent {
                    MissingParentPolicy::Abort => return Err(err.into()),
                    MissingParentPolicy::Skip => {
                        tracing::warn!("Skipping taxid {}: {}", node.taxid, err);
                        removed.push(node.taxid);
                        report.skipped.push(err);
                    }
                },
            }
        }

        store.upsert(Collection::Taxonomy, &kept)?;
        store.remove(Collection::Taxonomy, &removed)?;
        report.processed += kept.len();
        tracing::debug!("Wrote page up to taxid {:?} ({} records)", cursor, kept.len());

        if is_last_page {
            break;
        }
    }

    store.build_indexes(Collection::Taxonomy)?;
    let mut metadata = store.compute_metadata(Collection::Taxonomy)?;
    metadata.built_at = Some(Utc::now());
    store.save_metadata(&metadata)?;
    tracing::info!(
        "Processed {} records, {} skipped, {} distinct taxids",
        report.processed,
        report.skipped.len(),
        metadata.unique_taxonomy_id_count
    );
    report.metadata = metadata;
    Ok(report)
}

/// Uploads every source from `data_dir`, then merges and post-processes.
pub fn run_build<S: DocumentStore>(
    store: &mut S,
    data_dir: &Path,
    config: &BuildConfig,
) -> Result<BuildReport> {
    for source in Source::ALL {
        upload_source(store, source, data_dir, config.batch_size)?;
    }
    merge_sources(store, config)?;
    post_merge(store, config)
}
