use crate::error::Result;
use crate::geneinfo::GeneIdSet;
use crate::lineage::ParentTable;
use crate::model::{Metadata, TaxId, TaxonNode, NO_RANK};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Upper bound on taxids returned by a descendant query.
pub const MAX_TAXID_COUNT: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Nodes,
    Names,
    Species,
    /// The merged collection.
    Taxonomy,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Nodes,
        Collection::Names,
        Collection::Species,
        Collection::Taxonomy,
    ];

    /// Per-source collections in merge order.
    pub const SOURCES: [Collection; 3] =
        [Collection::Names, Collection::Nodes, Collection::Species];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Nodes => "nodes",
            Collection::Names => "names",
            Collection::Species => "species",
            Collection::Taxonomy => "taxonomy",
        }
    }
}

pub trait DocumentStore {
    /// Up to `limit` documents with taxid greater than `after`, in taxid order.
    fn read_page(
        &self,
        collection: Collection,
        after: Option<TaxId>,
        limit: usize,
    ) -> Result<Vec<TaxonNode>>;

    fn get(&self, collection: Collection, taxid: TaxId) -> Result<Option<TaxonNode>>;

    /// Inserts or replaces each document keyed by its taxid.
    fn upsert(&mut self, collection: Collection, docs: &[TaxonNode]) -> Result<()>;

    /// Deletes the documents with the given taxids, if present.
    fn remove(&mut self, collection: Collection, taxids: &[TaxId]) -> Result<()>;

    fn clear(&mut self, collection: Collection) -> Result<()>;

    fn count(&self, collection: Collection) -> Result<u64>;

    /// Returns how many of `ids` were new. Duplicates are ignored.
    fn insert_gene_ids(&mut self, ids: &[TaxId]) -> Result<usize>;

    fn clear_gene_ids(&mut self) -> Result<()>;

    fn gene_ids(&self) -> Result<GeneIdSet>;

    fn build_indexes(&mut self, collection: Collection) -> Result<()>;

    fn compute_metadata(&self, collection: Collection) -> Result<Metadata>;

    /// Replaces any stored metadata.
    fn save_metadata(&mut self, metadata: &Metadata) -> Result<()>;

    fn load_metadata(&self) -> Result<Option<Metadata>>;

    /// At most `limit` taxids of the merged collection whose lineage contains
    /// `taxid` (including `taxid` itself), smallest first.
    fn descendants(&self, taxid: TaxId, has_gene_only: bool, limit: usize) -> Result<Vec<TaxId>>;

    fn parent_table(&self, collection: Collection) -> Result<ParentTable> {
        let mut parents = HashMap::new();
        for page in pages(self, collection, 10_000) {
            for node in page? {
                if let Some(parent) = node.parent_taxid {
                    parents.insert(node.taxid, parent);
                }
            }
        }
        Ok(ParentTable::new(parents)?)
    }
}

/// Iterates a collection page by page through [`DocumentStore::read_page`].
pub struct Pages<'a, S: ?Sized> {
    store: &'a S,
    collection: Collection,
    cursor: Option<TaxId>,
    page_size: usize,
    done: bool,
}

pub fn pages<S: DocumentStore + ?Sized>(
    store: &S,
    collection: Collection,
    page_size: usize,
) -> Pages<'_, S> {
    Pages {
        store,
        collection,
        cursor: None,
        page_size: page_size.max(1),
        done: false,
    }
}

impl<S: DocumentStore + ?Sized> Iterator for Pages<'_, S> {
    type Item = Result<Vec<TaxonNode>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self
            .store
            .read_page(self.collection, self.cursor, self.page_size)
        {
            Ok(page) => match page.last() {
                Some(last) => {
                    self.cursor = Some(last.taxid);
                    self.done = page.len() < self.page_size;
                    Some(Ok(page))
                }
                None => {
                    self.done = true;
                    None
                }
            },
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Descendants of `taxid`, with `taxid` itself kept or removed, capped at
/// [`MAX_TAXID_COUNT`].
pub fn children<S: DocumentStore + ?Sized>(
    store: &S,
    taxid: TaxId,
    has_gene_only: bool,
    include_self: bool,
) -> Result<Vec<TaxId>> {
    // one spare row so removing `taxid` still leaves a full result
    let mut taxids = store.descendants(taxid, has_gene_only, MAX_TAXID_COUNT + 1)?;
    match taxids.binary_search(&taxid) {
        Ok(pos) if !include_self => {
            taxids.remove(pos);
        }
        Err(pos) if include_self => taxids.insert(pos, taxid),
        _ => {}
    }
    taxids.truncate(MAX_TAXID_COUNT);
    Ok(taxids)
}

/// Store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: HashMap<Collection, BTreeMap<TaxId, TaxonNode>>,
    genes: BTreeSet<TaxId>,
    metadata: Option<Metadata>,
    indexed: HashSet<Collection>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_indexed(&self, collection: Collection) -> bool {
        self.indexed.contains(&collection)
    }

    fn docs(&self, collection: Collection) -> impl Iterator<Item = &TaxonNode> {
        self.collections
            .get(&collection)
            .into_iter()
            .flat_map(|docs| docs.values())
    }
}

impl DocumentStore for MemoryStore {
    fn read_page(
        &self,
        collection: Collection,
        after: Option<TaxId>,
        limit: usize,
    ) -> Result<Vec<TaxonNode>> {
        let Some(docs) = self.collections.get(&collection) else {
            return Ok(Vec::new());
        };
        let page = match after {
            Some(after) => docs
                .range(after.saturating_add(1)..)
                .filter(|(taxid, _)| **taxid > after)
                .take(limit)
                .map(|(_, doc)| doc.clone())
                .collect(),
            None => docs.values().take(limit).cloned().collect(),
        };
        Ok(page)
    }

    fn get(&self, collection: Collection, taxid: TaxId) -> Result<Option<TaxonNode>> {
        Ok(self
            .collections
            .get(&collection)
            .and_then(|docs| docs.get(&taxid))
            .cloned())
    }

    fn upsert(&mut self, collection: Collection, docs: &[TaxonNode]) -> Result<()> {
        let target = self.collections.entry(collection).or_default();
        for doc in docs {
            target.insert(doc.taxid, doc.clone());
        }
        Ok(())
    }

    fn remove(&mut self, collection: Collection, taxids: &[TaxId]) -> Result<()> {
        if let Some(docs) = self.collections.get_mut(&collection) {
            for taxid in taxids {
                docs.remove(taxid);
            }
        }
        Ok(())
    }

    fn clear(&mut self, collection: Collection) -> Result<()> {
        self.collections.remove(&collection);
        self.indexed.remove(&collection);
        Ok(())
    }

    fn count(&self, collection: Collection) -> Result<u64> {
        Ok(self.collections.get(&collection).map_or(0, |d| d.len()) as u64)
    }

    fn insert_gene_ids(&mut self, ids: &[TaxId]) -> Result<usize> {
        Ok(ids.iter().filter(|id| self.genes.insert(**id)).count())
    }

    fn clear_gene_ids(&mut self) -> Result<()> {
        self.genes.clear();
        Ok(())
    }

    fn gene_ids(&self) -> Result<GeneIdSet> {
        Ok(self.genes.iter().copied().collect())
    }

    fn build_indexes(&mut self, collection: Collection) -> Result<()> {
        self.indexed.insert(collection);
        Ok(())
    }

    fn compute_metadata(&self, collection: Collection) -> Result<Metadata> {
        let mut metadata = Metadata::default();
        let mut distinct = HashSet::new();
        for doc in self.docs(collection) {
            distinct.insert(doc.taxid);
            let rank = doc.rank.as_ref().map_or(NO_RANK, |r| r.as_str());
            *metadata
                .distribution_by_rank
                .entry(rank.to_string())
                .or_default() += 1;
        }
        metadata.unique_taxonomy_id_count = distinct.len() as u64;
        Ok(metadata)
    }

    fn save_metadata(&mut self, metadata: &Metadata) -> Result<()> {
        self.metadata = Some(metadata.clone());
        Ok(())
    }

    fn load_metadata(&self) -> Result<Option<Metadata>> {
        Ok(self.metadata.clone())
    }

    fn descendants(
        &self,
        taxid: TaxId,
        has_gene_only: bool,
        limit: usize,
    ) -> Result<Vec<TaxId>> {
        Ok(self
            .docs(Collection::Taxonomy)
            .filter(|doc| doc.lineage.contains(&taxid))
            .filter(|doc| !has_gene_only || doc.has_gene)
            .map(|doc| doc.taxid)
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node(taxid: TaxId, parent: TaxId, lineage: &[TaxId], has_gene: bool) -> TaxonNode {
        let mut node = TaxonNode::new(taxid);
        node.parent_taxid = Some(parent);
        node.rank = Some("genus".parse().unwrap());
        node.lineage = lineage.to_vec();
        node.has_gene = has_gene;
        node
    }

    #[test]
    fn test_pages_cover_collection_in_order() {
        let mut store = MemoryStore::new();
        let docs: Vec<TaxonNode> = (1..=7).rev().map(|id| node(id, 1, &[], false)).collect();
        store.upsert(Collection::Nodes, &docs).unwrap();

        let sizes: Vec<usize> = pages(&store, Collection::Nodes, 3)
            .map(|p| p.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![3, 3, 1]);

        let ids: Vec<TaxId> = pages(&store, Collection::Nodes, 3)
            .flat_map(|p| p.unwrap())
            .map(|n| n.taxid)
            .collect();
        assert_eq!(ids, (1..=7).collect::<Vec<_>>());
        assert_eq!(pages(&store, Collection::Species, 3).count(), 0);
    }

    #[test]
    fn test_upsert_replaces_by_taxid() {
        let mut store = MemoryStore::new();
        store
            .upsert(Collection::Taxonomy, &[node(5, 1, &[], false)])
            .unwrap();
        store
            .upsert(Collection::Taxonomy, &[node(5, 2, &[], true)])
            .unwrap();
        assert_eq!(store.count(Collection::Taxonomy).unwrap(), 1);
        let stored = store.get(Collection::Taxonomy, 5).unwrap().unwrap();
        assert_eq!(stored.parent_taxid, Some(2));
        assert!(stored.has_gene);
    }

    #[test]
    fn test_gene_ids_ignore_duplicates() {
        let mut store = MemoryStore::new();
        assert_eq!(store.insert_gene_ids(&[9606, 9606, 10090]).unwrap(), 2);
        assert_eq!(store.insert_gene_ids(&[10090]).unwrap(), 0);
        assert_eq!(store.gene_ids().unwrap().len(), 2);
    }

    #[test]
    fn test_children_include_self_and_gene_filter() {
        let mut store = MemoryStore::new();
        store
            .upsert(
                Collection::Taxonomy,
                &[
                    node(1, 1, &[1], false),
                    node(2, 1, &[2, 1], false),
                    node(3, 2, &[3, 2, 1], true),
                    node(4, 1, &[4, 1], true),
                ],
            )
            .unwrap();

        assert_eq!(children(&store, 2, false, false).unwrap(), vec![3]);
        assert_eq!(children(&store, 2, false, true).unwrap(), vec![2, 3]);
        assert_eq!(children(&store, 1, true, false).unwrap(), vec![3, 4]);
        assert_eq!(children(&store, 1, true, true).unwrap(), vec![1, 3, 4]);
    }

    #[test]
    fn test_descendants_limit_and_remove() {
        let mut store = MemoryStore::new();
        let mut docs = vec![node(1, 1, &[1], false)];
        docs.extend((2..=6).map(|id| node(id, 1, &[id, 1], false)));
        store.upsert(Collection::Taxonomy, &docs).unwrap();

        assert_eq!(store.descendants(1, false, 3).unwrap(), vec![1, 2, 3]);
        store.remove(Collection::Taxonomy, &[2, 99]).unwrap();
        assert_eq!(store.descendants(1, false, 3).unwrap(), vec![1, 3, 4]);
        assert_eq!(store.count(Collection::Taxonomy).unwrap(), 5);
    }

    #[test]
    fn test_default_parent_table() {
        let mut store = MemoryStore::new();
        store
            .upsert(
                Collection::Taxonomy,
                &[node(1, 1, &[], false), node(2, 1, &[], false)],
            )
            .unwrap();
        let parents = store.parent_table(Collection::Taxonomy).unwrap();
        assert_eq!(parents.root(), 1);
        assert_eq!(parents.parent(2), Some(1));
    }
}
