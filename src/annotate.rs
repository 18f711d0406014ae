use crate::geneinfo::GeneIdSet;
use crate::model::TaxonNode;

/// Sets `has_gene` on every node from membership in `genes`.
///
/// Both outcomes are written so a stale `true` from an earlier run is
/// cleared.
pub fn annotate_has_gene(nodes: &mut [TaxonNode], genes: &GeneIdSet) {
    for node in nodes {
        node.has_gene = genes.contains(node.taxid);
    }
}
