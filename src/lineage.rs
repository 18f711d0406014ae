use crate::error::LineageError;
use crate::model::TaxId;
use std::collections::{HashMap, HashSet};

/// Immutable `taxid -> parent_taxid` snapshot with exactly one root.
#[derive(Debug, Clone)]
pub struct ParentTable {
    parents: HashMap<TaxId, TaxId>,
    root: TaxId,
}

impl ParentTable {
    pub fn new(parents: HashMap<TaxId, TaxId>) -> Result<Self, LineageError> {
        let mut roots: Vec<TaxId> = parents
            .iter()
            .filter(|(child, parent)| child == parent)
            .map(|(child, _)| *child)
            .collect();
        roots.sort_unstable();
        match roots.as_slice() {
            [] => Err(LineageError::NoRoot),
            [root] => Ok(ParentTable {
                root: *root,
                parents,
            }),
            _ => Err(LineageError::MultipleRoots(roots)),
        }
    }

    pub fn from_pairs<I>(pairs: I) -> Result<Self, LineageError>
    where
        I: IntoIterator<Item = (TaxId, TaxId)>,
    {
        Self::new(pairs.into_iter().collect())
    }

    pub fn root(&self) -> TaxId {
        self.root
    }

    pub fn parent(&self, taxid: TaxId) -> Option<TaxId> {
        self.parents.get(&taxid).copied()
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn taxids(&self) -> impl Iterator<Item = TaxId> + '_ {
        self.parents.keys().copied()
    }
}

/// Cuts a runaway chain down to the part that repeats.
fn cycle_chain(chain: Vec<TaxId>) -> Vec<TaxId> {
    let mut seen = HashSet::new();
    match chain.iter().position(|id| !seen.insert(*id)) {
        Some(repeat) => chain[..=repeat].to_vec(),
        None => chain,
    }
}

/// Resolves the lineage of one node, self first and root last.
///
/// The walk is bounded by the size of the table, so a malformed table
/// yields [`LineageError::Cycle`] rather than looping.
pub fn resolve_lineage(
    taxid: TaxId,
    parent_taxid: TaxId,
    parents: &ParentTable,
) -> Result<Vec<TaxId>, LineageError> {
    if taxid == parent_taxid {
        return Ok(vec![taxid]);
    }

    let root = parents.root();
    let bound = parents.len() + 1;
    let mut lineage = vec![taxid, parent_taxid];
    let mut current = parent_taxid;

    while current != root {
        if lineage.len() > bound {
            return Err(LineageError::Cycle {
                taxid,
                chain: cycle_chain(lineage),
            });
        }
        match parents.parent(current) {
            Some(next) => {
                lineage.push(next);
                current = next;
            }
            None => {
                return Err(LineageError::MissingParent {
                    missing: current,
                    chain: lineage,
                })
            }
        }
    }
    Ok(lineage)
}

/// Memoized lineage depths for every taxid of a parent table.
///
/// Built in one pass that walks each edge once: a walk stops at the first
/// node whose depth is already known and splices that depth in. Taxids
/// whose chain is broken are recorded separately.
#[derive(Debug, Default)]
pub struct LineageArena {
    depths: HashMap<TaxId, u32>,
    broken: HashSet<TaxId>,
}

impl LineageArena {
    pub fn build(parents: &ParentTable) -> Self {
        let mut depths = HashMap::with_capacity(parents.len());
        let mut broken = HashSet::new();
        depths.insert(parents.root(), 1);

        let mut path = Vec::new();
        let mut on_path = HashSet::new();
        for start in parents.taxids() {
            if depths.contains_key(&start) || broken.contains(&start) {
                continue;
            }
            path.clear();
            on_path.clear();

            let mut current = start;
            let base = loop {
                if let Some(&depth) = depths.get(&current) {
                    break Some(depth);
                }
                if broken.contains(&current) || !on_path.insert(current) {
                    break None;
                }
                // a parent missing from the table is not itself recorded
                match parents.parent(current) {
                    Some(parent) => {
                        path.push(current);
                        current = parent;
                    }
                    None => break None,
                }
            };

            match base {
                Some(base) => {
                    for (hops, taxid) in path.iter().rev().enumerate() {
                        depths.insert(*taxid, base + hops as u32 + 1);
                    }
                }
                None => broken.extend(path.drain(..)),
            }
        }

        tracing::debug!(
            "lineage arena: {} resolved, {} broken",
            depths.len(),
            broken.len()
        );
        LineageArena { depths, broken }
    }

    /// Number of entries in the lineage of `taxid`, if its chain is sound.
    pub fn depth(&self, taxid: TaxId) -> Option<u32> {
        self.depths.get(&taxid).copied()
    }

    pub fn is_broken(&self, taxid: TaxId) -> bool {
        self.broken.contains(&taxid)
    }

    pub fn broken_count(&self) -> usize {
        self.broken.len()
    }

    /// Taxids of the table whose chain does not reach the root, smallest first.
    pub fn broken_taxids(&self) -> Vec<TaxId> {
        let mut taxids: Vec<TaxId> = self.broken.iter().copied().collect();
        taxids.sort_unstable();
        taxids
    }

    /// Lineage for a record, using the memoized depth when the record agrees
    /// with the table and falling back to a checked walk otherwise.
    pub fn lineage(
        &self,
        taxid: TaxId,
        parent_taxid: TaxId,
        parents: &ParentTable,
    ) -> Result<Vec<TaxId>, LineageError> {
        let agrees = parents.parent(taxid) == Some(parent_taxid);
        match self.depths.get(&taxid) {
            Some(&depth) if agrees => Ok(walk(taxid, depth as usize, parents)),
            _ => resolve_lineage(taxid, parent_taxid, parents),
        }
    }
}

fn walk(taxid: TaxId, depth: usize, parents: &ParentTable) -> Vec<TaxId> {
    let mut lineage = Vec::with_capacity(depth);
    let mut current = Some(taxid);
    while let Some(id) = current {
        lineage.push(id);
        if id == parents.root() || lineage.len() >= depth {
            break;
        }
        current = parents.parent(id);
    }
    lineage
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(pairs: &[(TaxId, TaxId)]) -> ParentTable {
        ParentTable::from_pairs(pairs.iter().copied()).unwrap()
    }

    fn small_tree() -> ParentTable {
        table(&[(1, 1), (2, 1), (3, 2), (4, 2), (5, 4), (6, 1)])
    }

    #[test]
    fn test_resolve_lineage_basic() {
        let parents = table(&[(1, 1), (2, 1), (3, 2)]);
        assert_eq!(resolve_lineage(1, 1, &parents).unwrap(), vec![1]);
        assert_eq!(resolve_lineage(2, 1, &parents).unwrap(), vec![2, 1]);
        assert_eq!(resolve_lineage(3, 2, &parents).unwrap(), vec![3, 2, 1]);
    }

    #[test]
    fn test_lineage_properties_hold_for_every_node() {
        let parents = small_tree();
        for taxid in parents.taxids() {
            let parent = parents.parent(taxid).unwrap();
            let lineage = resolve_lineage(taxid, parent, &parents).unwrap();
            assert_eq!(lineage[0], taxid);
            assert_eq!(*lineage.last().unwrap(), parents.root());
            for pair in lineage.windows(2) {
                assert_eq!(parents.parent(pair[0]), Some(pair[1]));
            }
        }
    }

    #[test]
    fn test_root_need_not_be_one() {
        let parents = table(&[(100, 100), (7, 100), (8, 7)]);
        assert_eq!(parents.root(), 100);
        assert_eq!(resolve_lineage(8, 7, &parents).unwrap(), vec![8, 7, 100]);
    }

    #[test]
    fn test_missing_parent() {
        let parents = table(&[(1, 1), (2, 1), (7, 5), (8, 7)]);
        let err = resolve_lineage(8, 7, &parents).unwrap_err();
        assert_eq!(
            err,
            LineageError::MissingParent {
                missing: 5,
                chain: vec![8, 7, 5],
            }
        );
        assert_eq!(err.offending_taxid(), Some(5));
    }

    #[test]
    fn test_cycle_is_detected() {
        let parents = table(&[(1, 1), (2, 1), (10, 11), (11, 12), (12, 10), (13, 10)]);
        match resolve_lineage(13, 10, &parents) {
            Err(LineageError::Cycle { taxid, chain }) => {
                assert_eq!(taxid, 13);
                assert_eq!(chain, vec![13, 10, 11, 12, 10]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_table_root_checks() {
        assert_eq!(
            ParentTable::from_pairs([(2, 1), (3, 2)]).unwrap_err(),
            LineageError::NoRoot
        );
        assert_eq!(
            ParentTable::from_pairs([(1, 1), (2, 2), (3, 1)]).unwrap_err(),
            LineageError::MultipleRoots(vec![1, 2])
        );
    }

    #[test]
    fn test_arena_matches_direct_resolution() {
        let parents = small_tree();
        let arena = LineageArena::build(&parents);
        assert_eq!(arena.broken_count(), 0);
        assert_eq!(arena.depth(1), Some(1));
        assert_eq!(arena.depth(5), Some(4));
        for taxid in parents.taxids() {
            let parent = parents.parent(taxid).unwrap();
            assert_eq!(
                arena.lineage(taxid, parent, &parents).unwrap(),
                resolve_lineage(taxid, parent, &parents).unwrap()
            );
        }
    }

    #[test]
    fn test_arena_marks_broken_chains() {
        let parents = table(&[
            (1, 1),
            (2, 1),
            (7, 5),
            (8, 7),
            (10, 11),
            (11, 10),
            (12, 2),
        ]);
        let arena = LineageArena::build(&parents);
        assert!(arena.is_broken(7));
        assert!(arena.is_broken(8));
        assert!(arena.is_broken(10));
        assert!(arena.is_broken(11));
        assert!(!arena.is_broken(12));
        assert!(!arena.is_broken(5), "absent parents are not table entries");
        assert_eq!(arena.broken_taxids(), vec![7, 8, 10, 11]);
        assert_eq!(arena.lineage(12, 2, &parents).unwrap(), vec![12, 2, 1]);

        assert!(matches!(
            arena.lineage(8, 7, &parents),
            Err(LineageError::MissingParent { missing: 5, .. })
        ));
        assert!(matches!(
            arena.lineage(10, 11, &parents),
            Err(LineageError::Cycle { taxid: 10, .. })
        ));
    }

    #[test]
    fn test_arena_falls_back_when_record_disagrees() {
        let parents = small_tree();
        let arena = LineageArena::build(&parents);
        // record says 5 hangs off 6, table says 4
        assert_eq!(arena.lineage(5, 6, &parents).unwrap(), vec![5, 6, 1]);
    }
}
