use crate::error::MergeIntegrityError;
use crate::model::{NameValue, TaxId, TaxonNode};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ParentTaxid,
    Rank,
    ScientificName,
    CommonName,
    GenbankCommonName,
    OtherNames,
    UniprotName,
    Extra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// A value from the incoming record replaces the current one; an absent
    /// incoming value keeps it.
    Overwrite,
    AppendToSet,
    AppendToList,
}

/// Merge policy per source field. `has_gene` and `lineage` are derived after
/// the merge and never taken from sources.
pub const FIELD_POLICIES: [(Field, MergePolicy); 8] = [
    (Field::ParentTaxid, MergePolicy::Overwrite),
    (Field::Rank, MergePolicy::Overwrite),
    (Field::ScientificName, MergePolicy::Overwrite),
    (Field::CommonName, MergePolicy::AppendToList),
    (Field::GenbankCommonName, MergePolicy::AppendToList),
    (Field::OtherNames, MergePolicy::AppendToSet),
    (Field::UniprotName, MergePolicy::Overwrite),
    (Field::Extra, MergePolicy::AppendToList),
];

pub fn policy_for(field: Field) -> MergePolicy {
    FIELD_POLICIES
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, p)| *p)
        .unwrap_or(MergePolicy::Overwrite)
}

fn merge_scalar<T>(current: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *current = incoming;
    }
}

fn merge_names(field: Field, current: &mut NameValue, incoming: NameValue) {
    match policy_for(field) {
        MergePolicy::Overwrite if !incoming.is_absent() => *current = incoming,
        MergePolicy::Overwrite => {}
        MergePolicy::AppendToList | MergePolicy::AppendToSet => current.extend(incoming),
    }
}

fn merge_set(field: Field, current: &mut BTreeSet<String>, incoming: BTreeSet<String>) {
    match policy_for(field) {
        MergePolicy::Overwrite if !incoming.is_empty() => *current = incoming,
        MergePolicy::Overwrite => {}
        MergePolicy::AppendToList | MergePolicy::AppendToSet => current.extend(incoming),
    }
}

fn merge_extra(
    current: &mut BTreeMap<String, Vec<String>>,
    incoming: BTreeMap<String, Vec<String>>,
) {
    let policy = policy_for(Field::Extra);
    for (class, values) in incoming {
        let slot = current.entry(class).or_default();
        match policy {
            MergePolicy::Overwrite => *slot = values,
            MergePolicy::AppendToList => slot.extend(values),
            MergePolicy::AppendToSet => {
                for value in values {
                    if !slot.contains(&value) {
                        slot.push(value);
                    }
                }
            }
        }
    }
}

/// Folds `incoming` into `current` following [`FIELD_POLICIES`].
///
/// Scalar fields only support overwrite.
pub fn merge_into(current: &mut TaxonNode, incoming: TaxonNode) {
    merge_scalar(&mut current.parent_taxid, incoming.parent_taxid);
    merge_scalar(&mut current.rank, incoming.rank);
    merge_scalar(&mut current.scientific_name, incoming.scientific_name);
    merge_scalar(&mut current.uniprot_name, incoming.uniprot_name);
    merge_names(Field::CommonName, &mut current.common_name, incoming.common_name);
    merge_names(
        Field::GenbankCommonName,
        &mut current.genbank_common_name,
        incoming.genbank_common_name,
    );
    merge_set(Field::OtherNames, &mut current.other_names, incoming.other_names);
    merge_extra(&mut current.extra, incoming.extra);
}

/// Result of [`RecordMerger::finish`].
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Placeable records in taxid order.
    pub nodes: Vec<TaxonNode>,
    /// Records dropped for lacking a nodes.dmp entry.
    pub dropped: Vec<MergeIntegrityError>,
}

#[derive(Debug, Default)]
pub struct RecordMerger {
    records: BTreeMap<TaxId, TaxonNode>,
}

impl RecordMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, node: TaxonNode) {
        match self.records.get_mut(&node.taxid) {
            Some(current) => merge_into(current, node),
            None => {
                let mut fresh = TaxonNode::new(node.taxid);
                merge_into(&mut fresh, node);
                self.records.insert(fresh.taxid, fresh);
            }
        }
    }

    pub fn absorb_all<I: IntoIterator<Item = TaxonNode>>(&mut self, nodes: I) {
        for node in nodes {
            self.absorb(node);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops records without a parent and fills in `rank#`.
    pub fn finish(self) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for (taxid, mut node) in self.records {
            if node.parent_taxid.is_none() {
                outcome.dropped.push(MergeIntegrityError { taxid });
                continue;
            }
            node.rank_index = node.rank.as_ref().and_then(|r| r.index());
            outcome.nodes.push(node);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rank;
    use pretty_assertions::assert_eq;

    fn nodes_record(taxid: TaxId, parent: TaxId, rank: &str) -> TaxonNode {
        let mut node = TaxonNode::new(taxid);
        node.parent_taxid = Some(parent);
        node.rank = rank.parse().ok();
        node
    }

    fn names_record(taxid: TaxId, scientific: &str) -> TaxonNode {
        let mut node = TaxonNode::new(taxid);
        node.scientific_name = Some(scientific.to_string());
        node
    }

    #[test]
    fn test_merge_across_sources() {
        let mut merger = RecordMerger::new();
        merger.absorb(names_record(9606, "homo sapiens"));
        merger.absorb(nodes_record(9606, 9605, "species"));
        let mut species = TaxonNode::new(9606);
        species.uniprot_name = Some("homo sapiens".to_string());
        merger.absorb(species);

        let outcome = merger.finish();
        assert!(outcome.dropped.is_empty());
        let human = &outcome.nodes[0];
        assert_eq!(human.parent_taxid, Some(9605));
        assert_eq!(human.rank, Some(Rank::Ranked(24)));
        assert_eq!(human.rank_index, Some(24));
        assert_eq!(human.scientific_name.as_deref(), Some("homo sapiens"));
        assert_eq!(human.uniprot_name.as_deref(), Some("homo sapiens"));
    }

    #[test]
    fn test_absent_field_keeps_earlier_value() {
        let mut merger = RecordMerger::new();
        merger.absorb(nodes_record(2, 1, "superkingdom"));
        merger.absorb(TaxonNode::new(2));
        merger.absorb(nodes_record(1, 1, "no rank"));
        let outcome = merger.finish();
        assert_eq!(outcome.nodes[1].parent_taxid, Some(1));
        assert_eq!(outcome.nodes[1].rank_index, Some(0));
        assert_eq!(outcome.nodes[0].rank_index, None);
    }

    #[test]
    fn test_present_field_is_overwritten() {
        let mut merger = RecordMerger::new();
        merger.absorb(names_record(5, "old"));
        merger.absorb(names_record(5, "new"));
        merger.absorb(nodes_record(5, 1, "genus"));
        let outcome = merger.finish();
        assert_eq!(outcome.nodes[0].scientific_name.as_deref(), Some("new"));
    }

    #[test]
    fn test_records_without_parent_are_dropped() {
        let mut merger = RecordMerger::new();
        merger.absorb(nodes_record(1, 1, "no rank"));
        merger.absorb(names_record(77, "orphan"));
        let mut uniprot_only = TaxonNode::new(88);
        uniprot_only.uniprot_name = Some("ghost".to_string());
        merger.absorb(uniprot_only);

        let outcome = merger.finish();
        assert_eq!(outcome.nodes.len(), 1);
        assert_eq!(
            outcome.dropped,
            vec![
                MergeIntegrityError { taxid: 77 },
                MergeIntegrityError { taxid: 88 }
            ]
        );
    }

    #[test]
    fn test_split_name_groups_combine() {
        let mut first = TaxonNode::new(42);
        first.common_name.push("mouse".to_string());
        first.other_names.insert("mus".to_string());
        let mut second = TaxonNode::new(42);
        second.common_name.push("house mouse".to_string());
        second.other_names.insert("mus".to_string());
        second
            .extra
            .insert("authority".to_string(), vec!["linnaeus".to_string()]);

        let mut merger = RecordMerger::new();
        merger.absorb_all([first, second, nodes_record(42, 1, "species")]);
        let node = &merger.finish().nodes[0];
        assert_eq!(
            node.common_name,
            NameValue::Multiple(vec!["mouse".to_string(), "house mouse".to_string()])
        );
        assert_eq!(node.other_names.len(), 1);
        assert_eq!(node.extra["authority"], vec!["linnaeus".to_string()]);
    }
}
