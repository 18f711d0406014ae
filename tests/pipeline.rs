use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use taxahub::build::run_build;
use taxahub::config::BuildConfig;
use taxahub::db::SqliteStore;
use taxahub::model::{NameValue, TaxonNode};
use taxahub::store::{children, pages, Collection, DocumentStore, MemoryStore};
use taxahub::upload::{upload_source, Source};

const NODES: &str = "\
1\t|\t1\t|\tno rank\t|
131567\t|\t1\t|\tno rank\t|
2\t|\t131567\t|\tsuperkingdom\t|
9605\t|\t2\t|\tgenus\t|
9606\t|\t9605\t|\tspecies\t|
10090\t|\t9605\t|\tspecies\t|
";

const NAMES: &str = "\
1\t|\troot\t|\t\t|\tscientific name\t|
5\t|\tno class
9606\t|\tHomo sapiens\t|\t\t|\tscientific name\t|
9606\t|\thuman\t|\t\t|\tgenbank common name\t|
10090\t|\tmouse\t|\t\t|\tcommon name\t|
10090\t|\thouse mouse\t|\t\t|\tcommon name\t|
10090\t|\tMus musculus\t|\t\t|\tscientific name\t|
10090\t|\tMus muscaris\t|\t\t|\tmisspelling\t|
99999\t|\tunplaced\t|\t\t|\tscientific name\t|
";

const SPECLIST: &str = "\
Code  Taxon    N=Official name
_____ _ _______  ____________________
HUMAN E    9606: N=Homo sapiens
                 C=Human
MOUSE E   10090: N=Mus musculus
";

const GENE_INFO: &str = "\
#tax_id\tGeneID\tSymbol
9606\t1\tA1BG
9606\t2\tA2M
10090\t11287\tPzp
";

fn write_sources(dir: &Path) {
    fs::write(dir.join("nodes.dmp"), NODES).unwrap();
    fs::write(dir.join("names.dmp"), NAMES).unwrap();
    fs::write(dir.join("speclist.txt"), SPECLIST).unwrap();
    fs::write(dir.join("gene_info"), GENE_INFO).unwrap();
}

fn config() -> BuildConfig {
    BuildConfig {
        page_size: 4,
        batch_size: 3,
        workers: 2,
        ..Default::default()
    }
}

fn merged<S: DocumentStore>(store: &S) -> Vec<TaxonNode> {
    pages(store, Collection::Taxonomy, 100)
        .flat_map(|page| page.unwrap())
        .collect()
}

#[test]
fn test_full_build_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let mut store = SqliteStore::open(&dir.path().join("taxonomy.db")).unwrap();

    let report = run_build(&mut store, dir.path(), &config()).unwrap();
    assert_eq!(report.processed, 6);
    assert!(report.skipped.is_empty());
    assert_eq!(store.get(Collection::Taxonomy, 99999).unwrap(), None);

    let human = store.get(Collection::Taxonomy, 9606).unwrap().unwrap();
    assert_eq!(human.lineage, vec![9606, 9605, 2, 131567, 1]);
    assert_eq!(human.scientific_name.as_deref(), Some("homo sapiens"));
    assert_eq!(human.uniprot_name.as_deref(), Some("homo sapiens"));
    assert_eq!(human.genbank_common_name, NameValue::Single("human".to_string()));
    assert!(human.has_gene);

    let mouse = store.get(Collection::Taxonomy, 10090).unwrap().unwrap();
    assert_eq!(
        mouse.common_name,
        NameValue::Multiple(vec!["mouse".to_string(), "house mouse".to_string()])
    );
    assert!(mouse.other_names.contains("mus muscaris"));

    let genus = store.get(Collection::Taxonomy, 9605).unwrap().unwrap();
    assert!(!genus.has_gene);

    assert_eq!(children(&store, 2, false, false).unwrap(), vec![9605, 9606, 10090]);
    assert_eq!(children(&store, 131567, true, false).unwrap(), vec![9606, 10090]);
    assert_eq!(children(&store, 9606, false, true).unwrap(), vec![9606]);

    let metadata = store.load_metadata().unwrap().unwrap();
    assert_eq!(metadata.unique_taxonomy_id_count, 6);
    assert_eq!(metadata.ranks_by_count()[0], ("no rank", 2));
    assert_eq!(metadata.distribution_by_rank.get("species"), Some(&2));
}

#[test]
fn test_sqlite_and_memory_stores_agree() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());

    let mut sqlite = SqliteStore::open(&dir.path().join("taxonomy.db")).unwrap();
    let mut memory = MemoryStore::new();
    let from_sqlite = run_build(&mut sqlite, dir.path(), &config()).unwrap();
    let from_memory = run_build(&mut memory, dir.path(), &config()).unwrap();

    assert_eq!(merged(&sqlite), merged(&memory));
    assert_eq!(
        from_sqlite.metadata.distribution_by_rank,
        from_memory.metadata.distribution_by_rank
    );
    assert_eq!(
        children(&sqlite, 1, true, true).unwrap(),
        children(&memory, 1, true, true).unwrap()
    );
}

#[test]
fn test_names_upload_counts_skipped_rows() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let mut store = MemoryStore::new();

    let report = upload_source(&mut store, Source::Names, dir.path(), 2).unwrap();
    assert_eq!(report.skipped_rows, 1);
    assert_eq!(report.stored, 4);
    assert_eq!(report.reconciled, 0);

    let genes = upload_source(&mut store, Source::GeneInfo, dir.path(), 2).unwrap();
    assert_eq!(genes.stored, 2);
    assert_eq!(genes.duplicates, 1);
}

#[test]
fn test_rebuild_replaces_previous_build() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let mut store = SqliteStore::open(&dir.path().join("taxonomy.db")).unwrap();
    run_build(&mut store, dir.path(), &config()).unwrap();
    let first = merged(&store);

    fs::write(dir.path().join("gene_info"), "#tax_id\tGeneID\n10090\t1\n").unwrap();
    run_build(&mut store, dir.path(), &config()).unwrap();
    let second = merged(&store);

    assert_eq!(first.len(), second.len());
    assert!(!store.get(Collection::Taxonomy, 9606).unwrap().unwrap().has_gene);
    assert!(store.get(Collection::Taxonomy, 10090).unwrap().unwrap().has_gene);
    assert_eq!(children(&store, 1, true, false).unwrap(), vec![10090]);
}
