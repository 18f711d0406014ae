use crate::error::Result;
use crate::geneinfo::GeneIdSet;
use crate::lineage::ParentTable;
use crate::model::{Metadata, TaxId, TaxonNode};
use crate::store::{Collection, DocumentStore};
use rusqlite::{params, Connection, Error};
use std::collections::HashMap;
use std::path::Path;

const GENE_TABLE: &str = "geneinfo";
const META_TABLE: &str = "build_meta";
const LINEAGE_TABLE: &str = "taxonomy_lineage";
const METADATA_KEY: &str = "metadata";

pub fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    for collection in Collection::ALL {
        create_collection_table(conn, collection)?;
    }
    conn.execute(
        &format!("CREATE TABLE IF NOT EXISTS {GENE_TABLE} (taxid INTEGER PRIMARY KEY)"),
        [],
    )?;
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {META_TABLE} (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )"
        ),
        [],
    )?;
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {LINEAGE_TABLE} (
            ancestor INTEGER NOT NULL,
            taxid INTEGER NOT NULL,
            depth INTEGER NOT NULL,
            PRIMARY KEY (ancestor, taxid)
        ) WITHOUT ROWID"
        ),
        [],
    )?;
    Ok(())
}

fn create_collection_table(conn: &Connection, collection: Collection) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (
            taxid INTEGER PRIMARY KEY,
            parent_taxid INTEGER,
            rank TEXT,
            has_gene INTEGER NOT NULL DEFAULT 0,
            lineage TEXT NOT NULL DEFAULT '[]',
            doc TEXT NOT NULL
        )",
            collection.name()
        ),
        [],
    )?;
    Ok(())
}

/// Document store backed by a single SQLite database file.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(db: &Path) -> Result<Self> {
        let conn = Connection::open(db)?;
        create_tables(&conn)?;
        tracing::debug!("Opened database {}", db.display());
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        create_tables(&conn)?;
        Ok(SqliteStore { conn })
    }

    fn rebuild_lineage_index(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(&format!("DELETE FROM {LINEAGE_TABLE}"), [])?;
        let rows = tx.execute(
            &format!(
                "INSERT OR IGNORE INTO {LINEAGE_TABLE} (ancestor, taxid, depth)
                 SELECT CAST(j.value AS INTEGER), t.taxid, CAST(j.key AS INTEGER)
                 FROM {} t, json_each(t.lineage) j",
                Collection::Taxonomy.name()
            ),
            [],
        )?;
        tx.commit()?;
        tracing::info!("Indexed {} lineage entries", rows);
        Ok(())
    }
}

impl DocumentStore for SqliteStore {
    fn read_page(
        &self,
        collection: Collection,
        after: Option<TaxId>,
        limit: usize,
    ) -> Result<Vec<TaxonNode>> {
        let query = format!(
            "SELECT doc FROM {} WHERE taxid > ?1 ORDER BY taxid LIMIT ?2",
            collection.name()
        );
        let after = after.map_or(-1, i64::from);
        let mut stmt = self.conn.prepare_cached(&query)?;
        let rows = stmt.query_map(params![after, limit as i64], |row| row.get::<_, String>(0))?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(serde_json::from_str(&row?)?);
        }
        Ok(docs)
    }

    fn get(&self, collection: Collection, taxid: TaxId) -> Result<Option<TaxonNode>> {
        let query = format!("SELECT doc FROM {} WHERE taxid = ?1", collection.name());
        match self
            .conn
            .query_row(&query, params![taxid], |row| row.get::<_, String>(0))
        {
            Ok(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            Err(Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn upsert(&mut self, collection: Collection, docs: &[TaxonNode]) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (taxid, parent_taxid, rank, has_gene, lineage, doc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(taxid) DO UPDATE SET
                parent_taxid = excluded.parent_taxid,
                rank = excluded.rank,
                has_gene = excluded.has_gene,
                lineage = excluded.lineage,
                doc = excluded.doc",
            collection.name()
        );
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&query)?;
            for doc in docs {
                stmt.execute(params![
                    doc.taxid,
                    doc.parent_taxid,
                    doc.rank.as_ref().map(|r| r.as_str()),
                    doc.has_gene,
                    serde_json::to_string(&doc.lineage)?,
                    serde_json::to_string(doc)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn remove(&mut self, collection: Collection, taxids: &[TaxId]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut delete =
                tx.prepare_cached(&format!("DELETE FROM {} WHERE taxid = ?1", collection.name()))?;
            let mut unindex =
                tx.prepare_cached(&format!("DELETE FROM {LINEAGE_TABLE} WHERE taxid = ?1"))?;
            for taxid in taxids {
                delete.execute(params![taxid])?;
                if collection == Collection::Taxonomy {
                    unindex.execute(params![taxid])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn clear(&mut self, collection: Collection) -> Result<()> {
        self.conn
            .execute(&format!("DELETE FROM {}", collection.name()), [])?;
        if collection == Collection::Taxonomy {
            self.conn
                .execute(&format!("DELETE FROM {LINEAGE_TABLE}"), [])?;
        }
        Ok(())
    }

    fn count(&self, collection: Collection) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", collection.name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn insert_gene_ids(&mut self, ids: &[TaxId]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let query = format!("INSERT OR IGNORE INTO {GENE_TABLE} (taxid) VALUES (?1)");
            let mut stmt = tx.prepare_cached(&query)?;
            for taxid in ids {
                inserted += stmt.execute(params![taxid])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn clear_gene_ids(&mut self) -> Result<()> {
        self.conn.execute(&format!("DELETE FROM {GENE_TABLE}"), [])?;
        Ok(())
    }

    fn gene_ids(&self) -> Result<GeneIdSet> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT taxid FROM {GENE_TABLE}"))?;
        let rows = stmt.query_map([], |row| row.get::<_, TaxId>(0))?;
        let mut genes = GeneIdSet::new();
        for row in rows {
            genes.insert(row?);
        }
        Ok(genes)
    }

    fn parent_table(&self, collection: Collection) -> Result<ParentTable> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT taxid, parent_taxid FROM {} WHERE parent_taxid IS NOT NULL",
            collection.name()
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, TaxId>(0)?, row.get::<_, TaxId>(1)?))
        })?;
        let mut parents = HashMap::new();
        for row in rows {
            let (taxid, parent) = row?;
            parents.insert(taxid, parent);
        }
        Ok(ParentTable::new(parents)?)
    }

    fn build_indexes(&mut self, collection: Collection) -> Result<()> {
        let table = collection.name();
        // taxid is already the primary key
        for field in ["rank", "parent_taxid", "has_gene"] {
            self.conn.execute(
                &format!("CREATE INDEX IF NOT EXISTS idx_{table}_{field} ON {table} ({field})"),
                [],
            )?;
        }
        tracing::info!("Created indexes on {}", table);

        if collection == Collection::Taxonomy {
            self.rebuild_lineage_index()?;
        }
        Ok(())
    }

    fn compute_metadata(&self, collection: Collection) -> Result<Metadata> {
        let table = collection.name();
        let distinct: i64 = self.conn.query_row(
            &format!("SELECT COUNT(DISTINCT taxid) FROM {table}"),
            [],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT COALESCE(rank, 'no rank'), COUNT(*) FROM {table} GROUP BY 1"
        ))?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut metadata = Metadata {
            unique_taxonomy_id_count: distinct as u64,
            ..Default::default()
        };
        for row in rows {
            let (rank, count) = row?;
            metadata.distribution_by_rank.insert(rank, count as u64);
        }
        Ok(metadata)
    }

    fn save_metadata(&mut self, metadata: &Metadata) -> Result<()> {
        let value = serde_json::to_string(metadata)?;
        let tx = self.conn.transaction()?;
        tx.execute(&format!("DELETE FROM {META_TABLE}"), [])?;
        tx.execute(
            &format!("INSERT INTO {META_TABLE} (key, value) VALUES (?1, ?2)"),
            params![METADATA_KEY, value],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn load_metadata(&self) -> Result<Option<Metadata>> {
        let query = format!("SELECT value FROM {META_TABLE} WHERE key = ?1");
        match self
            .conn
            .query_row(&query, params![METADATA_KEY], |row| row.get::<_, String>(0))
        {
            Ok(value) => Ok(Some(serde_json::from_str(&value)?)),
            Err(Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn descendants(&self, taxid: TaxId, has_gene_only: bool, limit: usize) -> Result<Vec<TaxId>> {
        let gene_filter = if has_gene_only { "AND t.has_gene = 1" } else { "" };
        let query = format!(
            "SELECT l.taxid FROM {LINEAGE_TABLE} l
             JOIN {} t ON t.taxid = l.taxid
             WHERE l.ancestor = ?1 {gene_filter}
             ORDER BY l.taxid
             LIMIT ?2",
            Collection::Taxonomy.name()
        );
        let mut stmt = self.conn.prepare(&query)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![taxid, limit], |row| row.get::<_, TaxId>(0))?;
        let mut taxids = Vec::new();
        for row in rows {
            taxids.push(row?);
        }
        Ok(taxids)
    }
}
