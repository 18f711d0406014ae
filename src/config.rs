use crate::error::{Result, TaxonomyError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub sources: SourcesConfig,
    pub build: BuildConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the downloaded flat files
    pub data_dir: PathBuf,
    /// SQLite database file; relative paths are taken from `data_dir`
    pub database: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub taxdump_url: String,
    pub speclist_url: String,
    pub gene_info_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingParentPolicy {
    /// Stop the build at the first broken chain.
    Abort,
    /// Leave the record unwritten and report it.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub page_size: usize,
    /// Upload batch size per write transaction
    pub batch_size: usize,
    /// Worker threads for the per-page transform; 0 uses all cores
    pub workers: usize,
    pub on_missing_parent: MissingParentPolicy,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database: PathBuf::from("taxonomy.db"),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            taxdump_url: "https://ftp.ncbi.nlm.nih.gov/pub/taxonomy/taxdump.tar.gz".to_string(),
            speclist_url:
                "https://ftp.uniprot.org/pub/databases/uniprot/current_release/knowledgebase/complete/docs/speclist.txt"
                    .to_string(),
            gene_info_url: "https://ftp.ncbi.nlm.nih.gov/gene/DATA/gene_info.gz".to_string(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            page_size: 5000,
            batch_size: 1000,
            workers: 0,
            on_missing_parent: MissingParentPolicy::Abort,
        }
    }
}

impl Config {
    pub fn database_path(&self) -> PathBuf {
        if self.paths.database.is_absolute() {
            self.paths.database.clone()
        } else {
            self.paths.data_dir.join(&self.paths.database)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.build.page_size == 0 {
            return Err(TaxonomyError::Config("build.page_size must be positive".into()));
        }
        if self.build.batch_size == 0 {
            return Err(TaxonomyError::Config("build.batch_size must be positive".into()));
        }
        Ok(())
    }
}

pub fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.build.page_size, 5000);
        assert_eq!(config.build.on_missing_parent, MissingParentPolicy::Abort);
        assert_eq!(config.database_path(), PathBuf::from("data/taxonomy.db"));
    }

    #[test]
    fn test_partial_override() {
        let config = parse_config(
            r#"
            [paths]
            data_dir = "/srv/taxonomy"

            [build]
            page_size = 200
            on_missing_parent = "skip"
            "#,
        )
        .unwrap();
        assert_eq!(config.build.page_size, 200);
        assert_eq!(config.build.batch_size, 1000);
        assert_eq!(config.build.on_missing_parent, MissingParentPolicy::Skip);
        assert_eq!(
            config.database_path(),
            PathBuf::from("/srv/taxonomy/taxonomy.db")
        );
        assert!(config.sources.taxdump_url.ends_with("taxdump.tar.gz"));
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            parse_config("[build]\npage_size = 0\n"),
            Err(TaxonomyError::Config(_))
        ));
        assert!(matches!(
            parse_config("[build]\non_missing_parent = \"ignore\"\n"),
            Err(TaxonomyError::Config(_))
        ));
    }
}
