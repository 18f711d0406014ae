pub mod annotate;
pub mod build;
pub mod config;
pub mod db;
pub mod error;
pub mod geneinfo;
pub mod lineage;
pub mod merge;
pub mod model;
pub mod ncbi;
pub mod store;
pub mod uniprot;
pub mod update;
pub mod upload;
pub mod utils;

pub use error::{LineageError, Result, TaxonomyError};
pub use model::{TaxId, TaxonNode};
