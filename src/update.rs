use crate::config::SourcesConfig;
use crate::error::Result;
use crate::ncbi::{NAMES_FILE, NODES_FILE};
use crate::uniprot::SPECLIST_FILE;
use crate::utils::download_file;
use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

const ETAG_FILE: &str = "etag.txt";
const TAXDUMP_FILE: &str = "taxdump.tar.gz";
pub const GENE_INFO_ARCHIVE: &str = "gene_info.gz";

fn get_etag(response: &reqwest::blocking::Response) -> String {
    response
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|tag| tag.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Fetches every source file into `data_dir`.
pub fn update_sources(sources: &SourcesConfig, data_dir: &Path) -> Result<()> {
    fs::create_dir_all(data_dir)?;
    let client = Client::new();

    update_taxdump(&client, &sources.taxdump_url, data_dir)?;

    tracing::info!("Downloading {}", sources.speclist_url);
    download_file(&client, &sources.speclist_url, &data_dir.join(SPECLIST_FILE))?;

    tracing::info!("Downloading {}", sources.gene_info_url);
    download_file(
        &client,
        &sources.gene_info_url,
        &data_dir.join(GENE_INFO_ARCHIVE),
    )?;

    tracing::info!("Update completed.");
    Ok(())
}

/// Updates the taxdump files if the local version is outdated or does not exist.
///
/// The ETag of the remote archive is compared with the one stored next to
/// the extracted files. On mismatch the archive is downloaded, the new ETag
/// recorded, and `nodes.dmp` / `names.dmp` extracted.
pub fn update_taxdump(client: &Client, url: &str, data_dir: &Path) -> Result<()> {
    let response = client.head(url).send()?;
    let remote_etag = get_etag(&response);

    let etag_file_path = data_dir.join(ETAG_FILE);
    let local_etag = if etag_file_path.exists() {
        fs::read_to_string(&etag_file_path)?
    } else {
        String::new()
    };

    if !remote_etag.is_empty()
        && local_etag == remote_etag
        && data_dir.join(NAMES_FILE).exists()
        && data_dir.join(NODES_FILE).exists()
    {
        tracing::info!("Taxdump is up to date.");
        return Ok(());
    }

    tracing::info!("Updating taxdump...");
    let taxdump_file_path = data_dir.join(TAXDUMP_FILE);
    download_file(client, url, &taxdump_file_path)?;
    fs::write(&etag_file_path, remote_etag)?;

    extract_taxdump(&taxdump_file_path, data_dir)?;
    fs::remove_file(&taxdump_file_path)?;
    Ok(())
}

/// Unpacks `names.dmp` and `nodes.dmp` from a taxdump archive into `data_dir`.
///
/// Entries whose path would land outside `data_dir` are skipped.
pub fn extract_taxdump(archive_path: &Path, data_dir: &Path) -> Result<()> {
    let tar_gz = File::open(archive_path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(tar_gz)));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let wanted = path.ends_with(NAMES_FILE) || path.ends_with(NODES_FILE);
        if wanted && !entry.unpack_in(data_dir)? {
            tracing::warn!("Ignoring archive entry {}", path.display());
        }
    }
    Ok(())
}
