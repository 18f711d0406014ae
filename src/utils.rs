use crate::error::{Result, TaxonomyError};
use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;

const DOWNLOAD_ATTEMPTS: u32 = 3;

/// Downloads a file from the given URL and saves it to the specified output path.
pub fn download_file(client: &Client, url: &str, output_path: &Path) -> Result<()> {
    let mut attempts = 0;
    let mut response = loop {
        attempts += 1;
        match client.get(url).send().and_then(|r| r.error_for_status()) {
            Ok(resp) => break resp,
            Err(e) if attempts < DOWNLOAD_ATTEMPTS => {
                tracing::warn!("Attempt {} failed: {}. Retrying...", attempts, e);
                continue;
            }
            Err(e) => {
                return Err(TaxonomyError::Network(format!(
                    "Failed to download {} after {} attempts: {}",
                    url, attempts, e
                )));
            }
        }
    };

    let mut file = BufWriter::new(File::create(output_path)?);
    response.copy_to(&mut file)?;
    Ok(())
}

/// Opens a text file for line reading, decoding gzip when the name ends in `.gz`.
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}
