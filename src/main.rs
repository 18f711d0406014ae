use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taxahub::build::{merge_sources, post_merge, run_build};
use taxahub::config::{load_config, Config};
use taxahub::db::SqliteStore;
use taxahub::store::{children, Collection, DocumentStore};
use taxahub::update::update_sources;
use taxahub::upload::{upload_source, Source};
use tracing_subscriber::EnvFilter;

#[derive(clap::Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    pub cmd: Command,

    #[clap(short, long, help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    #[clap(short, long, help = "Directory holding the source files and the database")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[clap(about = "Download taxdump, speclist and gene_info files")]
    Update,
    #[clap(about = "Load source files into their collections")]
    Upload {
        #[clap(value_enum, help = "Source to load, all of them when omitted")]
        source: Option<Source>,
    },
    #[clap(about = "Merge the source collections into the taxonomy collection")]
    Merge,
    #[clap(about = "Compute lineage, gene flags, indexes and metadata")]
    Build {
        #[clap(long, help = "Upload and merge every source first")]
        full: bool,
    },
    #[clap(about = "Print the taxon count by rank")]
    Metadata,
    #[clap(about = "Print one merged taxon as JSON")]
    Show { taxid: u32 },
    #[clap(about = "List taxids whose lineage contains the given taxid")]
    Children {
        taxid: u32,
        #[clap(long, help = "Only taxa with gene records")]
        has_gene: bool,
        #[clap(long, help = "Keep the queried taxid in the result")]
        include_self: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let log_level = std::env::var("TAXAHUB_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(data_dir) = args.data_dir {
        config.paths.data_dir = data_dir;
    }
    let data_dir = &config.paths.data_dir;

    let start = std::time::Instant::now();
    std::fs::create_dir_all(data_dir)?;
    let db = config.database_path();
    let mut store = SqliteStore::open(&db)
        .with_context(|| format!("failed to open database {}", db.display()))?;
    run(&mut store, &config, args.cmd)?;
    let duration = start.elapsed();
    println!("Time elapsed: {:?}", duration);

    Ok(())
}

fn run(store: &mut SqliteStore, config: &Config, cmd: Command) -> anyhow::Result<()> {
    let data_dir = &config.paths.data_dir;
    let build = &config.build;
    match cmd {
        Command::Update => update_sources(&config.sources, data_dir)?,
        Command::Upload { source } => {
            let sources = match source {
                Some(source) => vec![source],
                None => Source::ALL.to_vec(),
            };
            for source in sources {
                let report = upload_source(store, source, data_dir, build.batch_size)?;
                println!("{}: {} records", source, report.stored);
            }
        }
        Command::Merge => {
            let report = merge_sources(store, build)?;
            println!(
                "Merged {} records, dropped {} without parent",
                report.merged,
                report.dropped.len()
            );
        }
        Command::Build { full } => {
            let report = if full {
                run_build(store, data_dir, build)?
            } else {
                post_merge(store, build)?
            };
            println!(
                "Processed {} records, skipped {}",
                report.processed,
                report.skipped.len()
            );
            for err in &report.skipped {
                println!("  {}", err);
            }
        }
        Command::Metadata => match store.load_metadata()? {
            Some(metadata) => {
                println!("unique taxids: {}", metadata.unique_taxonomy_id_count);
                if let Some(built_at) = metadata.built_at {
                    println!("built at: {}", built_at.to_rfc3339());
                }
                for (rank, count) in metadata.ranks_by_count() {
                    println!("{}\t{}", rank, count);
                }
            }
            None => println!("No metadata, run `build` first"),
        },
        Command::Show { taxid } => match store.get(Collection::Taxonomy, taxid)? {
            Some(node) => println!("{}", serde_json::to_string_pretty(&node)?),
            None => anyhow::bail!("taxid {} not found", taxid),
        },
        Command::Children {
            taxid,
            has_gene,
            include_self,
        } => {
            let taxids = children(&*store, taxid, has_gene, include_self)?;
            let line: Vec<String> = taxids.iter().map(|id| id.to_string()).collect();
            println!("{}", line.join(","));
        }
    }
    Ok(())
}
