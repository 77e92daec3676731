use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use url::Url;

use satchel_core::{Config, Database, Processor, RewriteOptions, Rewriter};

mod echo;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Archive web pages for offline and e-reader reading
#[derive(Parser, Debug)]
#[command(name = "satchel")]
#[command(author = "Satchel Contributors")]
#[command(version = VERSION)]
#[command(about = "Archive web pages for offline and e-reader reading", long_about = None)]
struct Args {
    /// Path to the JSON config file (default: ~/.satchel.json)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose status output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, rewrite, and store one or more URLs
    Add {
        /// URLs to archive
        #[arg(value_name = "URL", required = true)]
        urls: Vec<String>,

        /// Also convert each page and mail it to the configured device
        #[arg(long)]
        kindle: bool,
    },

    /// Convert an already-saved page and mail it to the configured device
    Kindle {
        /// Page id, as printed by `add`
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Run the content rewriter over a local HTML file and print the result
    Rewrite {
        /// HTML file to rewrite
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Origin URL used to resolve hidden-tag rules
        #[arg(long, value_name = "URL", default_value = "http://www.example.com/")]
        url: String,

        /// Hidden-tag rule file
        #[arg(long, value_name = "FILE")]
        hidden_tags: Option<PathBuf>,

        /// Rewrite image references to local content-hash filenames
        #[arg(long)]
        download_images: bool,

        /// Print the image filename map after the rewritten HTML
        #[arg(long)]
        images: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.verbose {
        echo::print_banner();
    }

    match args.command {
        Command::Add { ref urls, kindle } => add(&args, urls, kindle).await,
        Command::Kindle { ref id } => send_to_kindle(&args, id).await,
        Command::Rewrite { ref file, ref url, ref hidden_tags, download_images, images } => {
            rewrite_file(file, url, hidden_tags.clone(), download_images, images)
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<Arc<Config>> {
    let path = args.config.clone().unwrap_or_else(Config::default_path);
    let cfg =
        Config::load(&path).with_context(|| format!("Failed to load config from {}", path.display()))?;
    Ok(Arc::new(cfg))
}

async fn add(args: &Args, urls: &[String], kindle: bool) -> anyhow::Result<()> {
    let cfg = load_config(args)?;
    let processor = Processor::new(Arc::clone(&cfg)).context("Failed to initialize processor")?;
    let db = Database::open(&cfg.database).context("Failed to open database")?;

    let total = urls.len();
    for (index, url) in urls.iter().enumerate() {
        Url::parse(url).with_context(|| format!("Invalid URL: {url}"))?;
        if args.verbose {
            echo::print_step(index + 1, total, &format!("Processing {}", url.bright_white().underline()));
        }

        let pi = processor
            .process_url(url)
            .await
            .with_context(|| format!("Failed to process {url}"))?;
        db.add_page(&pi).context("Failed to record page")?;

        if kindle {
            processor
                .send_to_kindle(&pi.id)
                .await
                .with_context(|| format!("Failed to send {url} to Kindle"))?;
        }
        echo::print_success(&format!("Saved {} as {} ({})", url, pi.id, pi.title));
    }
    Ok(())
}

async fn send_to_kindle(args: &Args, id: &str) -> anyhow::Result<()> {
    let cfg = load_config(args)?;
    let processor = Processor::new(Arc::clone(&cfg)).context("Failed to initialize processor")?;

    processor
        .send_to_kindle(id)
        .await
        .with_context(|| format!("Failed to send page {id} to Kindle"))?;
    echo::print_success(&format!("Sent page {id}"));
    Ok(())
}

fn rewrite_file(
    file: &Path,
    url: &str,
    hidden_tags: Option<PathBuf>,
    download_images: bool,
    show_images: bool,
) -> anyhow::Result<()> {
    let html = fs::read_to_string(file).with_context(|| format!("Failed to read file: {}", file.display()))?;

    let rewriter = Rewriter::new(RewriteOptions { download_images, hidden_tags_file: hidden_tags });
    let page = rewriter.rewrite_content(&html, url).context("Failed to rewrite content")?;

    print!("{}", page.html);
    if show_images {
        let mut images: Vec<_> = page.images.iter().collect();
        images.sort();
        if !images.is_empty() {
            println!();
        }
        for (filename, remote) in images {
            println!("{filename}\t{remote}");
        }
    } else if !page.images.is_empty() {
        echo::print_info(&format!("{} image(s) to download", page.images.len()));
    }
    Ok(())
}
