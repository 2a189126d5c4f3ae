use clap::{Args, Parser, Subcommand};
use locator_core::{highlight_selector, Document, DocumentSnapshot, Highlighter, ScanResponse};
use locator_forge::{report, Capture, Config, OutputFormat};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "locator-forge")]
#[command(about = "Ranked CSS/XPath locators for every element on a page")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a page or a saved snapshot and print its locators
    Scan(ScanArgs),

    /// Save a page as a snapshot file
    Capture {
        /// Page to capture
        #[arg(long)]
        url: String,

        /// Where to write the snapshot
        #[arg(short, long)]
        output: PathBuf,

        /// Run in headless mode (overrides config)
        #[arg(long)]
        headless: bool,
    },

    /// Highlight the elements a selector matches in a snapshot
    Highlight {
        /// Snapshot to search
        #[arg(long)]
        snapshot: PathBuf,

        /// CSS selector, or XPath when it starts with '/' or '('
        #[arg(long)]
        selector: String,

        /// Write the highlighted snapshot here instead of clearing
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Live page to scan
    #[arg(long, required_unless_present = "snapshot", conflicts_with = "snapshot")]
    url: Option<String>,

    /// Snapshot file to scan
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Keep elements that are not visible
    #[arg(long)]
    include_hidden: bool,

    /// Do not walk into shadow roots
    #[arg(long)]
    no_shadow: bool,

    /// Output format: json or text (overrides config)
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,

    /// Drop elements whose best locator scores below this
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Also save the captured page as a snapshot
    #[arg(long)]
    save_snapshot: Option<PathBuf>,

    /// Run in headless mode (overrides config)
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> locator_forge::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let mut config = match cli.config {
        Some(ref path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Scan(args) => scan(&mut config, args).await,
        Command::Capture {
            url,
            output,
            headless,
        } => {
            if headless {
                config.browser.headless = true;
            }
            let capture = Capture::launch(&config.browser).await?;
            let snapshot = capture.snapshot(&url).await;
            capture.close().await?;
            write_snapshot(&snapshot?, &output)?;
            println!("✓ Saved {}", output.display());
            Ok(())
        }
        Command::Highlight {
            snapshot,
            selector,
            output,
        } => highlight(&snapshot, &selector, output.as_deref()),
    }
}

async fn scan(config: &mut Config, args: ScanArgs) -> locator_forge::Result<()> {
    if args.include_hidden {
        config.scan.include_hidden = true;
    }
    if args.no_shadow {
        config.scan.include_shadow_dom = false;
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }
    if args.pretty {
        config.output.pretty = true;
    }
    if let Some(min) = args.min_confidence {
        if !(0.0..=1.0).contains(&min) {
            return Err(locator_forge::Error::Config(
                "--min-confidence must be between 0 and 1".into(),
            ));
        }
        config.output.min_confidence = min;
    }
    if args.headless {
        config.browser.headless = true;
    }

    let doc = match (args.url, args.snapshot) {
        (Some(url), _) => {
            let capture = Capture::launch(&config.browser).await?;
            let snapshot = capture.snapshot(&url).await;
            capture.close().await?;
            let snapshot = snapshot?;
            if let Some(ref path) = args.save_snapshot {
                write_snapshot(&snapshot, path)?;
                info!("snapshot saved to {}", path.display());
            }
            Document::from_snapshot(&snapshot)
        }
        (None, Some(path)) => {
            if args.save_snapshot.is_some() {
                warn!("--save-snapshot ignored when scanning a snapshot");
            }
            Document::from_snapshot(&DocumentSnapshot::load(&path)?)
        }
        (None, None) => {
            return Err(locator_forge::Error::Config(
                "either --url or --snapshot is required".into(),
            ))
        }
    };

    let response = ScanResponse::run(&doc, &config.scan_options());
    let success = response.success;
    let response = report::filter(response, config.output.min_confidence);
    let rendered = report::render(&response, &config.output)?;
    match config.output.format {
        OutputFormat::Json => println!("{}", rendered),
        OutputFormat::Text => print!("{}", rendered),
    }

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

fn highlight(snapshot: &Path, selector: &str, output: Option<&Path>) -> locator_forge::Result<()> {
    let mut doc = Document::from_snapshot(&DocumentSnapshot::load(snapshot)?);
    let mut highlighter = Highlighter::new();
    let outcome = highlight_selector(&mut highlighter, &mut doc, selector);
    println!("{}", report::highlight(selector, &outcome));

    match output {
        Some(path) if outcome.found => {
            write_snapshot(&doc.to_snapshot(), path)?;
            println!("  Saved {}", path.display());
        }
        _ => {
            highlighter.clear(&mut doc);
        }
    }

    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}

fn write_snapshot(snapshot: &DocumentSnapshot, path: &Path) -> locator_forge::Result<()> {
    std::fs::write(path, snapshot.to_json(true)?)?;
    Ok(())
}
