use std::path::{Path, PathBuf};

use tracing::info;

use imagehaul::download::{sanitize_folder_name, HttpTransfer};
use imagehaul::scraping::observer::{ArtifactObserver, CrawlObserver, NoopObserver};
use imagehaul::{collect_images, config, BrowserSession, CollectRequest, CrawlConfig, FilterPolicy};

const USAGE: &str = "\
imagehaul — download images from an image search results page

Usage:
  imagehaul -s <term> [options]        text search
  imagehaul -r <image-path> [options]  reverse image search

Options:
  -s, --search <term>       Search term for image search
  -r, --reverse <path>      Path to an image file for reverse image search
  -n, --num-images <N>      Number of images to download (default: 10)
  -o, --output <folder>     Output folder name
                            (default: search term, or reverse_search_<name>)
      --unfiltered          Disable the site's content filter
      --no-headless         Show the browser window
      --debug-dir <dir>     Dump page-source snapshots and screenshots here
  -h, --help                Show this help
";

struct CliArgs {
    request: CollectRequest,
    output: Option<String>,
    headless: bool,
    debug_dir: Option<PathBuf>,
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> Result<Option<CliArgs>, String> {
    let mut search: Option<String> = None;
    let mut reverse: Option<String> = None;
    let mut num_images: usize = 10;
    let mut output: Option<String> = None;
    let mut headless = true;
    let mut unfiltered = false;
    let mut debug_dir: Option<PathBuf> = None;

    while let Some(a) = argv.next() {
        match a.as_str() {
            "-s" | "--search" => {
                search = Some(argv.next().ok_or("--search requires a value")?);
            }
            "-r" | "--reverse" => {
                reverse = Some(argv.next().ok_or("--reverse requires a value")?);
            }
            "-n" | "--num-images" => {
                let v = argv.next().ok_or("--num-images requires a value")?;
                num_images = v
                    .parse()
                    .map_err(|_| format!("invalid image count: {}", v))?;
            }
            "-o" | "--output" => {
                output = Some(argv.next().ok_or("--output requires a value")?);
            }
            "--unfiltered" => unfiltered = true,
            "--no-headless" => headless = false,
            "--debug-dir" => {
                debug_dir = Some(PathBuf::from(
                    argv.next().ok_or("--debug-dir requires a value")?,
                ));
            }
            "-h" | "--help" => return Ok(None),
            other => return Err(format!("unknown argument: {}", other)),
        }
    }

    if num_images == 0 {
        return Err("--num-images must be positive".to_string());
    }

    let mut request = match (search, reverse) {
        (Some(term), None) => CollectRequest::text(term, num_images),
        (None, Some(path)) => CollectRequest::reference_image(path, num_images),
        (Some(_), Some(_)) => {
            return Err("--search and --reverse are mutually exclusive".to_string())
        }
        (None, None) => return Err("one of --search or --reverse is required".to_string()),
    };
    if unfiltered {
        request.filter_policy = FilterPolicy::Unfiltered;
    }

    Ok(Some(CliArgs {
        request,
        output,
        headless,
        debug_dir,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => {
            print!("{}", USAGE);
            return Ok(());
        }
        Err(msg) => {
            eprintln!("error: {}\n\n{}", msg, USAGE);
            std::process::exit(2);
        }
    };

    let folder = sanitize_folder_name(
        &args
            .output
            .clone()
            .unwrap_or_else(|| args.request.query.default_folder_name()),
    );

    let http_client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?;
    let transfer = HttpTransfer::new(http_client, config::download_timeout());

    let observer: Box<dyn CrawlObserver> = match &args.debug_dir {
        Some(dir) => Box::new(ArtifactObserver::new(dir)),
        None => Box::new(NoopObserver),
    };

    let session = BrowserSession::launch(args.headless).await?;
    let outcome = collect_images(
        &session,
        &transfer,
        &args.request,
        Path::new(&folder),
        CrawlConfig::default(),
        observer.as_ref(),
    )
    .await;
    session.close().await;
    let result = outcome?;

    if result.attempted == 0 {
        println!("No images found!");
    } else {
        info!(
            "downloaded {}/{} images ({} failed)",
            result.succeeded,
            result.attempted,
            result.failed()
        );
        println!(
            "Successfully downloaded {}/{} images to {}/",
            result.succeeded, result.attempted, folder
        );
    }

    Ok(())
}
