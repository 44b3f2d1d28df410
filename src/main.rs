use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yt2audio::archive::Archive;
use yt2audio::cli::{ChannelArgs, Cli, Commands, DownloadArgs};
use yt2audio::config::Config;
use yt2audio::coordinator::Coordinator;
use yt2audio::extractors::ytdlp::{list_channel_videos, ChannelQuery};
use yt2audio::extractors::YtDlp;
use yt2audio::postprocess::{CoverArtFallback, HttpFetcher, LyricsEmbed, MetadataRepair, PostProcessor};
use yt2audio::utils::{self, mask_proxy_password};
use yt2audio::{read_urls, ArchiverError};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose { "yt2audio=debug" } else { "yt2audio=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // `config --init` may target a file that does not exist yet
    let mut config = if matches!(cli.command, Commands::Config { init: true, .. }) {
        Config::default()
    } else {
        Config::load(cli.config.as_deref())?
    };

    match cli.command {
        Commands::Download(args) => download(&mut config, &args, cli.quiet),
        Commands::Channel(args) => channel(&mut config, &args),
        Commands::Config { show, init } => {
            if init {
                let path = match &cli.config {
                    Some(path) => path.clone(),
                    None => Config::config_path().context("Could not determine config directory")?,
                };
                Config::default().save(&path)?;
                println!("Default configuration written to: {}", path.display());
            } else if show {
                config.display();
            } else {
                match Config::config_path() {
                    Some(path) => println!("Config file: {}", path.display()),
                    None => println!("No config directory available; pass --config <FILE>"),
                }
                println!("Use --show to print the effective configuration or --init to create it.");
            }
            Ok(())
        }
    }
}

fn download(config: &mut Config, args: &DownloadArgs, quiet: bool) -> Result<()> {
    args.apply(config);
    config.validate()?;

    let items = read_urls(&args.urls)?;
    if config.network.browser.is_none() {
        if let Some(cookies) = &config.network.cookies {
            if !cookies.is_file() {
                return Err(ArchiverError::CredentialsNotFound(cookies.clone()).into());
            }
        }
    }

    if items.is_empty() {
        println!("No URLs found in file.");
        std::process::exit(1);
    }

    warn_missing_tools(config);

    let output_dir = &config.download.output_dir;
    fs_err::create_dir_all(output_dir).context("Failed to create output directory")?;

    let archive = if config.download.archive {
        let archive = Archive::load(config.archive_path())?;
        tracing::info!("Archive {} holds {} item(s)", archive.path().display(), archive.len());
        Some(archive)
    } else {
        None
    };

    let mut stages: Vec<Box<dyn PostProcessor>> = Vec::new();
    if config.download.metadata {
        stages.push(Box::new(MetadataRepair::new()));
    }
    if config.download.thumbnail {
        let fetcher = HttpFetcher::new(config.thumbnail_timeout(), config.network.proxy.as_deref())?;
        stages.push(Box::new(CoverArtFallback::new(Box::new(fetcher))));
    }
    if config.download.lyrics {
        stages.push(Box::new(LyricsEmbed::new(config.download.sub_langs.clone())));
    }

    let show_progress = !quiet && std::io::stdout().is_terminal();
    let coordinator = Coordinator::new(config.download.threads, archive, stages).with_progress(show_progress);

    let total = items.len();
    let plan = coordinator.plan(items);
    print_banner(config, total, plan.skipped);

    if plan.pending.is_empty() {
        println!("\nNothing to do: every URL is already in the archive.");
        return Ok(());
    }

    let tool = config.yt_dlp_tool();
    let options = config.download_options();
    let summary = coordinator.run(plan, |_| YtDlp::new(tool.clone(), options.clone()));

    println!(
        "\nDone. {} completed, {} failed, {} skipped ({} worker(s)).",
        summary.completed, summary.failed, summary.skipped, summary.workers
    );
    Ok(())
}

fn channel(config: &mut Config, args: &ChannelArgs) -> Result<()> {
    args.credentials.apply(config);

    let network = &config.network;
    if network.browser.is_none() {
        if let Some(cookies) = &network.cookies {
            if !cookies.is_file() {
                return Err(ArchiverError::CredentialsNotFound(cookies.clone()).into());
            }
        }
    }

    println!("Extracting video URLs from: {}", args.channel);
    match (&network.browser, &network.cookies) {
        (Some(browser), _) => println!("  Cookies:    {} browser", browser),
        (None, Some(cookies)) => println!("  Cookies:    {}", cookies.display()),
        (None, None) => println!("  Cookies:    none"),
    }
    if args.max_count > 0 {
        println!("  Max videos: {}", args.max_count);
    }

    let query = ChannelQuery {
        cookies: network.cookies.clone(),
        browser: network.browser.clone(),
        proxy: network.proxy.clone(),
        max_count: args.max_count,
    };
    let urls = list_channel_videos(&config.yt_dlp_tool(), &args.channel, &query)?;

    if urls.is_empty() {
        println!("No videos found.");
        std::process::exit(1);
    }

    let mut content = urls.join("\n");
    content.push('\n');
    fs_err::write(&args.output, content).context("Failed to write URL list")?;

    println!("Found {} video(s). Written to {}", urls.len(), args.output.display());
    Ok(())
}

fn warn_missing_tools(config: &Config) {
    // Non-fatal: every item will fail on its own if a tool really is missing.
    let missing = utils::check_dependencies(&config.tools.yt_dlp, config.tools.ffmpeg_location.as_deref());
    if !missing.is_empty() {
        eprintln!("⚠️  Dependency check warnings:");
        for dep in missing {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - tools may be available)");
    }
}

fn print_banner(config: &Config, total: usize, skipped: usize) {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let download = &config.download;

    println!("Found {} URL(s)", total);
    if skipped > 0 {
        println!("  Skipped:   {} already in archive", skipped);
    }
    println!("  Format:    {} @ {}kbps", download.format, download.quality);
    println!("  Output:    {}/", download.output_dir.display());
    println!("  Threads:   {}", download.threads);
    println!("  Metadata:  {}", yes_no(download.metadata));
    println!("  Thumbnail: {}", yes_no(download.thumbnail));
    println!("  Lyrics:    {}", yes_no(download.lyrics));
    println!("  Archive:   {}", yes_no(download.archive));
    if let Some(proxy) = &config.network.proxy {
        println!("  Proxy:     {}", mask_proxy_password(proxy));
    }
    if let Some(rate) = config.network.limit_rate {
        println!("  Rate limit: {} bytes/s", rate);
    }
    println!();
}
