mod mcp;

use clap::{Parser, Subcommand};
use eoka::Browser;
use eoka_watch::{
    select_action, Config, CurrentItem, Ledger, Maintenance, Orchestrator, PageSurface,
    SystemClock, Watcher,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "eoka-watch")]
#[command(about = "Watch a single-page app and act once per item")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Open the target page and watch it until Ctrl-C
    Watch {
        /// Config file
        config: PathBuf,

        /// Run in headless mode (overrides config)
        #[arg(long)]
        headless: bool,

        /// Serve maintenance commands as MCP tools on stdio
        #[arg(long)]
        mcp: bool,
    },
    /// Validate config without running
    Check {
        /// Config file
        config: PathBuf,
    },
    /// Show which action the rule table picks for a text
    Select {
        /// Config file
        config: PathBuf,

        /// Item text to evaluate
        text: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Check { config } => {
            let config = Config::load(&config)?;
            init_logging(cli.verbose, cli.quiet, false);
            print_summary(&config);
            Ok(())
        }
        Command::Select { config, text } => {
            let config = Config::load(&config)?;
            init_logging(cli.verbose, cli.quiet, false);
            let text = eoka_watch::surface::normalize_text(&text);
            match select_action(&text, &config.actions) {
                Some(def) => println!("{} ({})", def.key, def.label),
                None => println!("no action"),
            }
            Ok(())
        }
        Command::Watch {
            config,
            headless,
            mcp,
        } => {
            let mut config = Config::load(&config)?;
            if headless {
                config.browser.headless = true;
            }
            init_logging(cli.verbose, cli.quiet, config.settings.debug_log);
            watch(config, mcp).await
        }
    }
}

fn init_logging(verbose: u8, quiet: bool, debug_log: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 if debug_log => Level::DEBUG,
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    // stdout may carry the MCP transport, so logs go to stderr
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase())),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn print_summary(config: &Config) {
    let s = &config.settings;
    println!("Config valid: {}", config.name);
    println!("  Target: {}", config.target.url);
    println!("  Item id pattern: {}", config.item.id_pattern);
    println!("  Content marker: {}", config.item.content_marker);
    if let Some(ref container) = config.item.container {
        println!("  Item container: {}", container);
    }
    println!("  Actions: {}", config.actions.len());
    for def in config.actions.definitions() {
        let state = if def.enabled { "" } else { " (disabled)" };
        println!(
            "    - {}{}: include {:?}, exclude {:?}",
            def.key, state, def.include, def.exclude
        );
    }
    println!("  Delay: {}-{}ms", s.delay_min_ms, s.delay_max_ms);
    println!("  Cooldown: {}s", s.rate_limit_window_sec);
    println!(
        "  Timeouts: menu {}ms, confirm {}ms, flip {}ms (poll {}ms)",
        s.menu_wait_timeout_ms, s.confirm_wait_timeout_ms, s.wait_timeout_ms, s.poll_interval_ms
    );
}

async fn watch(config: Config, mcp: bool) -> anyhow::Result<()> {
    let stealth = eoka::StealthConfig {
        headless: config.browser.headless,
        proxy: config.browser.proxy.clone(),
        user_agent: config.browser.user_agent.clone(),
        viewport_width: config.browser.viewport.as_ref().map(|v| v.width).unwrap_or(1280),
        viewport_height: config.browser.viewport.as_ref().map(|v| v.height).unwrap_or(720),
        ..Default::default()
    };
    info!("Watching: {} ({})", config.name, config.target.url);
    let browser = Browser::launch_with_config(stealth).await?;
    let page = browser.new_page(&config.target.url).await?;
    let surface = PageSurface::new(page);

    let ledger = Arc::new(Ledger::in_memory());
    let current = Arc::new(CurrentItem::new());

    if mcp {
        let maintenance = Maintenance::new(ledger.clone(), current.clone());
        tokio::spawn(async move {
            if let Err(e) = mcp::run_server(maintenance).await {
                error!("maintenance server stopped: {}", e);
            }
        });
    }

    let orchestrator = Orchestrator::new(&surface, &config, ledger, Arc::new(SystemClock))?;
    let watcher = Watcher::new(orchestrator, &config.settings, current);
    let (tx, rx) = mpsc::channel(64);
    let poll = Duration::from_millis(config.settings.event_poll_ms);

    tokio::select! {
        res = surface.pump_events(tx, poll) => {
            if let Err(e) = res {
                error!("event source failed: {}", e);
            }
        }
        runs = watcher.run(rx) => info!("watcher finished after {} runs", runs),
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    drop(surface);
    browser.close().await?;
    Ok(())
}
