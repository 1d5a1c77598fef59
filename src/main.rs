use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use review_console::api::{Endpoints, HttpPortalApi};
use review_console::logs::{PaginatedLogList, DEFAULT_PAGE_SIZE};
use review_console::model::{SessionId, VerificationMethod};
use review_console::selection::{MatchSelection, ReviewForm};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "stream")]
mod websocket;

mod view;
mod worker;

use worker::{PortalShell, ShellCommand, ShellEvent, ShellSettings};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    portal: PortalArgs,

    /// How verbose the output should be, can be set up to 3 times. Has no effect if RUST_LOG is set
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to write a JSON log to
    #[arg(short, long, global = true)]
    log_path: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
struct PortalArgs {
    /// Base URL of the review portal
    #[arg(long, env = "REVIEW_CONSOLE_BASE_URL", default_value = "http://localhost:5000", global = true)]
    base_url: String,

    /// Path of the emergency status endpoint
    #[arg(long, env = "REVIEW_CONSOLE_STATUS_PATH", global = true)]
    status_path: Option<String>,

    /// Path of the pending review count endpoint
    #[arg(long, env = "REVIEW_CONSOLE_COUNT_PATH", global = true)]
    count_path: Option<String>,

    /// Path of the paginated review listing
    #[arg(long, env = "REVIEW_CONSOLE_LOGS_PATH", global = true)]
    logs_path: Option<String>,
}

impl PortalArgs {
    fn endpoints(&self) -> Endpoints {
        let mut endpoints = Endpoints::new(&self.base_url);
        if let Some(path) = &self.status_path {
            endpoints.emergency_status = path.clone();
        }
        if let Some(path) = &self.count_path {
            endpoints.pending_count = path.clone();
        }
        if let Some(path) = &self.logs_path {
            endpoints.pending_logs = path.clone();
        }
        endpoints
    }
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Mount the emergency banner and pending badge and follow them.
    /// Type `hide`/`show` to toggle page visibility, `refresh` to refetch the count, `q` to quit
    Watch {
        /// Emergency status poll interval in milliseconds
        #[arg(long, env = "REVIEW_CONSOLE_STATUS_INTERVAL_MS", default_value_t = 5000, value_parser = clap::value_parser!(u64).range(1..))]
        status_interval_ms: u64,

        /// Pending count poll interval in milliseconds
        #[arg(long, env = "REVIEW_CONSOLE_COUNT_INTERVAL_MS", default_value_t = 30_000, value_parser = clap::value_parser!(u64).range(1..))]
        count_interval_ms: u64,

        /// Host a websocket server that streams banner and badge updates
        #[cfg(feature = "stream")]
        #[arg(short, long)]
        stream: bool,

        /// Port to listen on for the websocket server, defaults to 23313
        #[cfg(feature = "stream")]
        #[arg(short = 'p', long, default_value_t = 23313)]
        websocket_port: u16,
    },

    /// Print pending log cards
    Logs {
        /// Records per page
        #[arg(long, env = "REVIEW_CONSOLE_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE, value_parser = clap::value_parser!(u32).range(1..))]
        page_size: u32,

        /// How many pages to load
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..), conflicts_with = "all")]
        pages: u32,

        /// Keep loading until the portal reports no more pages
        #[arg(long)]
        all: bool,

        /// Print the records as JSON instead of cards
        #[arg(long)]
        json: bool,
    },

    /// Approve a pending review
    Approve {
        session_id: String,

        /// Verification method of the session, face-only reviews require --employee
        #[arg(long)]
        method: Option<String>,

        /// Matches offered on the detail page, defaults to just --employee
        #[arg(long, value_delimiter = ',')]
        options: Vec<String>,

        /// Employee match to approve the session for
        #[arg(long)]
        employee: Option<String>,
    },

    /// Deny a pending review
    Deny { session_id: String },

    /// Reset the portal's emergency state
    ResetEmergency,

    /// Open a review's detail page in the browser
    Open { session_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let old_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        old_hook(panic_info);
        error!("Backtrace: {:#?}", backtrace);
    }));

    let args = Args::parse();

    tracing_init(&args)?;

    debug!(?args);

    let api = Arc::new(HttpPortalApi::new(args.portal.endpoints()));
    info!(base_url = %api.endpoints().base_url, "using review portal");

    match args.command {
        Command::Watch {
            status_interval_ms,
            count_interval_ms,
            #[cfg(feature = "stream")]
            stream,
            #[cfg(feature = "stream")]
            websocket_port,
        } => {
            let settings = ShellSettings {
                status_interval: Duration::from_millis(status_interval_ms),
                count_interval: Duration::from_millis(count_interval_ms),
            };
            #[cfg(feature = "stream")]
            let port = stream.then_some(websocket_port);
            #[cfg(not(feature = "stream"))]
            let port = None;
            watch(api, settings, port).await
        }
        Command::Logs {
            page_size,
            pages,
            all,
            json,
        } => logs(api, page_size, if all { None } else { Some(pages) }, json).await,
        Command::Approve {
            session_id,
            method,
            options,
            employee,
        } => {
            let method = method.map(VerificationMethod::from);
            let options = if options.is_empty() {
                employee.iter().cloned().collect()
            } else {
                options
            };
            let mut selection = MatchSelection::new(options);
            if let Some(employee) = &employee {
                selection.select(employee)?;
            }
            let form = ReviewForm::approve(SessionId::new(session_id), method.as_ref(), &selection)?;
            api.submit_review(&form).await?;
            info!(session = %form.session_id(), "review approved");
            Ok(())
        }
        Command::Deny { session_id } => {
            let form = ReviewForm::deny(SessionId::new(session_id));
            api.submit_review(&form).await?;
            info!(session = %form.session_id(), "review denied");
            Ok(())
        }
        Command::ResetEmergency => {
            let status = api.reset_emergency().await?;
            info!(active = status.active, "emergency state reset");
            Ok(())
        }
        Command::Open { session_id } => {
            let session_id = SessionId::new(session_id);
            let url = api
                .endpoints()
                .detail_url(&session_id)
                .ok_or_else(|| eyre!("session id {session_id:?} cannot be used in a URL"))?;
            info!(%url, "opening review details");
            open::that(&url).wrap_err_with(|| format!("failed to open {url}"))
        }
    }
}

async fn watch(api: Arc<HttpPortalApi>, settings: ShellSettings, websocket_port: Option<u16>) -> Result<()> {
    #[cfg(feature = "stream")]
    let client = match websocket_port {
        Some(port) => {
            let (client, _handle) = websocket::start_websocket_server(port)
                .await
                .wrap_err("failed to start websocket server")?;
            Some(client)
        }
        None => None,
    };
    #[cfg(not(feature = "stream"))]
    let _ = websocket_port;

    let shell = PortalShell::mount(api, settings);
    let mut events = Box::pin(shell.events());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    info!("watching, type `hide`, `show`, `refresh` or `q`");

    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else { break };
                match event {
                    ShellEvent::Banner(active) => match view::render_banner(active) {
                        Some(banner) => println!("{banner}"),
                        None => println!("emergency cleared"),
                    },
                    ShellEvent::PendingCount(count) => println!("{}", view::render_badge(count)),
                }
                #[cfg(feature = "stream")]
                if let Some(client) = &client {
                    websocket::broadcast_event(client, event).await;
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => match ShellCommand::parse(&line) {
                        Some(ShellCommand::Quit) => break,
                        Some(command) => shell.apply(command).await,
                        None if line.trim().is_empty() => {}
                        None => warn!(%line, "unknown command"),
                    },
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!(%e, "failed to read stdin");
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    shell.unmount();
    Ok(())
}

async fn logs(api: Arc<HttpPortalApi>, page_size: u32, pages: Option<u32>, json: bool) -> Result<()> {
    let endpoints = api.endpoints().clone();
    let mut list = PaginatedLogList::with_page_size(api, page_size);

    if let Err(e) = list.load_pages(pages).await {
        error!(%e, "could not load pending logs");
    }

    if json {
        serde_json::to_writer_pretty(io::stdout(), list.records())?;
        println!();
    } else {
        for record in list.records() {
            println!("{}", view::render_card(record, &endpoints));
        }
        if let Some(footer) = view::render_list_footer(&list) {
            println!("{footer}");
        }
    }

    match list.last_error() {
        Some(e) => Err(eyre!(e.clone())),
        None => Ok(()),
    }
}

fn tracing_init(args: &Args) -> Result<()> {
    tracing_log::LogTracer::init()?;

    fn env_filter(args: &Args) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(
                match args.verbose {
                    0 => "review_console=info",
                    1 => "info",
                    2 => "debug",
                    _ => "trace",
                }
                .parse()
                .unwrap_or_else(|_| LevelFilter::INFO.into()),
            )
            .from_env_lossy()
    }

    let stderr_log = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(io::stderr)
        .with_filter(env_filter(args));

    let file_log = match &args.log_path {
        Some(log_path) => {
            let log_file = File::create(log_path)
                .wrap_err_with(|| format!("failed to create log file {}", log_path.display()))?;
            let file_log = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(Mutex::new(log_file))
                .with_filter(LevelFilter::TRACE);
            Some(file_log)
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry().with(stderr_log).with(file_log);

    tracing::subscriber::set_global_default(subscriber).wrap_err("unable to set up logging")
}
