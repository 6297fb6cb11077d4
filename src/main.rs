use std::io::{self, stdout, Stdout};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use crossbeam_channel::{Receiver, TryRecvError};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::{backend::CrosstermBackend, Terminal};
use serde_json::{Map, Value};

use casewatch::actions;
use casewatch::actors::StatusPoller;
use casewatch::app::LogicThread;
use casewatch::case::{Case, CaseId, CaseUpdate, NewCase};
use casewatch::client::{CaseService, HttpCaseService};
use casewatch::config::Config;
use casewatch::render::RenderState;
use casewatch::store::{MemoryStore, StoreEvent};
use casewatch::util::{truncate, with_timeout};
use casewatch::variables::variable_rows;
use casewatch::{cwlog, ui, Error, Result};

const FRAME_DURATION: Duration = Duration::from_micros(16_666); // 60fps

/// casewatch - watch and drive model cases on a case service
#[derive(Parser, Debug)]
#[command(name = "casewatch")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    CASEWATCH_DEBUG=1     Enable debug logging (alternative to --debug)\n    CASEWATCH_API_URL     Service base URL\n    CASEWATCH_SITE        Active site")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.casewatch/casewatch.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Base URL of the case service API
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Active site
    #[arg(long, global = true)]
    pub site: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List the cases of the active site
    List,

    /// Show one or more cases with their variables
    Show {
        #[arg(required = true)]
        ids: Vec<CaseId>,
    },

    /// Trigger a run of a case
    Run { id: CaseId },

    /// Download the results archive of a case
    Download {
        id: CaseId,

        /// Target directory (defaults to download_dir from the config)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Delete a case
    Delete {
        id: CaseId,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Create a case on the active site
    Create {
        #[arg(long)]
        name: String,

        /// Case variable as KEY=VALUE (VALUE parsed as JSON when possible)
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, Value)>,
    },

    /// Rename a case or change its variables
    Edit {
        id: CaseId,

        #[arg(long)]
        name: Option<String>,

        /// Variable to set as KEY=VALUE; other variables are kept
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, Value)>,
    },

    /// Poll a case and print a JSON line per change until it settles
    Watch {
        id: CaseId,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

fn parse_var(s: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{}'", s));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    config.apply_overrides(cli.api_url.clone(), cli.site.clone());
    casewatch::log::init(&config, cli.debug);

    match cli.command {
        Some(Command::List) => return run_list(&config),
        Some(Command::Show { ids }) => return run_show(&config, ids),
        Some(Command::Run { id }) => return run_run(&config, id),
        Some(Command::Download { id, out }) => return run_download(&config, id, out),
        Some(Command::Delete { id, yes }) => return run_delete(&config, id, yes),
        Some(Command::Create { name, vars }) => return run_create(&config, name, vars),
        Some(Command::Edit { id, name, vars }) => return run_edit(&config, id, name, vars),
        Some(Command::Watch { id, timeout }) => return run_watch(&config, id, timeout),
        None => {
            // No subcommand: launch TUI
        }
    }

    cwlog!(
        "casewatch starting: api={} site={:?} level={}",
        config.api_url(),
        config.site,
        casewatch::log::level().as_str()
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let (state_tx, state_rx) = crossbeam_channel::bounded::<RenderState>(1);

    let shutdown_clone = shutdown.clone();
    let logic_handle =
        thread::spawn(move || LogicThread::run(config, state_tx, shutdown_clone));

    let mut terminal = setup_terminal()?;
    let result = render_loop(&mut terminal, state_rx, &shutdown);

    shutdown.store(true, Ordering::SeqCst);
    let logic_result = logic_handle
        .join()
        .map_err(|_| Error::TaskJoin("logic thread panicked".to_string()));
    restore_terminal(&mut terminal)?;
    result?;
    logic_result?
}

fn http_service(config: &Config) -> Result<Arc<HttpCaseService>> {
    Ok(Arc::new(HttpCaseService::from_config(config)?))
}

fn require_site(config: &Config) -> Result<String> {
    config.site.clone().ok_or(Error::NoActiveSite)
}

fn run_list(config: &Config) -> Result<()> {
    let site = require_site(config)?;
    let service = http_service(config)?;
    let rt = tokio::runtime::Runtime::new()?;
    let cases = rt.block_on(service.list_cases(&site))?;

    if cases.is_empty() {
        println!("No cases on site '{}'.", site);
        return Ok(());
    }

    println!(
        "{:<6}  {:<24}  {:<10}  {:<9}  {:<9}",
        "ID", "NAME", "STATUS", "CREATE", "RUN"
    );
    for case in &cases {
        println!(
            "{:<6}  {:<24}  {:<10}  {:<9}  {:<9}",
            case.id.to_string(),
            truncate(case.display_name(), 24),
            truncate(case.status.as_str(), 10),
            case.create_task.label(),
            case.run_task.label()
        );
    }
    Ok(())
}

fn run_show(config: &Config, ids: Vec<CaseId>) -> Result<()> {
    let service = http_service(config)?;
    let rt = tokio::runtime::Runtime::new()?;
    let results = rt.block_on(futures::future::join_all(
        ids.iter().map(|id| service.get_case(*id)),
    ));

    let mut first_error = None;
    for (id, result) in ids.iter().zip(results) {
        match result {
            Ok(case) => print_case(config, &case),
            Err(e) => {
                eprintln!("case {}: {}", id, e);
                first_error.get_or_insert(e);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

fn print_case(config: &Config, case: &Case) {
    println!("Case {}", case.id);
    println!("  Name:     {}", case.display_name());
    println!("  Status:   {}", case.status);
    println!("  Create:   {}", case.create_task.label());
    if let Some(ref error) = case.create_task.error {
        println!("            {}", error);
    }
    println!("  Run:      {}", case.run_task.label());
    if let Some(ref error) = case.run_task.error {
        println!("            {}", error);
    }
    if let Some(created) = case.date_created {
        println!("  Created:  {}", created.format("%Y-%m-%d %H:%M UTC"));
    }
    println!("  Res:      {}", case.res.as_deref().unwrap_or("-"));
    println!("  Compset:  {}", case.compset.as_deref().unwrap_or("-"));

    let rows = variable_rows(&config.variables, &case.variables);
    if !rows.is_empty() {
        println!("  Variables:");
        for row in rows {
            println!("    {:<24} {}", row.label, row.value);
        }
    }
    println!();
}

fn run_run(config: &Config, id: CaseId) -> Result<()> {
    let service = http_service(config)?;
    let (store, _events) = MemoryStore::new(config.site.clone(), Vec::new());
    let rt = tokio::runtime::Runtime::new()?;
    let case = rt.block_on(actions::run_case(service.as_ref(), &store, id))?;
    println!("Case {} is now {}", case.id, case.status);
    Ok(())
}

fn run_download(config: &Config, id: CaseId, out: Option<PathBuf>) -> Result<()> {
    let dir = match out {
        Some(dir) => dir,
        None => config.download_dir()?,
    };
    let service = http_service(config)?;
    let rt = tokio::runtime::Runtime::new()?;
    let path = rt.block_on(actions::download_case(service.as_ref(), id, &dir))?;
    println!("Saved {}", path.display());
    Ok(())
}

fn run_delete(config: &Config, id: CaseId, skip_confirm: bool) -> Result<()> {
    cwlog!("Delete command: id={}, yes={}", id, skip_confirm);

    if !skip_confirm {
        print!("Delete case {}? [y/N] ", id);
        std::io::Write::flush(&mut std::io::stdout())?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input != "y" && input != "yes" {
            println!("Delete cancelled.");
            return Ok(());
        }
    }

    let service = http_service(config)?;
    let (store, _events) = MemoryStore::new(config.site.clone(), Vec::new());
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(actions::delete_case(service.as_ref(), &store, id))?;
    println!("Deleted case {}", id);
    Ok(())
}

fn run_create(config: &Config, name: String, vars: Vec<(String, Value)>) -> Result<()> {
    let site = require_site(config)?;
    let request = NewCase {
        site: site.clone(),
        name,
        variables: vars.into_iter().collect(),
    };

    let service = http_service(config)?;
    let (store, _events) = MemoryStore::new(Some(site), Vec::new());
    let rt = tokio::runtime::Runtime::new()?;
    let case = rt.block_on(actions::create_case(service.as_ref(), &store, &request))?;
    println!("Created case {} ({})", case.id, case.status);
    Ok(())
}

/// Variables given on the command line are merged over `current`.
fn edit_request(
    current: Option<&Map<String, Value>>,
    name: Option<String>,
    vars: Vec<(String, Value)>,
) -> CaseUpdate {
    let variables = (!vars.is_empty()).then(|| {
        let mut merged = current.cloned().unwrap_or_default();
        merged.extend(vars);
        merged
    });
    CaseUpdate { name, variables }
}

fn run_edit(config: &Config, id: CaseId, name: Option<String>, vars: Vec<(String, Value)>) -> Result<()> {
    let service = http_service(config)?;
    let (store, _events) = MemoryStore::new(config.site.clone(), Vec::new());
    let rt = tokio::runtime::Runtime::new()?;
    let case = rt.block_on(async {
        let current = if vars.is_empty() {
            None
        } else {
            Some(service.get_case(id).await?.variables)
        };
        let update = edit_request(current.as_ref(), name, vars);
        actions::update_case(service.as_ref(), &store, id, &update).await
    })?;
    println!("Case {} is now '{}'", case.id, case.display_name());
    Ok(())
}

/// Headless poller: one JSON line for the starting snapshot and one per
/// reconciliation, until the case settles.
fn run_watch(config: &Config, id: CaseId, timeout: Option<u64>) -> Result<()> {
    let site = require_site(config)?;
    let service = http_service(config)?;
    let rt = tokio::runtime::Runtime::new()?;
    let interval = config.poll_interval();

    let watch = async move {
        let case = service.get_case(id).await?;
        println!("{}", serde_json::to_string(&case)?);
        if case.is_settled() {
            return Ok(());
        }

        let (store, mut events) = MemoryStore::new(Some(site), vec![case.clone()]);
        let mut poller =
            StatusPoller::new(case, service, Arc::new(store)).with_interval(interval);
        poller.start();

        while let Some(event) = events.recv().await {
            if let StoreEvent::UpdateSelectedSiteCase { case } = event {
                println!("{}", serde_json::to_string(&case)?);
                if case.is_settled() {
                    break;
                }
            }
        }
        poller.stop();
        Ok::<(), Error>(())
    };

    rt.block_on(async {
        match timeout {
            Some(secs) => with_timeout(Duration::from_secs(secs), watch).await,
            None => watch.await,
        }
    })
}

fn render_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    state_rx: Receiver<RenderState>,
    shutdown: &AtomicBool,
) -> Result<()> {
    let mut state = RenderState::default();
    let mut last_version: u64 = 0;
    let mut last_frame = Instant::now();
    let mut dirty = true;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match state_rx.try_recv() {
            Ok(s) => {
                dirty = dirty || s.version != last_version;
                state = s;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }

        if last_frame.elapsed() < FRAME_DURATION {
            thread::sleep(Duration::from_micros(500));
            continue;
        }
        last_frame = Instant::now();

        if dirty {
            terminal.draw(|f| ui::draw(f, &state))?;
            last_version = state.version;
            dirty = false;
        }
    }
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    execute!(io::stdout(), EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.hide_cursor()?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;
    Ok(disable_raw_mode()?)
}
