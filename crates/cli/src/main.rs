mod args;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trolley_client::{ClientError, ListApi, ListSession, LocalTransport, Poller};
use trolley_core::{ErrorKind, ListId, NewList};
use trolley_engine::{Caller, EngineError, ListService};

use crate::args::{Cli, Command};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("--owner (or TROLLEY_OWNER) is required for this command")]
    MissingOwner,

    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Engine(e) => e.kind(),
            Self::Client(e) => e.kind(),
            Self::MissingOwner => ErrorKind::Unauthorized,
            Self::Output(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Serialize)]
struct ErrorReport<'a> {
    kind: &'a str,
    message: String,
}

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_json(value: &impl Serialize) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let report = ErrorReport {
                kind: err.kind().as_str(),
                message: err.to_string(),
            };
            match serde_json::to_string(&report) {
                Ok(line) => eprintln!("{line}"),
                Err(_) => eprintln!("{err}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let caller = Caller::new(cli.owner.ok_or(CliError::MissingOwner)?);
    let service = ListService::open(&cli.db, cli.engine_config())?;
    debug!(db = %cli.db, "store opened");
    let service = Arc::new(Mutex::new(service));

    match cli.command {
        Command::Create { ref title, ref note, ref items } => {
            let new_list = NewList {
                title: title.clone(),
                note: note.clone(),
                recipe_id: None,
                items: items.iter().map(|spec| spec.0.clone()).collect(),
            };
            let snapshot = service.lock().create_list(&caller, new_list)?;
            print_json(&snapshot)
        }
        Command::Add { list, ref item } => {
            let record = service.lock().add_item(&caller, list, item.0.clone())?;
            print_json(&record)
        }
        Command::Check { list, item } | Command::Uncheck { list, item } => {
            let checked = matches!(cli.command, Command::Check { .. });
            let session = open_session(&cli, &service, caller, list).await?;
            let record = session.set_checked(item, checked).await?;
            print_json(&record)
        }
        Command::CheckAll { list } => {
            let session = open_session(&cli, &service, caller, list).await?;
            session.check_all().await?;
            print_json(&session.aggregate())
        }
        Command::Show { list } => {
            let snapshot = service.lock().snapshot(&caller, list)?;
            print_json(&snapshot)
        }
        Command::Lists => {
            let lists = service.lock().lists_for_owner(&caller)?;
            print_json(&lists)
        }
        Command::Complete { list } => {
            let record = service.lock().complete_list(&caller, list)?;
            print_json(&record)
        }
        Command::Watch { list } => watch(&cli, &service, caller, list).await,
    }
}

async fn open_session(
    cli: &Cli,
    service: &Arc<Mutex<ListService>>,
    caller: Caller,
    list_id: ListId,
) -> Result<ListSession, CliError> {
    let api: Arc<dyn ListApi> = Arc::new(LocalTransport::new(Arc::clone(service), caller));
    Ok(ListSession::open(api, list_id, cli.client_config()).await?)
}

async fn watch(
    cli: &Cli,
    service: &Arc<Mutex<ListService>>,
    caller: Caller,
    list_id: ListId,
) -> Result<(), CliError> {
    let session = open_session(cli, service, caller, list_id).await?;
    print_json(&session.aggregate())?;

    let handle = Poller::spawn(session);
    let mut aggregate = handle.aggregate();
    info!(list_id = %list_id, interval_ms = cli.poll_ms, "watching list");
    loop {
        tokio::select! {
            changed = aggregate.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *aggregate.borrow_and_update();
                print_json(&current)?;
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }
    handle.stop().await;
    Ok(())
}
