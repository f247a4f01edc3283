use std::env;
use std::io;
use std::process::ExitCode;

use loyalty_ledger::csv::{read_commands, write_customers};
use loyalty_ledger::store::FileStore;
use loyalty_ledger::{Ledger, TierTable};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Namespace the ledger state is saved under in the state directory.
const NAMESPACE: &str = "loyalty-ledger";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: loyalty-ledger <commands.csv> [state-dir]");
        return ExitCode::from(2);
    };
    let state_dir = args.next();

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    let mut store = match state_dir.as_deref().map(FileStore::open).transpose() {
        Ok(store) => store,
        Err(e) => {
            error!("failed to open state directory: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut ledger = match &store {
        Some(store) => match Ledger::load(store, NAMESPACE, TierTable::default()) {
            Ok(ledger) => ledger,
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => Ledger::new(),
    };

    let commands = match read_commands(path) {
        Ok(commands) => commands,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let (command_sender, command_receiver) = tokio::sync::mpsc::channel(16);

    let reader = tokio::spawn(async move {
        for result in commands {
            match result {
                Ok(command) => {
                    if command_sender.send(command).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    ledger.run(ReceiverStream::new(command_receiver)).await;
    if let Err(e) = reader.await {
        error!("command reader failed: {e}");
        return ExitCode::FAILURE;
    }

    if let Some(store) = store.as_mut() {
        if let Err(e) = ledger.save(store, NAMESPACE) {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    }

    if let Err(e) = write_customers(io::stdout().lock(), ledger.customers()) {
        error!("failed to write customers: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
