use std::io::{self, BufRead, Write};

use resultsd::config::Config;
use resultsd::ipc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging(filter: &str) {
    // stdout carries responses, so logs go to stderr.
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("resultsd=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_logging(&config.log_filter);

    let registry = match config.load_registry() {
        Ok(r) => r,
        Err(e) => {
            error!(error = ?e, "subject registry could not be loaded");
            return Err(e);
        }
    };
    info!(
        version = env!("CARGO_PKG_VERSION"),
        classes = registry.classes().count(),
        "resultsd starting"
    );

    let mut state = ipc::AppState::new(registry);
    if let Some(ws) = config.workspace.clone() {
        if let Err(e) = ipc::select_workspace(&mut state, ws) {
            warn!(error = ?e, "startup workspace not opened");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let _ = writeln!(stdout, "{}", ipc::bad_json(e.to_string()));
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("resultsd exiting");
    Ok(())
}
