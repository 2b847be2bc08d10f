mod analytics;
mod bulk;
mod config;
mod db;
mod error;
mod ipc;
mod logging;
mod model;
mod reconcile;
mod store;

use log::{info, warn};
use std::io::{self, BufRead, Write};

fn write_line(stdout: &mut io::Stdout, resp: &serde_json::Value) {
    let line = serde_json::to_string(resp)
        .unwrap_or_else(|_| "{\"ok\":false,\"error\":{\"code\":\"serialize_failed\",\"message\":\"response not serializable\"}}".to_string());
    let _ = writeln!(stdout, "{}", line);
    let _ = stdout.flush();
}

fn main() {
    let cfg = config::DaemonConfig::from_env();
    if let Err(e) = logging::init_logging(&cfg.log_level, cfg.log_dir.as_deref()) {
        eprintln!("attendanced: logging disabled: {}", e);
    }

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };
    if let Some(path) = cfg.workspace.as_deref() {
        if let Err(e) = ipc::select_workspace(&mut state, path) {
            warn!("event=workspace_open status=error source=env err={:?}", e);
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!("event=bad_json err={}", e);
                write_line(&mut stdout, &ipc::bad_json(e.to_string()));
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        write_line(&mut stdout, &resp);
    }
    info!("event=daemon_stop");
}
