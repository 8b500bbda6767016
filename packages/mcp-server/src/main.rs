#!/usr/bin/env -S cargo run --bin shellbox-mcp --

use anyhow::Result;
use clap::Parser;
use serde_json::Value;
use shellbox_config::ShellboxConfig;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod context;
mod mcp;
mod tools;

#[cfg(test)]
mod tests;

use context::ToolContext;
use mcp::*;
use tools::{tool_definitions, tools_call, tools_list};

#[derive(Parser)]
#[command(name = "shellbox-mcp")]
#[command(about = "Shellbox MCP Server - session-scoped command execution in a sandbox container")]
#[command(version)]
struct Cli {
    #[arg(long, help = "Enable MCP server mode (default behavior)")]
    mcp: bool,
    #[arg(long, help = "Display available tools")]
    tools: bool,
}

async fn handle_rpc_request(
    method: &str,
    params: Option<Value>,
    context: &ToolContext,
) -> Result<Value> {
    match method {
        "initialize" => {
            let request = if let Some(p) = params {
                Some(serde_json::from_value(p)?)
            } else {
                None
            };
            let result = initialize(request).await?;
            Ok(serde_json::to_value(result)?)
        }
        "ping" => {
            let result = ping(params).await?;
            Ok(result)
        }
        "tools/list" => {
            let request = if let Some(p) = params {
                Some(serde_json::from_value(p)?)
            } else {
                None
            };
            let result = tools_list(request, context).await?;
            Ok(serde_json::to_value(result)?)
        }
        "tools/call" => {
            let request = if let Some(p) = params {
                Some(serde_json::from_value(p)?)
            } else {
                None
            };
            let result = tools_call(request, context).await?;
            Ok(serde_json::to_value(result)?)
        }
        _ => Err(anyhow::anyhow!("Unknown method: {}", method)),
    }
}

/// Handle one line of input, returning the response line if one is owed.
async fn handle_line(line: &str, context: &ToolContext) -> Option<Value> {
    let request: Value = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!("Unparseable request: {}", e);
            return Some(error_response(None, PARSE_ERROR, format!("Parse error: {}", e)));
        }
    };

    let id = request.get("id");
    let method = match request.get("method").and_then(|m| m.as_str()) {
        Some(method) => method,
        None => {
            return Some(error_response(id, INVALID_REQUEST, "Missing method"));
        }
    };

    // Notifications don't require responses
    if method.starts_with("notifications/") {
        debug!("Notification: {}", method);
        return None;
    }

    let params = request.get("params").cloned();
    match handle_rpc_request(method, params, context).await {
        Ok(result) => Some(success_response(id, result)),
        Err(e) => {
            let code = match method {
                "initialize" | "ping" | "tools/list" | "tools/call" => INVALID_PARAMS,
                _ => METHOD_NOT_FOUND,
            };
            Some(error_response(id, code, e.to_string()))
        }
    }
}

/// Resolves once the process is asked to shut down
fn shutdown_signal() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();

    #[cfg(unix)]
    std::thread::spawn(move || {
        use signal_hook::{
            consts::{SIGINT, SIGTERM},
            iterator::Signals,
        };
        match Signals::new([SIGINT, SIGTERM]) {
            Ok(mut signals) => {
                if signals.forever().next().is_some() {
                    let _ = tx.send(());
                }
            }
            Err(e) => error!("Failed to install signal handler: {}", e),
        }
    });

    #[cfg(windows)]
    {
        let tx = std::sync::Mutex::new(Some(tx));
        if let Err(e) = ctrlc::set_handler(move || {
            if let Some(tx) = tx.lock().ok().and_then(|mut tx| tx.take()) {
                let _ = tx.send(());
            }
        }) {
            error!("Failed to install Ctrl-C handler: {}", e);
        }
    }

    rx
}

async fn serve(context: ToolContext) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let signal = shutdown_signal();
    let shutdown = async move {
        // A dropped sender means no handler was installed; run until stdin closes
        if signal.await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
        };

        if line.trim().is_empty() {
            continue;
        }
        debug!("Received: {}", line);

        if let Some(response) = handle_line(&line, &context).await {
            let mut out = serde_json::to_string(&response)?;
            out.push('\n');
            stdout.write_all(out.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ShellboxConfig::from_env()?;

    if cli.tools {
        println!("Available tools:");
        for tool in tool_definitions(&config.cli_program) {
            println!(
                "- {}: {}",
                tool.name,
                tool.description.unwrap_or_default()
            );
        }
        return Ok(());
    }

    // Default behavior is to start the MCP server
    let context = ToolContext::from_config(&config).await?;
    info!(
        "Serving sessions against container {} (state at {})",
        config.container_name,
        config.database_path.display()
    );

    let reaper = config
        .actor_idle_timeout
        .map(|idle| context.registry().spawn_idle_reaper(idle));

    let result = serve(context).await;
    if let Some(reaper) = reaper {
        reaper.abort();
    }
    result
}
