//! slot-runtime entry point.
//!
//! ## CLI Subcommands
//!
//! - `slot-runtime` or `slot-runtime serve` - Run the HTTP server (default)
//! - `slot-runtime config` - Print the effective configuration as JSON
//! - `slot-runtime version` - Print the version
//! - `slot-runtime help [COMMAND]` - Show usage

use std::process::ExitCode;
use std::sync::Arc;

use slot_runtime::config::{self as runtime_config, EnvConfig};
use slot_runtime::engine::{InferenceBackend, MockBackend};
use slot_runtime::telemetry::init_logging;
use slot_runtime::{http, Runtime, RuntimeConfig};

/// Exit code for configuration errors.
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    match command {
        "serve" | "" => {
            let config = match runtime_config::load() {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Configuration error: {}", e);
                    return ExitCode::from(EXIT_CONFIG);
                }
            };
            if let Err(e) = init_logging(&config.log) {
                eprintln!("Logging error: {}", e);
                return ExitCode::from(EXIT_CONFIG);
            }
            let backend = match select_backend(&config.backend) {
                Some(backend) => backend,
                None => {
                    eprintln!("Unknown backend: {} (available: mock)", config.backend);
                    return ExitCode::from(EXIT_CONFIG);
                }
            };
            match run_server(config, backend).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Server error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        "config" => match runtime_config::load() {
            Ok(config) => match serde_json::to_string_pretty(&config.effective_config()) {
                Ok(json) => {
                    println!("{}", json);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Failed to render configuration: {}", e);
                    ExitCode::FAILURE
                }
            },
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                ExitCode::from(EXIT_CONFIG)
            }
        },
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("slot-runtime {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn select_backend(name: &str) -> Option<Arc<dyn InferenceBackend>> {
    match name {
        "mock" => Some(Arc::new(MockBackend::new())),
        _ => None,
    }
}

async fn run_server(config: EnvConfig, backend: Arc<dyn InferenceBackend>) -> std::io::Result<()> {
    let runtime = Arc::new(Runtime::new(RuntimeConfig::from(&config), backend));
    http::serve(runtime, config.bind).await?;
    tracing::info!("server stopped");
    Ok(())
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "slot-runtime - on-demand chat, image and vision model slots v{}

USAGE:
    slot-runtime [COMMAND]

COMMANDS:
    serve        Run the HTTP server (default when no command given)
    config       Print the effective configuration as JSON
    version      Show version information
    help         Show this help message

ENVIRONMENT:
    SLOT_RUNTIME_CONFIG              TOML config file
    SLOT_RUNTIME_BIND                Listen address (default: 0.0.0.0:8000)
    SLOT_RUNTIME_LOAD_TIMEOUT        Load timeout in seconds, 0 disables (default: 1800)
    SLOT_RUNTIME_MAX_PENDING_LOADS   Queued loads per slot (default: 16)
    SLOT_RUNTIME_STREAM_BUFFER       Chat stream buffer in chunks (default: 16)
    SLOT_RUNTIME_DEFAULT_MAX_TOKENS  Chat budget when max_length is omitted (default: 2048)
    SLOT_RUNTIME_SHUTDOWN_TIMEOUT    Drain timeout in seconds (default: 30)
    SLOT_RUNTIME_LOG_FORMAT          json or pretty (default: pretty)
    SLOT_RUNTIME_LOG_LEVEL           Log filter (default: info)
    SLOT_RUNTIME_BACKEND             Inference backend (default: mock)

EXIT CODES:
    0  Success
    1  Failure
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "serve" => {
            eprintln!(
                "slot-runtime serve - Run the HTTP server

USAGE:
    slot-runtime serve

DESCRIPTION:
    Starts the HTTP API. Models are loaded on demand through
    POST /api/load-model and polled through GET /api/model-status.
    Ctrl-C stops accepting requests, cancels live chat streams and
    drains in-flight requests before exiting.
"
            );
        }
        "config" => {
            eprintln!(
                "slot-runtime config - Show configuration

USAGE:
    slot-runtime config

DESCRIPTION:
    Prints the configuration the server would start with, after
    layering the config file and environment variables.
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'slot-runtime help' for general usage.",
                command
            );
        }
    }
}
