//! # Purgecast Entry Point
//!
//! Starts the request broadcaster: load the cache configuration, warm the
//! connection pools, spawn the worker pool and serve the broadcast handler.
//!
//! ## Usage
//!
//! ```bash
//! # Serve on the default port with the default configuration path
//! purgecast
//!
//! # Custom configuration, enforce mode and access logging to a file
//! purgecast --caches /etc/purgecast/caches.ini --enforce \
//!     --enable-log --log-file /var/log/purgecast.log
//! ```
//!
//! ## Signals
//!
//! - SIGINT/SIGTERM: graceful shutdown, exit code 0
//! - SIGHUP: reload the configuration and re-warm connections
//!
//! A configuration problem at startup is fatal (exit code 1); a configuration
//! problem during reload is logged and the previous configuration kept.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;

use purgecast_server::{lifecycle, AccessLog, HttpServer, Server, ServerConfig};

/// purgecast - fan out one HTTP request to every cache in a group
#[derive(FromArgs)]
struct Args {
    /// TCP port to bind
    #[argh(option, default = "8088")]
    port: u16,

    /// worker pool size; higher is not implicitly better
    #[argh(option, default = "8")]
    workers: usize,

    /// request retry times against a cache, should the first attempt fail
    #[argh(option, default = "1")]
    retries: u32,

    /// path to the caches configuration file (.ini or .json); --cfg is
    /// accepted as an alias
    #[argh(option, default = "\"/caches.ini\".to_string()")]
    caches: String,

    /// access log file path; stdout when empty
    #[argh(option, default = "String::new()")]
    log_file: String,

    /// respond with the first non-200 status received from a cache
    #[argh(switch)]
    enforce: bool,

    /// switch the per-request access log on
    #[argh(switch)]
    enable_log: bool,
}

/// Rewrites the `-cfg`/`--cfg` spellings of the configuration flag onto the
/// canonical `--caches` before flag parsing; argh has no native flag
/// aliasing.
///
/// # Arguments
/// * `args` - Raw command-line arguments, program name excluded
///
/// # Returns
/// The argument vector with every alias occurrence rewritten
fn canonicalize_config_flag(args: &[String]) -> Vec<&str> {
    args.iter()
        .map(|arg| match arg.as_str() {
            "-cfg" | "--cfg" => "--caches",
            other => other,
        })
        .collect()
}

/// Parses the command line, resolving the configuration-flag alias first.
///
/// # Returns
/// The parsed arguments. On `--help` or a parse error this prints argh's
/// output and exits, the way `argh::from_env` does.
fn parse_args() -> Args {
    let argv: Vec<String> = std::env::args().collect();
    let command = argv.first().map(String::as_str).unwrap_or("purgecast");
    let rest = canonicalize_config_flag(argv.get(1..).unwrap_or(&[]));

    match Args::from_args(&[command], &rest) {
        Ok(args) => args,
        Err(exit) => match exit.status {
            Ok(()) => {
                println!("{}", exit.output);
                std::process::exit(0);
            }
            Err(()) => {
                eprintln!("{}", exit.output);
                std::process::exit(1);
            }
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let access_log = if args.enable_log {
        if args.log_file.is_empty() {
            AccessLog::to_stdout()
        } else {
            let log = AccessLog::to_file(&args.log_file)
                .await
                .with_context(|| format!("failed to open log file {}", args.log_file))?;
            tracing::info!("access logging to {}", args.log_file);
            log
        }
    } else {
        AccessLog::disabled()
    };

    let config = ServerConfig {
        workers: args.workers,
        retries: args.retries,
        enforce_status: args.enforce,
        config_path: PathBuf::from(&args.caches),
    };

    tracing::info!("loading caches configuration from {}", args.caches);
    let server = Server::new(config, access_log)
        .await
        .context("failed to load caches configuration")?;

    tracing::info!("warming up connections");
    server.warm_up_all().await;

    lifecycle::spawn_reload_handler(server.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    HttpServer::new(server.clone()).run(addr).await?;

    server.close().await;
    println!("Purgecast exited successfully.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args: Args = Args::from_args(&["purgecast"], &[]).unwrap();
        assert_eq!(args.port, 8088);
        assert_eq!(args.workers, 8);
        assert_eq!(args.retries, 1);
        assert_eq!(args.caches, "/caches.ini");
        assert_eq!(args.log_file, "");
        assert!(!args.enforce);
        assert!(!args.enable_log);
    }

    #[test]
    fn test_cfg_alias_maps_to_caches() {
        let argv: Vec<String> = vec!["--cfg".to_string(), "/tmp/c.ini".to_string()];
        let rest = canonicalize_config_flag(&argv);
        let args: Args = Args::from_args(&["purgecast"], &rest).unwrap();
        assert_eq!(args.caches, "/tmp/c.ini");
    }

    #[test]
    fn test_single_dash_cfg_alias_maps_to_caches() {
        let argv: Vec<String> = vec!["-cfg".to_string(), "/etc/purgecast/caches.json".to_string()];
        let rest = canonicalize_config_flag(&argv);
        let args: Args = Args::from_args(&["purgecast"], &rest).unwrap();
        assert_eq!(args.caches, "/etc/purgecast/caches.json");
    }

    #[test]
    fn test_alias_rewrite_passes_other_flags_through() {
        let argv: Vec<String> = vec![
            "--port".to_string(),
            "9090".to_string(),
            "--cfg".to_string(),
            "/tmp/c.ini".to_string(),
        ];
        let rest = canonicalize_config_flag(&argv);
        assert_eq!(rest, vec!["--port", "9090", "--caches", "/tmp/c.ini"]);
    }

    #[test]
    fn test_flags_parse() {
        let args: Args = Args::from_args(
            &["purgecast"],
            &[
                "--port", "9090",
                "--workers", "4",
                "--retries", "2",
                "--caches", "/etc/purgecast/caches.json",
                "--log-file", "/tmp/purgecast.log",
                "--enforce",
                "--enable-log",
            ],
        )
        .unwrap();
        assert_eq!(args.port, 9090);
        assert_eq!(args.workers, 4);
        assert_eq!(args.retries, 2);
        assert_eq!(args.caches, "/etc/purgecast/caches.json");
        assert_eq!(args.log_file, "/tmp/purgecast.log");
        assert!(args.enforce);
        assert!(args.enable_log);
    }
}
