use clap::{App, Arg, ArgMatches};
use std::str::FromStr;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mandelserver::config::{MAX_PASSES, MIN_PASSES};
use mandelserver::{Server, ServerConfig, ServerError};

fn validate_range<T: FromStr + Ord>(
    s: &str,
    low: T,
    high: T,
    isnotanumber_err: &str,
    isnotinrange_err: &str,
) -> Result<(), String> {
    match T::from_str(s) {
        Ok(i) => {
            if i >= low && i <= high {
                Ok(())
            } else {
                Err(isnotinrange_err.to_string())
            }
        }
        Err(_) => Err(isnotanumber_err.to_string()),
    }
}

const CONFIG: &str = "config";
const PASSES: &str = "passes";
const ADDRESS: &str = "address";
const PORT: &str = "port";
const LOG_LEVEL: &str = "log-level";

fn args<'a>() -> ArgMatches<'a> {
    App::new("mandelserver")
        .version(env!("CARGO_PKG_VERSION"))
        .author("elf")
        .about("Progressive Mandelbrot render server")
        .arg(
            Arg::with_name(CONFIG)
                .required(false)
                .long(CONFIG)
                .short("c")
                .takes_value(true)
                .help("JSON configuration file"),
        )
        .arg(
            Arg::with_name(PASSES)
                .required(false)
                .long(PASSES)
                .short("p")
                .takes_value(true)
                .validator(|s| {
                    validate_range(
                        &s,
                        MIN_PASSES,
                        MAX_PASSES,
                        "Could not parse pass count",
                        &format!("Pass count must be between {} and {}", MIN_PASSES, MAX_PASSES),
                    )
                })
                .help("Refinement passes rendered per request"),
        )
        .arg(
            Arg::with_name(ADDRESS)
                .required(false)
                .long(ADDRESS)
                .short("a")
                .takes_value(true)
                .help("Address to listen on"),
        )
        .arg(
            Arg::with_name(PORT)
                .required(false)
                .long(PORT)
                .short("P")
                .takes_value(true)
                .validator(|s| {
                    validate_range::<u32>(
                        &s,
                        0,
                        u32::from(u16::max_value()),
                        "Could not parse port",
                        "Port must be between 0 and 65535",
                    )
                })
                .help("Port to listen on, 0 for any free port"),
        )
        .arg(
            Arg::with_name(LOG_LEVEL)
                .required(false)
                .long(LOG_LEVEL)
                .short("l")
                .takes_value(true)
                .default_value("info")
                .help("Log filter used when RUST_LOG is not set"),
        )
        .get_matches()
}

fn configure(matches: &ArgMatches) -> Result<ServerConfig, ServerError> {
    let mut config = ServerConfig::default();
    if let Some(path) = matches.value_of(CONFIG) {
        config = config.load_file(path)?;
    }
    if let Some(address) = matches.value_of(ADDRESS) {
        config = config.with_address(address)?;
    }
    if let Some(port) = matches.value_of(PORT) {
        let port = u16::from_str(port)
            .map_err(|_| ServerError::Config(format!("Could not parse port {:?}", port)))?;
        config = config.with_port(port);
    }
    if let Some(passes) = matches.value_of(PASSES) {
        let passes = u32::from_str(passes)
            .map_err(|_| ServerError::Config(format!("Could not parse pass count {:?}", passes)))?;
        config = config.with_passes(passes)?;
    }
    Ok(config)
}

async fn serve(config: ServerConfig) -> Result<(), ServerError> {
    let server = Server::bind(config.clone()).await?;
    info!(passes = config.passes, "Running on http://{}/", server.local_addr()?);
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

#[tokio::main]
async fn main() {
    let matches = args();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(matches.value_of(LOG_LEVEL).unwrap_or("info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match configure(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration failure: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = serve(config).await {
        eprintln!("Server failure: {}", e);
        std::process::exit(1);
    }
}
