use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use clap::Parser;
use ndts::Store;
use ndts_server::{server, Config};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ndts_server", about = "Embedded time-series store server")]
struct Args {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `data_dir` from the config file / environment.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Overrides `bind_addr` from the config file / environment.
    #[arg(long)]
    bind_addr: Option<String>,

    /// Overrides `log_level` from the config file / environment.
    #[arg(long)]
    log_level: Option<String>,
}

fn main() {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())
        .expect("failed to load config")
        .with_overrides(args.data_dir, args.bind_addr, args.log_level);

    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_level)).init();

    let store = Store::open(&config.data_dir).expect("failed to open store");
    let store = Arc::new(RwLock::new(store));

    let listener = TcpListener::bind(&config.bind_addr).expect("failed to bind");
    info!(addr = %config.bind_addr, data_dir = %config.data_dir.display(), "listening");

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "accept error");
                continue;
            }
        };
        let store = Arc::clone(&store);
        std::thread::spawn(move || {
            server::handle_conn(stream, store);
        });
    }
}
