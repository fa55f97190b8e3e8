#[macro_use]
extern crate log;

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::prelude::{DateTime, Local};
use clap::Parser;

use coordinator::{Server, ServerConfig};
use coordinator_modules::{MemoryStore, MemoryStoreClient};

/// Runs a local coordination cluster: every member campaigns over one
/// in-process store and serves the HTTP API on its own port.
#[derive(Parser, Debug)]
#[command(name = "node")]
#[command(about = "Local leader election and membership cluster")]
struct Cli {
    /// Number of members
    #[arg(short, long, default_value_t = 3)]
    members: u32,

    /// Client port of the first member; member i listens on base + 10 * (i - 1)
    #[arg(long, default_value_t = 2379)]
    client_port_base: u16,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 1)]
    cluster_id: u64,

    /// Leader lease ttl in milliseconds
    #[arg(long, default_value_t = 3000)]
    lease_ttl_ms: u64,
}

fn init_logger() {
    env_logger::builder()
        .format(|buf, record| {
            let now: DateTime<Local> = Local::now();
            writeln!(buf, "{:5}: {} - {}", record.level(), now.format("%H:%M:%S.%3f"), record.args())
        })
        .init();
}

fn member_config(cli: &Cli, index: u32) -> ServerConfig {
    let client_port = u32::from(cli.client_port_base) + (index - 1) * 10;
    let mut config = ServerConfig::new(
        &format!("node{}", index),
        vec![format!("http://{}:{}", cli.host, client_port)],
        vec![format!("http://{}:{}", cli.host, client_port + 1)],
    );
    config.cluster_id = cli.cluster_id;
    config.root_path = format!("{}/{}", coordinator::DEFAULT_ROOT_PATH, cli.cluster_id);
    config.timings.lease_ttl = Duration::from_millis(cli.lease_ttl_ms);

    config
}

fn listen_addr(config: &ServerConfig) -> String {
    config
        .advertise_addr()
        .trim_start_matches("http://")
        .to_string()
}

#[tokio::main]
async fn main() {
    init_logger();
    let cli = Cli::parse();

    let store = MemoryStore::new();
    let mut servers: Vec<Arc<Server<MemoryStoreClient>>> = Vec::new();
    for index in 1..=cli.members {
        let config = member_config(&cli, index);
        let peer = store.add_member(&config.name, config.peer_urls.clone(), config.client_urls.clone());
        match Server::new(config, store.client(peer.id)) {
            Ok(server) => servers.push(Arc::new(server)),
            Err(err) => {
                error!("{}", err);
                std::process::exit(1);
            }
        }
    }

    let mut run_handles = Vec::new();
    for server in &servers {
        let listener = match tokio::net::TcpListener::bind(listen_addr(server.config())).await {
            Ok(listener) => listener,
            Err(err) => {
                error!("Cannot listen on {}: {}", server.addr(), err);
                std::process::exit(1);
            }
        };
        info!("{} serves HTTP on {}", server.name(), server.addr());
        let app = coordinator_modules::router(server.clone());
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                error!("HTTP server failed: {}", err);
            }
        });

        let run_server = server.clone();
        run_handles.push(thread::spawn(move || {
            if let Err(err) = run_server.run() {
                error!("{}", err);
            }
        }));
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Cannot wait for the interrupt signal: {}", err);
    }
    info!("Shutting down");

    let closing = servers.clone();
    let closed = tokio::task::spawn_blocking(move || {
        for server in closing {
            server.close();
        }
        for handle in run_handles {
            if handle.join().is_err() {
                error!("Server thread panicked");
            }
        }
    })
    .await;
    if closed.is_err() {
        error!("Shutdown task failed");
    }
}
