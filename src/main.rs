use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bookstore::bus::{FanoutPublisher, InMemoryBus, ListenerHandle, Publisher};
use bookstore::catalog::CatalogService;
use bookstore::gateway::{spawn_invalidation_listener, Gateway};
use bookstore::http::{
    self, GatewayClient, HttpBackend, HttpBookSource, HttpCatalogClient, HttpPublisher,
};
use bookstore::order::OrderService;
use bookstore::{BackendRegistry, Config, Endpoint, Process, Role};

#[derive(Parser)]
#[command(name = "bookstore", version, about = "Run one process of the bookstore")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Client-facing gateway with the response cache.
    Gateway,
    /// Catalog service.
    Catalog {
        /// Run as the replica (bootstraps from the primary on first request).
        #[arg(long)]
        replica: bool,
    },
    /// Order service.
    Order {
        /// Run as the replica (purchases against the catalog replica).
        #[arg(long)]
        replica: bool,
    },
    /// Send one request to a running gateway and print the reply.
    Client {
        /// Gateway base URL.
        #[arg(long, env = "BOOKSTORE_GATEWAY_URL", default_value = "http://127.0.0.1:5000")]
        gateway: String,
        #[command(subcommand)]
        request: ClientRequest,
    },
}

#[derive(Subcommand)]
enum ClientRequest {
    /// Books with exactly this name.
    Search { term: String },
    /// One book's details.
    Info { id: u64 },
    /// Buy one copy.
    Purchase { id: u64 },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let role = |replica: bool| if replica { Role::Replica } else { Role::Primary };
    let process = match cli.command {
        Command::Gateway => Process::Gateway,
        Command::Catalog { replica } => Process::Catalog(role(replica)),
        Command::Order { replica } => Process::Order(role(replica)),
        Command::Client { gateway, request } => {
            return run_client(Endpoint::new(gateway), request, config.backend_timeout).await;
        }
    };

    let bus = InMemoryBus::new();
    let peers = config.peers_for(process);
    tracing::info!(%process, peers = peers.len(), "starting");
    let local: Arc<dyn Publisher> = Arc::new(bus.clone());
    let bridge: Arc<dyn Publisher> = Arc::new(HttpPublisher::new(peers, config.backend_timeout)?);
    let publisher: Arc<dyn Publisher> = Arc::new(FanoutPublisher::new(vec![local, bridge]));

    let (app, listeners): (axum::Router, Vec<ListenerHandle>) = match process {
        Process::Gateway => {
            let gateway = Arc::new(Gateway::new(
                BackendRegistry::new(config.catalog_pool.clone(), config.order_pool.clone()),
                Arc::new(HttpBackend::new(config.backend_timeout)?),
                publisher,
                config.gateway(),
            ));
            let listener = spawn_invalidation_listener(Arc::clone(&gateway), &bus);
            (http::gateway_router(gateway, bus.clone()), vec![listener])
        }
        Process::Catalog(role) => {
            let service = Arc::new(match role {
                Role::Primary => CatalogService::primary(publisher),
                Role::Replica => CatalogService::replica(
                    publisher,
                    Arc::new(HttpBookSource::new(
                        config.catalog_primary_url.clone(),
                        config.backend_timeout,
                    )?),
                ),
            });
            let listener = service.watch_counterpart(&bus);
            (http::catalog_router(service, bus.clone()), vec![listener])
        }
        Process::Order(role) => {
            let catalog = HttpCatalogClient::new(
                config.catalog_for_order(role).clone(),
                config.backend_timeout,
            )?;
            let service = Arc::new(
                OrderService::new(role, Arc::new(catalog), publisher)
                    .with_timeout(config.backend_timeout),
            );
            let listener = service.watch_confirmations(&bus);
            (http::order_router(service, bus.clone()), vec![listener])
        }
    };

    http::serve(app, config.listen_addr(process), shutdown_signal()).await?;

    for listener in listeners {
        let name = listener.name().to_string();
        let stats = listener.stop();
        tracing::info!(listener = %name, handled = stats.handled, failed = stats.failed, "listener stopped");
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_client(
    gateway: Endpoint,
    request: ClientRequest,
    timeout: Duration,
) -> Result<ExitCode, Box<dyn Error>> {
    let client = GatewayClient::new(gateway, timeout)?;
    let reply = match request {
        ClientRequest::Search { term } => client.search(&term).await?,
        ClientRequest::Info { id } => client.info(id).await?,
        ClientRequest::Purchase { id } => client.purchase(id).await?,
    };
    println!("{}", serde_json::to_string_pretty(&reply.body)?);
    if reply.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("gateway answered {}", reply.status);
        Ok(ExitCode::FAILURE)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
    tracing::info!("shutting down");
}
