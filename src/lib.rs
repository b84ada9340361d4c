pub mod auth;
pub mod cli;
pub mod directory;
pub mod error;
pub mod fanout;
pub mod models;
pub mod policy;
pub mod rate_limit;
pub mod server;
pub mod service;
pub mod store;

use auth::TokenSigner;
use chrono::Duration;
use cli::Args;
use directory::FileDirectory;
use fanout::ChannelHub;
use log::{ info, warn };
use rate_limit::SendRateLimiter;
use server::api::AppState;
use server::Server;
use service::MessagingService;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("HTTP Port: {}", args.http_port);
    info!("WebSocket Address: {}", args.server_addr);
    info!("Store Type: {}", args.store_type);
    info!("Store Host: {}", args.store_host);
    info!("Employees Path: {}", args.employees_path);
    info!("Send Rate Limit: {} per {}s", args.rate_limit_max, args.rate_limit_window_secs);
    info!("Session Buffer: {}", args.ws_channel_capacity);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    if args.token_secret == "dev_secret" {
        warn!("JWT_SECRET not set, using the development secret. Do not run this in production.");
    }
    if args.server_api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
        warn!("Directory reload endpoint configured WITHOUT API Key authentication.");
    }

    let directory = Arc::new(FileDirectory::load(&args.employees_path)?);
    let stores = store::create_stores(&args)?;
    let hub = ChannelHub::new(args.ws_channel_capacity);
    let limiter = SendRateLimiter::new(
        args.rate_limit_max,
        Duration::seconds(args.rate_limit_window_secs)
    );
    let service = Arc::new(MessagingService::new(directory.clone(), stores, limiter, hub.clone()));
    let signer = Arc::new(TokenSigner::new(&args.token_secret, Duration::seconds(args.token_ttl_secs)));

    let state = AppState {
        service,
        signer,
        directory,
        api_key: args.server_api_key.clone().filter(|k| !k.trim().is_empty()),
    };

    let server = Server::new(state, hub, args.clone());
    server.run().await?;

    Ok(())
}
