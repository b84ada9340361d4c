pub mod api;
pub mod websocket;

use crate::auth::TokenSigner;
use crate::cli::Args;
use crate::fanout::ChannelHub;
use api::AppState;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    state: AppState,
    hub: Arc<ChannelHub>,
    signer: Arc<TokenSigner>,
    args: Args,
}

impl Server {
    pub fn new(state: AppState, hub: Arc<ChannelHub>, args: Args) -> Self {
        let signer = state.signer.clone();
        Self { state, hub, signer, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.start_http_server().await?;
        self.start_ws_server().await?;
        Ok(())
    }

    async fn start_http_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(
            self.args.http_port,
            self.state.clone(),
            self.args.clone(),
        ).await
    }

    async fn start_ws_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        websocket::start_ws_server(
            &self.args.server_addr,
            self.hub.clone(),
            self.signer.clone(),
            self.args.clone(),
        ).await
    }
}
