use crate::api::ApiServer;
use crate::channels::{ChannelCatalog, ConversationReferenceStore};
use crate::config::Config;
use crate::reasoning::OpenAiReasoningGateway;
use crate::session::SessionService;
use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

pub async fn run_service(port: Option<u16>) -> Result<()> {
    info!("Starting Coachline service");

    let mut config = Config::load()?;
    if let Some(port) = port {
        config.server.port = port;
    }

    let service = build_service(&config)?;

    let api_server = ApiServer::new(Arc::clone(&service), &config.server);
    let server = tokio::spawn(async move {
        if let Err(e) = api_server.start().await {
            error!("API server failed: {}", e);
        }
    });

    info!("Coachline is ready!");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested, stopping active sessions");
        }
        _ = server => {
            warn!("API server exited, stopping active sessions");
        }
    }

    let reports = service.clear().await;
    info!("Stopped {} session(s)", reports.len());

    Ok(())
}

fn build_service(config: &Config) -> Result<Arc<SessionService>> {
    let gateway = Arc::new(OpenAiReasoningGateway::from_config(&config.reasoning)?);
    let references = Arc::new(ConversationReferenceStore::new());
    let catalog = ChannelCatalog::from_config(config, Arc::clone(&references))?;

    if catalog.available().is_empty() {
        warn!("No notification channels configured; directives will have nowhere to go");
    }

    Ok(Arc::new(SessionService::new(
        gateway,
        catalog,
        references,
        config.coaching.clone(),
    )))
}
