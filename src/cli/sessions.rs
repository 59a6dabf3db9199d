//! CLI handlers that talk to a running service.

use crate::cli::client::ServiceClient;
use crate::cli::{ClientCliArgs, StopCliArgs};
use crate::config::Config;
use anyhow::Result;

fn client_for(args: &ClientCliArgs) -> Result<ServiceClient> {
    match &args.url {
        Some(url) => Ok(ServiceClient::new(url)),
        None => Ok(ServiceClient::from_config(&Config::load()?.server)),
    }
}

pub async fn handle_sessions_command(args: ClientCliArgs) -> Result<()> {
    let client = client_for(&args)?;
    let sessions = client.list_sessions().await?;

    if sessions.is_empty() {
        println!("No active sessions.");
        return Ok(());
    }

    println!(
        "{:<24} {:<8} {:<20} {:>6} {:>8} {:>6}",
        "SESSION", "PHASE", "HOST", "NUDGES", "BATCHES", "MIN"
    );
    for session in sessions {
        let host = session
            .host
            .as_ref()
            .map(|host| host.name.as_str())
            .unwrap_or("-");
        println!(
            "{:<24} {:<8} {:<20} {:>6} {:>8} {:>6}",
            session.session_id,
            session.phase,
            host,
            session.nudge_count,
            session.batches_analyzed,
            session.duration_seconds / 60
        );
        if let Some(title) = session.meeting_title {
            println!("  {}", title);
        }
    }

    Ok(())
}

pub async fn handle_stop_command(args: StopCliArgs) -> Result<()> {
    let client = client_for(&args.client)?;
    let report = client.stop_session(&args.session_id).await?;

    println!("Stopped session {}", report.session_id);
    println!("  Duration: {} min", report.duration_minutes);
    println!("  Nudges:   {}", report.total_nudges);
    match report.final_flush.as_str() {
        "completed" => println!("  Final partial batch was analyzed"),
        "deferred" => println!("  Final partial batch is still being analyzed"),
        _ => {}
    }

    Ok(())
}
