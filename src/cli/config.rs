//! CLI handler for inspecting the configuration file.

use crate::cli::{ConfigCliArgs, ConfigCommand};
use crate::config::Config;
use anyhow::Result;

pub fn handle_config_command(args: ConfigCliArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Show => handle_show(),
        ConfigCommand::Path => {
            println!("{}", crate::global::config_file()?.display());
            Ok(())
        }
    }
}

fn handle_show() -> Result<()> {
    let config = Config::load()?;

    println!();
    println!("Coachline Configuration");
    println!("=======================");
    println!();
    println!("Server:       http://{}:{}", config.server.host, config.server.port);
    println!();
    println!("Coaching:");
    println!("  Batch size: {}", config.coaching.batch_size);
    println!("  History:    {} events", config.coaching.history_limit);
    println!("  Stop wait:  {}s", config.coaching.stop_timeout_seconds);
    println!("  Queue:      {} batches", config.coaching.max_pending_batches);
    let channels = match &config.coaching.default_channels {
        Some(kinds) => kinds
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        None => "<all configured>".to_string(),
    };
    println!("  Channels:   {}", channels);
    println!();
    println!("Reasoning:");
    println!("  Endpoint:   {}", config.reasoning.endpoint);
    println!("  Model:      {}", config.reasoning.model);
    println!("  Key:        {}", mask_secret(config.reasoning.api_key.as_deref()));
    println!();
    println!("Direct:");
    match &config.direct {
        Some(direct) => {
            println!("  Service:    {}", direct.service_url);
            println!("  Token:      {}", mask_secret(Some(&direct.bot_token)));
        }
        None => println!("  <not configured>"),
    }
    println!("Threaded:");
    match &config.threaded {
        Some(threaded) => {
            println!("  Channel:    {}", threaded.channel_id);
            println!("  Token:      {}", mask_secret(Some(&threaded.token)));
        }
        None => println!("  <not configured>"),
    }
    println!("Broadcast:");
    match &config.broadcast {
        Some(broadcast) => {
            println!("  From:       {}", broadcast.from_number);
            println!("  Recipients: {}", broadcast.to_numbers.len());
            println!("  Auth:       {}", mask_secret(Some(&broadcast.auth_token)));
        }
        None => println!("  <not configured>"),
    }
    println!();
    println!("Config file:  {}", crate::global::config_file()?.display());

    Ok(())
}

fn mask_secret(value: Option<&str>) -> String {
    match value {
        Some(secret) if secret.chars().count() > 8 => {
            let prefix: String = secret.chars().take(4).collect();
            let suffix: String = secret.chars().skip(secret.chars().count() - 2).collect();
            format!("{prefix}****{suffix}")
        }
        Some(secret) if !secret.is_empty() => "*".repeat(secret.chars().count()),
        _ => "<not set>".to_string(),
    }
}
