//! Watch command handler

use anyhow::{bail, Context, Result};

use stockpulse_core::{Config, ConnectionStatus, LiveEvent, LiveSyncClient};

use crate::output::Output;

/// Follow the inventory room until Ctrl-C or the connection gives up
pub async fn watch(config: &Config, topic: Option<String>, output: &Output) -> Result<()> {
    let topic = topic.unwrap_or_else(|| config.topic.clone());

    let mut client = LiveSyncClient::new(config.live_sync_config());
    let mut events = client
        .take_events()
        .context("Live client event stream unavailable")?;
    client
        .connect(&topic)
        .with_context(|| format!("Failed to join '{}'", topic))?;

    output.message(&format!(
        "Watching '{}' on {} (Ctrl-C to stop)",
        topic, config.push_url
    ));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = events.recv() => match event {
                Some(LiveEvent::StatusChanged(status)) => {
                    output.print_status(status);
                    if status == ConnectionStatus::Closed {
                        let connection = client.connection();
                        client.disconnect().await;
                        if let Some(reason) = connection.close_reason {
                            bail!(reason);
                        }
                        return Ok(());
                    }
                }
                Some(LiveEvent::SnapshotReplaced(snapshot)) => output.print_inventory(&snapshot),
                // Each delta is followed by its notification
                Some(LiveEvent::Delta(delta)) => {
                    tracing::debug!(affected = delta.affected.len(), "Inventory delta applied");
                }
                Some(LiveEvent::Notification(notification)) => {
                    output.print_notification(&notification)
                }
                None => break,
            },
        }
    }

    client.disconnect().await;
    output.message("Disconnected.");
    Ok(())
}
