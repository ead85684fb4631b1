//! `espstream stream` / `espstream run`: subscribe and print window events.

use std::sync::Arc;

use anyhow::{bail, Result};
use espstream_client::{
    ChannelListener, ClientConfig, EspClient, Fault, StreamEvent, SubscriptionConfig,
};
use espstream_core::WindowEvent;
use espstream_observability::log_stats;
use tracing::{info, warn};

/// Stream until Ctrl-C, the first fault or the server closing the stream.
pub async fn run(config: ClientConfig, subscriptions: &[SubscriptionConfig], as_json: bool) -> Result<()> {
    let url = config.url.clone();
    let (listener, mut events) = ChannelListener::new();
    let (client, mut faults) = EspClient::new(config, Arc::new(listener));
    client.connect().await?;

    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(StreamEvent::Connected) => {
                    for sub in subscriptions {
                        client.subscribe_with(sub).await?;
                    }
                }
                Some(StreamEvent::Event(event)) => print_event(&event, as_json)?,
                Some(StreamEvent::ProjectLoaded(name)) => {
                    // a reloaded project drops its subscriptions server-side
                    for sub in subscriptions.iter().filter(|s| s.project == name) {
                        client.subscribe_with(sub).await?;
                    }
                }
                Some(StreamEvent::ProjectRemoved(name)) => {
                    warn!(project = %name, "project removed, its windows stop streaming");
                }
                None => break Ok(()),
            },
            fault = faults.recv() => match fault {
                Some(fault) => break Err(fault),
                None => break Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break Ok(());
            }
        }
    };

    client.close().await;
    log_stats(&client.stats());
    match outcome {
        Ok(()) => Ok(()),
        Err(Fault::Connection(reason)) => bail!("connection to {url} lost: {reason}"),
        Err(fault) => bail!(fault),
    }
}

pub fn print_event(event: &WindowEvent, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        println!("{event}");
    }
    Ok(())
}
