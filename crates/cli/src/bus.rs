//! Line-delimited JSON bus
//!
//! One inbound event per input line, one outbound event per output line.
//! A timer feeds `timer_tick` events; the router decides when a sweep is due.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sippbx_subscription_core::{
    spawn_router, ChannelNotifier, EventRouter, InboundEvent, OutboundEvent, RouterHandle,
    SippbxConfig, SpoolVoicemailStore, TimerTick,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const ROUTER_QUEUE: usize = 1024;

/// Pump `reader` into a router until EOF or `shutdown` resolves.
/// Returns the writer once every outbound event has been written.
pub async fn run_bus<R, W>(
    config: &SippbxConfig,
    tick_interval: Duration,
    reader: R,
    writer: W,
    shutdown: impl Future<Output = ()>,
) -> Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let router = EventRouter::new(
        config.subscription.clone(),
        Arc::new(SpoolVoicemailStore::new(&config.voicemail.root)),
        Arc::new(ChannelNotifier::new(out_tx.clone())),
    );
    let (handle, router_task) = spawn_router(router, ROUTER_QUEUE);
    let writer_task = tokio::spawn(write_outbound(out_rx, writer));

    let mut lines = reader.lines();
    let mut ticker = tokio::time::interval(tick_interval);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => handle_line(&handle, &out_tx, &line).await?,
                None => {
                    info!("Input closed");
                    break;
                }
            },
            _ = ticker.tick() => {
                let time = chrono::Utc::now().timestamp();
                handle.dispatch(InboundEvent::TimerTick(TimerTick { time })).await?;
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    handle.shutdown().await?;
    let router = router_task.await?;
    info!(
        "Router stopped with {} mailbox and {} dialog subscriptions",
        router.mailboxes().len(),
        router.dialogs().len()
    );
    // the writer finishes once the router's notifier and ours are gone
    drop(router);
    drop(out_tx);
    writer_task.await?
}

async fn handle_line(
    handle: &RouterHandle,
    out_tx: &mpsc::UnboundedSender<OutboundEvent>,
    line: &str,
) -> Result<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }
    let event = match InboundEvent::from_json(line) {
        Ok(event) => event,
        Err(e) => {
            warn!("Ignoring bus line: {}", e);
            return Ok(());
        }
    };
    debug!("Received {} event", event.kind());

    if let InboundEvent::DiagnosticQuery = event {
        let text = handle.diagnostics().await?;
        send_diagnostics(out_tx, text);
        Ok(())
    } else {
        Ok(handle.dispatch(event).await?)
    }
}

fn send_diagnostics(out_tx: &mpsc::UnboundedSender<OutboundEvent>, text: String) -> bool {
    match out_tx.send(OutboundEvent::Diagnostics { text }) {
        Ok(()) => true,
        Err(e) => {
            warn!("Dropping diagnostics, outbound channel closed: {:?}", e.0);
            false
        }
    }
}

async fn write_outbound<W>(mut rx: mpsc::UnboundedReceiver<OutboundEvent>, mut writer: W) -> Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = rx.recv().await {
        let mut line = event.to_json()?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(writer)
}
