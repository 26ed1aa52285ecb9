//! TCP echo server behind a [`MeteredListener`].
//!
//! Reports accept outcomes and peak open connections either to a Prometheus
//! endpoint or to the log, and flushes once more on Ctrl+C.

mod cli;

use std::{sync::Arc, time::Duration};

use clap::Parser;
use log::{debug, warn};
use metered_listener::{ListenerOptions, LogClient, MeteredConnection, MeteredListener, MetricsClient};
use tokio::{
    io::{self, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    select,
    signal,
    time::sleep,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Structured logging also picks up the library's `log` records.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    let client = reporter(&cli)?;
    let options = ListenerOptions::default()
        .flush_interval(Duration::from_millis(cli.flush_interval_ms))
        .metric_prefix(cli.prefix.clone());
    let tcp = TcpListener::bind(cli.bind).await?;
    let listener = Arc::new(MeteredListener::with_options(tcp, client, [options])?);
    tracing::info!(addr = %listener.local_addr()?, prefix = %cli.prefix, "listening");

    loop {
        select! {
            res = signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!("failed to listen for ctrl-c: error={e}");
                }
                break;
            }
            res = listener.accept() => match res {
                Ok((conn, peer)) => {
                    debug!("accepted connection: peer_addr={peer}");
                    tokio::spawn(echo(conn));
                }
                Err(e) => {
                    warn!("accept error: error={e}");
                    sleep(Duration::from_millis(10)).await;
                }
            },
        }
    }

    let open = listener.open_connections();
    listener.close().await?;
    tracing::info!(open, "listener closed");
    Ok(())
}

/// Pick the metrics client: Prometheus when requested, the log otherwise.
fn reporter(cli: &cli::Cli) -> Result<Box<dyn MetricsClient>, BoxError> {
    #[cfg(feature = "metrics")]
    if let Some(addr) = cli.prometheus {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        tracing::info!(%addr, "serving prometheus metrics");
        return Ok(Box::new(metered_listener::FacadeClient));
    }
    #[cfg(not(feature = "metrics"))]
    if cli.prometheus.is_some() {
        return Err("prometheus export requires the `metrics` feature".into());
    }
    Ok(Box::new(LogClient))
}

async fn echo(conn: MeteredConnection<TcpStream>) {
    let (mut reader, mut writer) = io::split(conn);
    if let Err(e) = io::copy(&mut reader, &mut writer).await {
        debug!("echo connection ended: error={e}");
    }
    if let Err(e) = writer.shutdown().await {
        debug!("echo shutdown failed: error={e}");
    }
}
