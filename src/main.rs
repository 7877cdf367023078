//! `streamtap` binary: replays a capture file through the decode pipeline.

mod cli;

use std::sync::Arc;

use clap::Parser;
use streamtap::{
    byte_order::ByteOrder,
    config::{PipelineConfig, ProtocolMode},
    pipeline::Pipeline,
    record::LogSink,
};

use crate::cli::{ByteOrderArg, Cli};

fn pipeline_config(cli: &Cli) -> PipelineConfig {
    let mut config = PipelineConfig::default()
        .protocol_mode(if cli.http2 {
            ProtocolMode::Http2
        } else {
            ProtocolMode::Http1
        })
        .output_enabled(!cli.no_print)
        .byte_order(match cli.byte_order {
            ByteOrderArg::Native => ByteOrder::Native,
            ByteOrderArg::Little => ByteOrder::Little,
            ByteOrderArg::Big => ByteOrder::Big,
        });
    if let Some(workers) = cli.workers {
        config = config.workers(workers);
    }
    if let Some(capacity) = cli.queue_capacity {
        config = config.queue_capacity(capacity);
    }
    config
}

#[cfg(feature = "metrics")]
fn install_metrics(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        tracing::info!(%addr, "serving metrics");
    }
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.metrics_addr.is_some() {
        tracing::warn!("--metrics-addr ignored: built without the `metrics` feature");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    install_metrics(&cli)?;

    let mut pipeline = Pipeline::new(pipeline_config(&cli), Arc::new(LogSink));
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let result = match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            pipeline.run_reader(file, shutdown).await
        }
        None => pipeline.run_reader(tokio::io::stdin(), shutdown).await,
    };
    let stats = pipeline.finish().await;
    tracing::info!(
        applied = stats.applied,
        malformed = stats.malformed,
        unknown = stats.unknown,
        dispatched = stats.dispatched,
        "capture replay complete"
    );
    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn flags_map_onto_pipeline_config() {
        let cli = Cli::parse_from([
            "streamtap",
            "--http2",
            "--no-print",
            "--workers",
            "3",
            "--byte-order",
            "little",
        ]);
        let config = pipeline_config(&cli);
        assert_eq!(config.protocol_mode, ProtocolMode::Http2);
        assert!(!config.output_enabled);
        assert_eq!(config.workers, 3);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.byte_order, ByteOrder::Little);
    }
}
