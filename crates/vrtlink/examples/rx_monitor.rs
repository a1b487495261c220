//! Monitor a receive stream for packet loss.
//!
//! Listens for a Framed DDC stream, pulls samples through the ingestor and
//! prints every loss event together with a running power estimate.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p vrtlink --example rx_monitor
//! ```

use std::time::Duration;

use vrtlink::stream::{RxIngestorBuilder, TagKind};
use vrtlink::{FrameProfile, IqSample, StreamEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let port = 42820;
    let mut rx = RxIngestorBuilder::new(FrameProfile::framed(1536))
        .port(port)
        .rate_index(9)
        .tagging(true)
        .build()
        .await?;

    println!(
        "Listening on UDP {} at {} samples/s for 30 seconds...",
        port,
        rx.sample_rate().unwrap_or_default()
    );

    let mut events = rx.subscribe();
    let mut buf = vec![IqSample::ZERO; 20_000];
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);

    while tokio::time::Instant::now() < deadline {
        let report = rx.fill(&mut buf).await?;

        let power: f32 = buf[..report.written]
            .iter()
            .map(|s| s.to_complex().norm_sqr())
            .sum::<f32>()
            / report.written.max(1) as f32;
        println!(
            "{:>10}  {:>6} samples  power {:.2} dBFS",
            report.start,
            report.written,
            10.0 * power.max(1e-12).log10()
        );

        for tag in &report.tags {
            if let TagKind::Metadata(meta) = &tag.kind {
                if let Some(ctx) = &meta.context {
                    println!("            tuned {} Hz, {}", ctx.tuned_frequency, ctx.oversample);
                }
            }
        }

        while let Ok(event) = events.try_recv() {
            if let StreamEvent::PacketsDropped { count, offset, .. } = event {
                println!("            {} packet(s) lost at sample {}", count, offset);
            }
        }
    }

    let stats = rx.stats();
    println!(
        "\n{} packets, {} dropped, {} samples synthesized",
        stats.packets, stats.dropped_packets, stats.synthesized_samples
    );
    Ok(())
}
