//! Transmit a test tone.
//!
//! Starts a TX session on the given interface, prefills the DUC ring
//! buffer with a 10 kHz tone, and streams it for 10 seconds.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p vrtlink --example tx_tone
//! ```

use std::f32::consts::TAU;
use std::time::Duration;

use vrtlink::stream::TxSessionBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut tx = TxSessionBuilder::new()
        .interface("eth1")
        .command_addr("192.168.10.2:42800")
        .tx_channel(0)
        .duc_channel(0)
        .rate_index(9)
        .udp_port(42836)
        .start()
        .await?;

    let rate = tx.sample_rate() as f32;
    let spf = tx.samples_per_frame();
    println!("TX session up at {} samples/s, prefilling {} samples", rate, tx.prefill_target());

    let mut events = tx.subscribe();
    let mut phase = 0.0f32;
    let step = TAU * 10_000.0 / rate;
    let mut frame = vec![0i16; 2 * spf];

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        for pair in frame.chunks_exact_mut(2) {
            pair[0] = (phase.cos() * 16_000.0) as i16;
            pair[1] = (phase.sin() * 16_000.0) as i16;
            phase = (phase + step) % TAU;
        }
        tx.send_frame(&frame).await?;

        while let Ok(event) = events.try_recv() {
            println!("{:?}", event);
        }
    }

    let stats = tx.stats().await;
    tx.stop().await;
    println!("Sent {} frames", stats.packets.frames_sent);
    Ok(())
}
