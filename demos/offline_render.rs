//! Render a small patch offline and print a few stats.
//!
//! Run with: cargo run --example offline_render

use strom::nodes::{Metro, Sine, TrigFunc};
use strom::{OfflineBackend, Route, Server, ServerConfig};

fn main() {
    tracing_subscriber::fmt::init();

    let mut server = Server::new(ServerConfig {
        sample_rate: 44100.0,
        channels: 2,
        block_size: 64,
        duplex: false,
    })
    .unwrap();
    server.boot(Box::new(OfflineBackend::new())).unwrap();

    // An LFO-swept pair of sines, retuned on every metronome tick.
    let osc = server
        .add(Sine::new().freq(vec![330.0, 331.0]).mul(0.25))
        .unwrap();
    server.route(osc, Route::default()).unwrap();

    let metro = server.add(Metro::new(0.5)).unwrap();
    let mut step = 0u32;
    server
        .add(TrigFunc::new(metro, move |ctl| {
            step += 1;
            let base = 330.0 * 1.5f32.powi((step % 4) as i32);
            ctl.set_param(osc, "freq", vec![base, base + 1.0]).ok();
        }))
        .unwrap();

    server.start().unwrap();
    let seconds = 2.0;
    let blocks = (seconds * 44100.0 / 64.0) as u64;
    let rendered = server.render(blocks).unwrap();

    let peak = rendered.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
    let rms = (rendered.iter().map(|&s| s * s).sum::<f32>() / rendered.len() as f32).sqrt();
    println!(
        "rendered {} blocks ({} samples), peak {:.3}, rms {:.3}, {} metro ticks",
        blocks,
        rendered.len(),
        peak,
        rms,
        server.trigger_count(metro).unwrap()
    );
}
