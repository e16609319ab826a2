//! Play a detuned sine pair on the default output device.
//!
//! Run with: cargo run --example simple_sine --features cpal_backend

use std::time::{Duration, Instant};

use strom::nodes::Sine;
use strom::{CpalDevice, Route, Server, ServerConfig};

fn main() {
    tracing_subscriber::fmt::init();

    let device = CpalDevice::default_output().expect("no audio device found");
    println!(
        "playing on {} ({} Hz, {} ch)",
        device.name(),
        device.sample_rate(),
        device.channels()
    );

    let config = ServerConfig {
        sample_rate: device.sample_rate() as f32,
        channels: 2,
        block_size: 64,
        duplex: false,
    };
    let mut server = Server::new(config).unwrap();
    server.boot(Box::new(device.into_backend())).unwrap();

    let osc = server
        .add(Sine::new().freq(vec![220.0, 220.7]).mul(0.2))
        .unwrap();
    server.route(osc, Route::default()).unwrap();
    server.start().unwrap();

    // The backend paces the loop: write_block waits for the device.
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        server.process_block().unwrap();
    }

    server.shutdown();
}
