//! Sweep a wavetable morph between a pure sine and a bright harmonic
//! stack while an oscillator plays the morph target.
//!
//! Run with: cargo run --example morph_scan

use strom::nodes::{Osc, Sig, TableMorph};
use strom::{OfflineBackend, Route, Server, ServerConfig, Table};

fn main() {
    tracing_subscriber::fmt::init();

    let mut server = Server::new(ServerConfig {
        sample_rate: 44100.0,
        channels: 1,
        block_size: 64,
        duplex: false,
    })
    .unwrap();
    server.boot(Box::new(OfflineBackend::new())).unwrap();

    let soft = server.add_table(Table::sine(4096, 44100.0).unwrap());
    let bright = server.add_table(
        Table::harmonics(4096, &[1.0, 0.7, 0.5, 0.35, 0.25, 0.18], 44100.0).unwrap(),
    );
    let target = server.new_table(4096, 1).unwrap();

    let pos = server.add(Sig::new(0.0)).unwrap();
    server
        .add(TableMorph::new(pos, target, vec![soft, bright]))
        .unwrap();
    let osc = server.add(Osc::new(target).freq(220.0).mul(0.5)).unwrap();
    server.route(osc, Route::default()).unwrap();

    server.start().unwrap();
    for step in 0..=10 {
        let p = step as f32 / 10.0;
        server.set_param(pos, "value", p).unwrap();
        let rendered = server.render(32).unwrap();
        let rms =
            (rendered.iter().map(|&s| s * s).sum::<f32>() / rendered.len() as f32).sqrt();
        println!("morph {:.1}: rms {:.4}", p, rms);
    }
}
