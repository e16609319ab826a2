use criterion::{black_box, criterion_group, criterion_main, Criterion};

use strom::nodes::{Arith, Noise, Osc, Sine};
use strom::{OfflineBackend, Route, Server, ServerConfig, Table};

fn server() -> Server {
    let mut s = Server::new(ServerConfig {
        sample_rate: 48000.0,
        channels: 2,
        block_size: 64,
        duplex: false,
    })
    .unwrap();
    s.boot(Box::new(OfflineBackend::new())).unwrap();
    s.start().unwrap();
    s
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("sine block", |b| {
        let mut s = server();
        let osc = s.add(Sine::new().freq(480.0)).unwrap();
        s.route(osc, Route::default()).unwrap();
        b.iter(|| {
            s.process_block().unwrap();
            black_box(s.output());
        })
    });

    c.bench_function("8-voice wavetable block", |b| {
        let mut s = server();
        let table = s.add_table(Table::sine(8192, 48000.0).unwrap());
        let freqs: Vec<f32> = (0..8).map(|i| 110.0 * (i + 1) as f32).collect();
        let osc = s.add(Osc::new(table).freq(freqs).mul(0.1)).unwrap();
        s.route(osc, Route::default()).unwrap();
        b.iter(|| {
            s.process_block().unwrap();
            black_box(s.output());
        })
    });

    c.bench_function("ring-mod pair block", |b| {
        let mut s = server();
        let carrier = s.add(Sine::new().freq(440.0)).unwrap();
        let noise = s.add(Noise::seeded(1)).unwrap();
        let rm = s.add(Arith::product(carrier, noise)).unwrap();
        s.route(rm, Route::default()).unwrap();
        b.iter(|| {
            s.process_block().unwrap();
            black_box(s.output());
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
