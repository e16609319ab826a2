use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use strom::nodes::{
    Arith, Input, MatrixRead, MatrixRec, Metro, Osc, Phasor, Port, Sig, Sine, TableMorph,
    TablePlay, TableRec, TrigFunc,
};
use strom::{GraphError, OfflineBackend, Route, Server, ServerConfig, Table};

fn mono_server() -> Server {
    let mut s = Server::new(ServerConfig {
        sample_rate: 44100.0,
        channels: 1,
        block_size: 64,
        duplex: false,
    })
    .unwrap();
    s.boot(Box::new(OfflineBackend::new())).unwrap();
    s.start().unwrap();
    s
}

fn quad_server() -> Server {
    let mut s = Server::new(ServerConfig {
        sample_rate: 44100.0,
        channels: 4,
        block_size: 64,
        duplex: false,
    })
    .unwrap();
    s.boot(Box::new(OfflineBackend::new())).unwrap();
    s.start().unwrap();
    s
}

#[test]
fn scalar_params_give_mono_node() {
    let mut s = mono_server();
    let osc = s.add(Sine::new().freq(440.0)).unwrap();
    assert_eq!(s.arity(osc).unwrap(), 1);
}

#[test]
fn list_params_expand_and_wrap() {
    let mut s = mono_server();
    let sig = s.add(Sig::new(vec![3.0, 5.0, 7.0])).unwrap();
    assert_eq!(s.arity(sig).unwrap(), 3);
    s.process_block().unwrap();
    assert_eq!(s.get(sig, 0).unwrap(), 3.0);
    assert_eq!(s.get(sig, 1).unwrap(), 5.0);
    assert_eq!(s.get(sig, 2).unwrap(), 7.0);
}

#[test]
/// A constant node bound to channel 0 fills the physical output with
/// the constant, one block at a time.
fn constant_to_channel_zero() {
    let mut s = mono_server();
    let sig = s.add(Sig::new(0.5)).unwrap();
    s.route(sig, Route::default()).unwrap();
    s.process_block().unwrap();
    let out = &s.output()[0];
    assert_eq!(out.len(), 64);
    assert!(out.iter().all(|&v| v == 0.5));
}

#[test]
/// Adding an arity-4 node to an arity-2 node yields arity 4, the
/// narrower operand wrapping cyclically.
fn arith_expands_to_wider_operand() {
    let mut s = mono_server();
    let a = s.add(Sig::new(vec![1.0, 2.0, 3.0, 4.0])).unwrap();
    let b = s.add(Sig::new(vec![10.0, 20.0])).unwrap();
    let sum = s.add(Arith::sum(a, b)).unwrap();
    assert_eq!(s.arity(sum).unwrap(), 4);
    s.process_block().unwrap();
    assert_eq!(s.get(sum, 0).unwrap(), 11.0);
    assert_eq!(s.get(sum, 1).unwrap(), 22.0);
    // index 2 reuses b's index 0, index 3 reuses b's index 1
    assert_eq!(s.get(sum, 2).unwrap(), 13.0);
    assert_eq!(s.get(sum, 3).unwrap(), 24.0);
}

#[test]
fn arith_negation_and_power() {
    let mut s = mono_server();
    let a = s.add(Sig::new(3.0)).unwrap();
    let neg = s.add(Arith::neg(a)).unwrap();
    let pow = s.add(Arith::power(a, 2.0)).unwrap();
    s.process_block().unwrap();
    assert_eq!(s.get(neg, 0).unwrap(), -3.0);
    assert_eq!(s.get(pow, 0).unwrap(), 9.0);
}

#[test]
fn mul_add_post_processing() {
    let mut s = mono_server();
    let sig = s.add(Sig::new(1.0).mul(0.5).add(2.0)).unwrap();
    s.process_block().unwrap();
    assert_eq!(s.get(sig, 0).unwrap(), 2.5);
}

#[test]
fn signal_valued_mul() {
    let mut s = mono_server();
    let lfo = s.add(Sig::new(0.25)).unwrap();
    let sig = s.add(Sig::new(2.0).mul(lfo)).unwrap();
    s.process_block().unwrap();
    assert_eq!(s.get(sig, 0).unwrap(), 0.5);
}

#[test]
/// With dur = 2 the node is active in blocks 0 and 1 and contributes
/// silence from block 2 on.
fn duration_bounded_node_self_deactivates() {
    let mut s = mono_server();
    let sig = s.add(Sig::new(1.0)).unwrap();
    s.route(sig, Route::default()).unwrap();
    s.play_after(sig, 0, Some(2)).unwrap();

    s.process_block().unwrap();
    assert!(s.output()[0].iter().all(|&v| v == 1.0));
    s.process_block().unwrap();
    assert!(s.output()[0].iter().all(|&v| v == 1.0));
    s.process_block().unwrap();
    assert!(s.output()[0].iter().all(|&v| v == 0.0));
    assert!(!s.is_playing(sig).unwrap());
}

#[test]
fn delayed_start() {
    let mut s = mono_server();
    let sig = s.add(Sig::new(1.0)).unwrap();
    s.route(sig, Route::default()).unwrap();
    s.stop_node(sig).unwrap();
    s.play_after(sig, 2, None).unwrap();

    s.process_block().unwrap();
    assert!(s.output()[0].iter().all(|&v| v == 0.0));
    s.process_block().unwrap();
    assert!(s.output()[0].iter().all(|&v| v == 0.0));
    assert!(!s.is_playing(sig).unwrap());
    s.process_block().unwrap();
    assert!(s.is_playing(sig).unwrap());
    assert!(s.output()[0].iter().all(|&v| v == 1.0));
}

#[test]
fn explicit_channel_list_wraps() {
    let mut s = quad_server();
    let sig = s.add(Sig::new(vec![1.0, 2.0, 3.0])).unwrap();
    s.route(sig, Route::list(vec![2, 0])).unwrap();
    assert_eq!(s.routing(sig).unwrap(), &[2, 0, 2]);
}

#[test]
/// A negative channel binding is a permutation of the non-negative
/// binding's channel set, fixed after bind.
fn negative_channel_is_a_permutation() {
    let mut s = quad_server();
    let sig = s.add(Sig::new(vec![1.0, 2.0, 3.0, 4.0])).unwrap();
    s.route(sig, Route::spread(1)).unwrap();
    let mut assigned: Vec<usize> = s.routing(sig).unwrap().to_vec();
    assigned.sort_unstable();
    assert_eq!(assigned, vec![0, 1, 2, 3]);

    // Fixed for the node's lifetime: the assignment does not change
    // from block to block.
    let before = s.routing(sig).unwrap().to_vec();
    for _ in 0..8 {
        s.process_block().unwrap();
    }
    assert_eq!(s.routing(sig).unwrap(), &before[..]);
}

#[test]
fn nodes_on_same_channel_are_summed() {
    let mut s = mono_server();
    let a = s.add(Sig::new(0.25)).unwrap();
    let b = s.add(Sig::new(0.5)).unwrap();
    s.route(a, Route::default()).unwrap();
    s.route(b, Route::default()).unwrap();
    s.process_block().unwrap();
    assert!(s.output()[0].iter().all(|&v| (v - 0.75).abs() < 1e-6));
}

#[test]
/// The metro's trigger is Fired for exactly one block per event.
fn metro_fires_on_the_grid() {
    let mut s = mono_server();
    // 3.75 blocks' worth of seconds quantizes to a 4-block period.
    let period = 3.75 * 64.0 / 44100.0;
    let metro = s.add(Metro::new(period)).unwrap();

    let mut fired_blocks = Vec::new();
    for block in 0..12 {
        s.process_block().unwrap();
        if s.trigger_fired(metro).unwrap() {
            fired_blocks.push(block);
        }
    }
    assert_eq!(fired_blocks, vec![0, 4, 8]);
    assert_eq!(s.trigger_count(metro).unwrap(), 3);
}

#[test]
/// A listener's callback runs exactly once per observed event, and its
/// side effects land in the same block for downstream nodes.
fn trig_func_fires_once_per_event() {
    let mut s = mono_server();
    let period = 3.75 * 64.0 / 44100.0;
    let metro = s.add(Metro::new(period)).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_in_cb = hits.clone();
    s.add(TrigFunc::new(metro, move |_ctl| {
        hits_in_cb.fetch_add(1, Ordering::Relaxed);
    }))
    .unwrap();

    for _ in 0..12 {
        s.process_block().unwrap();
    }
    assert_eq!(hits.load(Ordering::Relaxed), 3);
}

#[test]
fn listener_side_effects_drive_reactive_chains() {
    let mut s = mono_server();
    let period = 3.75 * 64.0 / 44100.0;
    let metro = s.add(Metro::new(period)).unwrap();
    let level = s.add(Sig::new(0.0)).unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    let c = counter.clone();
    s.add(TrigFunc::new(metro, move |ctl| {
        let n = c.fetch_add(1, Ordering::Relaxed) + 1;
        ctl.set_param(level, "value", n as f32).unwrap();
    }))
    .unwrap();

    s.process_block().unwrap();
    // The callback ran in block 0 but `level` computes before the
    // listener in registration order, so its stream catches up in the
    // next block.
    s.process_block().unwrap();
    assert_eq!(s.get(level, 0).unwrap(), 1.0);
}

#[test]
/// Recording then reading back reproduces the source outside the fade
/// regions; the recorder's trigger fires once at end of pass.
fn record_then_read_round_trip() {
    let mut s = mono_server();
    let table = s.new_table(256, 1).unwrap();
    let src = s.add(Sig::new(0.7)).unwrap();
    let rec = s.add(TableRec::new(src, table)).unwrap();
    s.play(rec).unwrap();

    for _ in 0..4 {
        s.process_block().unwrap();
    }
    assert_eq!(s.trigger_count(rec).unwrap(), 1);
    assert!(s
        .table(table)
        .unwrap()
        .channel(0)
        .iter()
        .all(|&v| (v - 0.7).abs() < 1e-6));

    // One more pass does not re-fire on a held state.
    s.process_block().unwrap();
    assert_eq!(s.trigger_count(rec).unwrap(), 1);

    let play = s.add(TablePlay::new(table)).unwrap();
    s.play(play).unwrap();
    s.process_block().unwrap();
    assert!((s.get(play, 0).unwrap() - 0.7).abs() < 1e-6);
}

#[test]
fn record_with_fade_stays_inside_the_envelope() {
    let mut s = mono_server();
    let table = s.new_table(256, 1).unwrap();
    let src = s.add(Sig::new(1.0)).unwrap();
    let fade = 64.0 / 44100.0; // one block of fade
    let rec = s.add(TableRec::new(src, table).fade(fade)).unwrap();
    s.play(rec).unwrap();
    for _ in 0..4 {
        s.process_block().unwrap();
    }
    let t = s.table(table).unwrap();
    let ch = t.channel(0);
    // Fade-in starts from silence, the middle is the plain source.
    assert!(ch[0].abs() < 1e-3);
    assert!((ch[128] - 1.0).abs() < 1e-6);
    assert!(ch[1] < ch[32]);
}

#[test]
fn overdub_mixes_at_feedback() {
    let mut s = mono_server();
    let table = s.new_table(256, 1).unwrap();
    {
        let t = s.table_mut(table).unwrap();
        for v in t.channel_mut(0).iter_mut() {
            *v = 1.0;
        }
    }
    let src = s.add(Sig::new(0.25)).unwrap();
    let rec = s.add(TableRec::new(src, table).overdub(0.5)).unwrap();
    s.play(rec).unwrap();
    for _ in 0..4 {
        s.process_block().unwrap();
    }
    // old * 0.5 + new = 0.75
    assert!(s
        .table(table)
        .unwrap()
        .channel(0)
        .iter()
        .all(|&v| (v - 0.75).abs() < 1e-6));
}

#[test]
fn morph_node_tracks_position_and_sources() {
    let mut s = mono_server();
    let a = s.add_table(Table::from_frames(vec![vec![0.0; 32]], 44100.0).unwrap());
    let b = s.add_table(Table::from_frames(vec![vec![1.0; 32]], 44100.0).unwrap());
    let dest = s.new_table(32, 1).unwrap();
    let morph = s.add(TableMorph::new(0.5, dest, vec![a, b])).unwrap();

    s.process_block().unwrap();
    assert!(s
        .table(dest)
        .unwrap()
        .channel(0)
        .iter()
        .all(|&v| (v - 0.5).abs() < 1e-6));

    // Unchanged position and sources: no recompute.
    let v0 = s.table(dest).unwrap().version();
    s.process_block().unwrap();
    assert_eq!(s.table(dest).unwrap().version(), v0);

    // Position change recomputes to the far source.
    s.set_param(morph, "pos", 1.0).unwrap();
    s.process_block().unwrap();
    assert!(s
        .table(dest)
        .unwrap()
        .channel(0)
        .iter()
        .all(|&v| (v - 1.0).abs() < 1e-6));

    // Editing a source recomputes too.
    s.set_param(morph, "pos", 0.0).unwrap();
    s.process_block().unwrap();
    s.table_mut(a).unwrap().set_sample(0, 7, 0.9);
    s.process_block().unwrap();
    assert!((s.table(dest).unwrap().channel(0)[7] - 0.9).abs() < 1e-6);
}

#[test]
fn wavetable_osc_reads_the_sine_table() {
    let mut s = mono_server();
    let table = s.add_table(Table::sine(8192, 44100.0).unwrap());
    // One cycle per block.
    let osc = s.add(Osc::new(table).freq(44100.0 / 64.0)).unwrap();
    s.route(osc, Route::default()).unwrap();
    s.process_block().unwrap();
    let out = &s.output()[0];
    // Quarter cycle peak, half cycle zero crossing.
    assert!((out[16] - 1.0).abs() < 1e-2);
    assert!(out[32].abs() < 1e-2);
}

#[test]
fn port_slews_toward_the_target() {
    let mut s = mono_server();
    let step = s.add(Sig::new(1.0)).unwrap();
    let port = s.add(Port::new(step).risetime(0.1).falltime(0.1)).unwrap();
    s.process_block().unwrap();
    let after_one_block = s.get(port, 0).unwrap();
    assert!(after_one_block > 0.0 && after_one_block < 0.1);
    for _ in 0..800 {
        s.process_block().unwrap();
    }
    assert!((s.get(port, 0).unwrap() - 1.0).abs() < 1e-3);
}

#[test]
fn stream_access_out_of_arity_range_is_an_error() {
    let mut s = mono_server();
    let sig = s.add(Sig::new(vec![1.0, 2.0])).unwrap();
    assert!(matches!(
        s.get(sig, 2),
        Err(GraphError::StreamOutOfRange { arity: 2, .. })
    ));
}

#[test]
fn cyclic_binding_is_rejected() {
    let mut s = mono_server();
    let a = s.add(Sig::new(0.0)).unwrap();
    let b = s.add(Sig::new(a)).unwrap();
    assert_eq!(
        s.set_param(a, "value", b),
        Err(GraphError::CyclicDependency)
    );
    // Self-reference is the one-node cycle.
    assert_eq!(
        s.set_param(a, "value", a),
        Err(GraphError::CyclicDependency)
    );
}

#[test]
fn rebinding_a_list_keeps_arity() {
    let mut s = mono_server();
    let sig = s.add(Sig::new(vec![1.0, 2.0, 3.0])).unwrap();
    s.set_param(sig, "value", vec![9.0]).unwrap();
    assert_eq!(s.arity(sig).unwrap(), 3);
    s.process_block().unwrap();
    // The shorter list wraps over the existing streams.
    assert_eq!(s.get(sig, 0).unwrap(), 9.0);
    assert_eq!(s.get(sig, 2).unwrap(), 9.0);
}

#[test]
/// A faulting node is skipped, its output held, and the clock keeps
/// running.
fn node_fault_is_isolated() {
    let mut s = mono_server();
    let table = s.add_table(Table::sine(512, 44100.0).unwrap());
    let osc = s.add(Osc::new(table).freq(689.0625)).unwrap(); // exactly one cycle per block
    s.route(osc, Route::default()).unwrap();

    s.process_block().unwrap();
    let held = s.get(osc, 0).unwrap();
    assert_eq!(s.fault_count(), 0);

    s.tables_mut().remove(table);
    s.process_block().unwrap();
    s.process_block().unwrap();
    assert_eq!(s.fault_count(), 2);
    // Streams held at their last value.
    assert_eq!(s.get(osc, 0).unwrap(), held);
}

#[test]
fn control_handle_mutations_wait_for_the_block_boundary() {
    let mut s = mono_server();
    let sig = s.add(Sig::new(1.0)).unwrap();
    let mut handle = s.handle().unwrap();

    s.process_block().unwrap();
    assert_eq!(s.get(sig, 0).unwrap(), 1.0);

    handle.set_param(sig, "value", 2.0).unwrap();
    // Not applied yet: no block boundary has passed.
    assert_eq!(s.get(sig, 0).unwrap(), 1.0);

    s.process_block().unwrap();
    assert_eq!(s.get(sig, 0).unwrap(), 2.0);
}

#[test]
fn control_handle_can_add_and_route_nodes() {
    let mut s = mono_server();
    let mut handle = s.handle().unwrap();
    let sig = handle.add(Sig::new(0.25)).unwrap();
    handle.route(sig, Route::default()).unwrap();
    s.process_block().unwrap();
    assert!(s.output()[0].iter().all(|&v| v == 0.25));
}

#[test]
fn duplex_input_passes_through() {
    let mut s = Server::new(ServerConfig {
        sample_rate: 44100.0,
        channels: 1,
        block_size: 64,
        duplex: true,
    })
    .unwrap();
    let ramp: Vec<f32> = (0..64).map(|i| i as f32 / 64.0).collect();
    s.boot(Box::new(OfflineBackend::new().with_input(ramp.clone())))
        .unwrap();
    s.start().unwrap();

    let input = s.add(Input::new()).unwrap();
    s.route(input, Route::default()).unwrap();
    s.process_block().unwrap();
    let out = &s.output()[0];
    for (o, r) in out.iter().zip(ramp.iter()) {
        assert!((o - r).abs() < 1e-6);
    }
}

#[test]
fn stopped_server_computes_nothing() {
    let mut s = mono_server();
    let sig = s.add(Sig::new(1.0)).unwrap();
    s.route(sig, Route::default()).unwrap();
    s.process_block().unwrap();
    assert_eq!(s.blocks_processed(), 1);

    s.stop();
    s.process_block().unwrap();
    assert_eq!(s.blocks_processed(), 1);
}

#[test]
fn removed_dependency_reads_as_silence() {
    let mut s = mono_server();
    let a = s.add(Sig::new(0.5)).unwrap();
    let follow = s.add(Sig::new(a)).unwrap();
    s.process_block().unwrap();
    assert_eq!(s.get(follow, 0).unwrap(), 0.5);

    s.remove(a).unwrap();
    s.process_block().unwrap();
    assert_eq!(s.get(follow, 0).unwrap(), 0.0);
}

#[test]
/// Matrix recording fills rows sequentially and fires its trigger once
/// at completion.
fn matrix_records_row_by_row() {
    let mut s = mono_server();
    // 2 rows x 64 columns: one block per row.
    let m = s.new_matrix(2, 64).unwrap();
    let ramp = s.add(Phasor::new().freq(44100.0 / 64.0)).unwrap();
    let rec = s.add(MatrixRec::new(ramp, m)).unwrap();
    s.play(rec).unwrap();

    s.process_block().unwrap();
    assert_eq!(s.trigger_count(rec).unwrap(), 0);
    {
        let matrix = s.matrix(m).unwrap();
        // Row 0 carries the first ramp cycle, row 1 is still empty.
        assert!(matrix.get(0, 32) > 0.4);
        assert_eq!(matrix.get(1, 32), 0.0);
    }

    s.process_block().unwrap();
    assert_eq!(s.trigger_count(rec).unwrap(), 1);
    assert!(s.matrix(m).unwrap().get(1, 32) > 0.4);

    // Completed: further blocks record nothing and do not re-fire.
    s.process_block().unwrap();
    assert_eq!(s.trigger_count(rec).unwrap(), 1);
}

#[test]
fn matrix_read_interpolates_the_terrain() {
    let mut s = mono_server();
    let m = s.new_matrix(2, 2).unwrap();
    {
        let matrix = s.matrix_mut(m).unwrap();
        matrix.set(0, 0, 0.0);
        matrix.set(0, 1, 1.0);
        matrix.set(1, 0, 1.0);
        matrix.set(1, 1, 1.0);
    }
    let read = s
        .add(
            MatrixRead::new(m)
                .x(0.5)
                .y(0.5)
                .mode(strom::AddressMode::Clamp),
        )
        .unwrap();
    s.process_block().unwrap();
    assert!((s.get(read, 0).unwrap() - 0.75).abs() < 1e-6);
}

#[cfg(feature = "wav_codec")]
#[test]
fn wav_round_trip_through_a_table() {
    use strom::codec::{self, SampleFormat, SoundData};

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("loop.wav");

    let samples: Vec<f32> = (0..441).map(|i| (i as f32 / 441.0) - 0.5).collect();
    let data = SoundData {
        samples: samples.clone(),
        sample_rate: 44100,
        channels: 1,
    };
    codec::save(&path, &data, SampleFormat::Float32).unwrap();

    let loaded = codec::load(&path).unwrap();
    assert_eq!(loaded.sample_rate, 44100);
    assert_eq!(loaded.channels, 1);
    for (a, b) in loaded.samples.iter().zip(samples.iter()) {
        assert!((a - b).abs() < 1e-6);
    }

    let table = loaded.to_table().unwrap();
    assert_eq!(table.len(), 441);
    assert_eq!(table.chnls(), 1);
}

#[test]
fn offline_backend_captures_interleaved_frames() {
    let mut s = Server::new(ServerConfig {
        sample_rate: 44100.0,
        channels: 2,
        block_size: 64,
        duplex: false,
    })
    .unwrap();
    s.boot(Box::new(OfflineBackend::new())).unwrap();
    s.start().unwrap();
    let sig = s.add(Sig::new(vec![0.25, 0.5])).unwrap();
    s.route(sig, Route::default()).unwrap();
    let rendered = s.render(2).unwrap();
    assert_eq!(rendered.len(), 2 * 64 * 2);
    assert_eq!(rendered[0], 0.25);
    assert_eq!(rendered[1], 0.5);
}
