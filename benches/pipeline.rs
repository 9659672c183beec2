use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ws_audio_api::audio::AudioQueue;
use ws_audio_api::codec::{OpusDecoder, OpusEncoder, Resampler};
use ws_audio_api::config::CodecConfig;

fn tone(len: usize) -> Vec<f32> {
    (0..len).map(|i| (i as f32 * 0.0627).sin() * 0.5).collect()
}

fn bench_resampler(c: &mut Criterion) {
    let block = tone(4096);
    let mut down = Resampler::new(44100, 24000, 1, 4096);
    c.bench_function("resample_44100_to_24000_block", |b| {
        b.iter(|| black_box(down.resample(black_box(&block))))
    });

    let frame = tone(480);
    let mut up = Resampler::new(24000, 48000, 1, 480);
    c.bench_function("resample_24000_to_48000_frame", |b| {
        b.iter(|| black_box(up.resample(black_box(&frame))))
    });
}

fn bench_codec(c: &mut Criterion) {
    let config = CodecConfig::default();
    let mut encoder = OpusEncoder::new(&config).unwrap();
    let block = tone(4096);
    c.bench_function("encode_block", |b| {
        b.iter(|| black_box(encoder.encode_float(black_box(&block)).unwrap()))
    });

    let packets = OpusEncoder::new(&config)
        .unwrap()
        .encode_float(&tone(480))
        .unwrap();
    let mut decoder = OpusDecoder::new(config.sample_rate, config.channels).unwrap();
    c.bench_function("decode_frame", |b| {
        b.iter(|| black_box(decoder.decode_float(black_box(&packets[0])).unwrap()))
    });
}

fn bench_queue(c: &mut Criterion) {
    let frame = tone(882);
    let queue = AudioQueue::new(44100);
    let mut out = vec![0.0f32; 4096];
    c.bench_function("queue_write_read", |b| {
        b.iter(|| {
            for _ in 0..5 {
                queue.write(black_box(&frame));
            }
            queue.read_into(black_box(&mut out));
        })
    });
}

criterion_group!(benches, bench_resampler, bench_codec, bench_queue);
criterion_main!(benches);
