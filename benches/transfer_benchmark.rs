//! Performance benchmarks for jarvis-transfer
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use jarvis_transfer::fs::LocalCopier;
use jarvis_transfer::network::{encode_header, LanReceiver, LanSender};
use std::fs::File;
use std::io::Write;
use tempfile::TempDir;

/// Create a test file of the specified size
fn create_test_file(dir: &std::path::Path, name: &str, size: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();

    let chunk_size = 64 * 1024;
    let chunk: Vec<u8> = (0..chunk_size).map(|i| (i % 256) as u8).collect();
    let mut remaining = size;

    while remaining > 0 {
        let to_write = remaining.min(chunk_size);
        file.write_all(&chunk[..to_write]).unwrap();
        remaining -= to_write;
    }

    path
}

fn bench_local_tree_copy(c: &mut Criterion) {
    let src_dir = TempDir::new().unwrap();
    let dst_dir = TempDir::new().unwrap();

    // 10 directories of 10 small files
    for i in 0..10 {
        let subdir = src_dir.path().join(format!("subdir_{}", i));
        std::fs::create_dir_all(&subdir).unwrap();
        for j in 0..10 {
            create_test_file(&subdir, &format!("file_{}.txt", j), 1024);
        }
    }

    let copier = LocalCopier::default();

    c.bench_function("local_copy_100_small_files", |b| {
        b.iter(|| black_box(copier.copy(src_dir.path(), dst_dir.path()).unwrap()));
    });
}

fn bench_local_large_file(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_large_file");

    for size in [1024 * 1024, 10 * 1024 * 1024].iter() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let src_file = create_test_file(src_dir.path(), "large.bin", *size);
        let copier = LocalCopier::default();

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(
            BenchmarkId::new("copy", humansize::format_size(*size as u64, humansize::BINARY)),
            size,
            |b, _| {
                let dst_file = dst_dir.path().join("large.bin");
                b.iter(|| {
                    let _ = black_box(copier.copy(&src_file, &dst_file));
                    let _ = std::fs::remove_file(&dst_file);
                });
            },
        );
    }

    group.finish();
}

fn bench_lan_loopback(c: &mut Criterion) {
    let mut group = c.benchmark_group("lan_loopback");
    group.sample_size(20);

    for size in [64 * 1024, 4 * 1024 * 1024].iter() {
        let src_dir = TempDir::new().unwrap();
        let save_dir = TempDir::new().unwrap();
        let src_file = create_test_file(src_dir.path(), "payload.bin", *size);

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(
            BenchmarkId::new("send", humansize::format_size(*size as u64, humansize::BINARY)),
            size,
            |b, _| {
                b.iter(|| {
                    let receiver = LanReceiver::bind("127.0.0.1:0").unwrap();
                    let port = receiver.local_addr().unwrap().port();
                    let save_path = save_dir.path().to_path_buf();
                    let handle = std::thread::spawn(move || receiver.receive(&save_path));

                    let sent = LanSender::new()
                        .with_port(port)
                        .send(&src_file, "127.0.0.1")
                        .unwrap();
                    handle.join().unwrap().unwrap();
                    black_box(sent)
                });
            },
        );
    }

    group.finish();
}

fn bench_header_encode(c: &mut Criterion) {
    c.bench_function("encode_header", |b| {
        b.iter(|| black_box(encode_header(black_box("quarterly-report-final.pdf"), 1_234_567)))
    });
}

criterion_group!(
    benches,
    bench_local_tree_copy,
    bench_local_large_file,
    bench_lan_loopback,
    bench_header_encode
);

criterion_main!(benches);
