use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::NamedTempFile;
#[cfg(feature = "zstd-support")]
use zipcore::CompressionMethod;
use zipcore::{
    source::{mem::BufferSource, wrap},
    Archive, CompressionMethod as Method, OpenFlags,
};

fn generate_compressible_data(size: usize) -> Vec<u8> {
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    let mut data = Vec::with_capacity(size);
    while data.len() < size {
        data.extend_from_slice(pattern);
    }
    data.truncate(size);
    data
}

fn generate_random_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state = 0x12345678u32;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

fn write_one_entry(path: &std::path::Path, data: &[u8], method: Method, level: u32) {
    let mut archive = Archive::open_with_flags(path, OpenFlags::CREATE).unwrap();
    let idx = archive.add(b"test.bin", wrap(BufferSource::new(data.to_vec()))).unwrap();
    archive.set_compression(idx, method, level).unwrap();
    archive.close().unwrap();
}

fn bench_compression_methods(c: &mut Criterion) {
    let sizes = vec![1024, 10 * 1024, 100 * 1024, 1024 * 1024, 10 * 1024 * 1024];

    for size in sizes {
        let mut group = c.benchmark_group(format!("write_compressible_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));

        let data = generate_compressible_data(size);

        group.bench_with_input(BenchmarkId::new("deflate_level_6", size), &data, |b, data| {
            b.iter(|| {
                let temp = NamedTempFile::new().unwrap();
                write_one_entry(temp.path(), black_box(data), Method::Deflate, 6);
            });
        });

        group.bench_with_input(BenchmarkId::new("deflate_level_9", size), &data, |b, data| {
            b.iter(|| {
                let temp = NamedTempFile::new().unwrap();
                write_one_entry(temp.path(), black_box(data), Method::Deflate, 9);
            });
        });

        #[cfg(feature = "zstd-support")]
        {
            group.bench_with_input(BenchmarkId::new("zstd_level_3", size), &data, |b, data| {
                b.iter(|| {
                    let temp = NamedTempFile::new().unwrap();
                    write_one_entry(temp.path(), black_box(data), CompressionMethod::Zstd, 3);
                });
            });

            group.bench_with_input(BenchmarkId::new("zstd_level_10", size), &data, |b, data| {
                b.iter(|| {
                    let temp = NamedTempFile::new().unwrap();
                    write_one_entry(temp.path(), black_box(data), CompressionMethod::Zstd, 10);
                });
            });
        }

        group.finish();
    }
}

fn bench_random_data_compression(c: &mut Criterion) {
    let sizes = vec![100 * 1024, 1024 * 1024];

    for size in sizes {
        let mut group = c.benchmark_group(format!("write_random_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));

        let data = generate_random_data(size);

        group.bench_with_input(BenchmarkId::new("deflate_level_6", size), &data, |b, data| {
            b.iter(|| {
                let temp = NamedTempFile::new().unwrap();
                write_one_entry(temp.path(), black_box(data), Method::Deflate, 6);
            });
        });

        #[cfg(feature = "zstd-support")]
        group.bench_with_input(BenchmarkId::new("zstd_level_3", size), &data, |b, data| {
            b.iter(|| {
                let temp = NamedTempFile::new().unwrap();
                write_one_entry(temp.path(), black_box(data), CompressionMethod::Zstd, 3);
            });
        });

        group.finish();
    }
}

fn bench_multiple_entries(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_multiple_entries");

    let entry_count = 100;
    let entry_size = 10 * 1024;
    group.throughput(Throughput::Bytes((entry_count * entry_size) as u64));

    let data = generate_compressible_data(entry_size);

    group.bench_function("deflate_100_entries", |b| {
        b.iter(|| {
            let temp = NamedTempFile::new().unwrap();
            let mut archive = Archive::open_with_flags(temp.path(), OpenFlags::CREATE).unwrap();
            for i in 0..entry_count {
                let name = format!("file_{}.txt", i);
                let idx = archive.add(name.as_bytes(), wrap(BufferSource::new(black_box(&data).clone()))).unwrap();
                archive.set_compression(idx, Method::Deflate, 6).unwrap();
            }
            archive.close().unwrap();
        });
    });

    #[cfg(feature = "zstd-support")]
    group.bench_function("zstd_100_entries", |b| {
        b.iter(|| {
            let temp = NamedTempFile::new().unwrap();
            let mut archive = Archive::open_with_flags(temp.path(), OpenFlags::CREATE).unwrap();
            for i in 0..entry_count {
                let name = format!("file_{}.txt", i);
                let idx = archive.add(name.as_bytes(), wrap(BufferSource::new(black_box(&data).clone()))).unwrap();
                archive.set_compression(idx, CompressionMethod::Zstd, 3).unwrap();
            }
            archive.close().unwrap();
        });
    });

    group.finish();
}

fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{}MB", bytes / (1024 * 1024))
    }
}

criterion_group!(benches, bench_compression_methods, bench_random_data_compression, bench_multiple_entries);
criterion_main!(benches);
