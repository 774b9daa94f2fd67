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

fn create_test_zip(data: &[u8], method: Method, level: u32) -> NamedTempFile {
    let temp = NamedTempFile::new().unwrap();
    let mut archive = Archive::open_with_flags(temp.path(), OpenFlags::CREATE).unwrap();
    let idx = archive.add(b"test.bin", wrap(BufferSource::new(data.to_vec()))).unwrap();
    archive.set_compression(idx, method, level).unwrap();
    archive.close().unwrap();
    temp
}

fn read_all_entries(path: &std::path::Path) {
    let archive = Archive::open(path).unwrap();
    let mut buf = Vec::new();
    for i in 0..archive.entry_count() {
        buf = black_box(archive.read(i, None).unwrap());
    }
    black_box(buf);
}

fn bench_read_compressible_data(c: &mut Criterion) {
    let sizes = vec![100 * 1024, 1024 * 1024, 10 * 1024 * 1024];

    for size in sizes {
        let mut group = c.benchmark_group(format!("read_compressible_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));

        let data = generate_compressible_data(size);

        let zip_deflate = create_test_zip(&data, Method::Deflate, 6);
        group.bench_function(BenchmarkId::new("deflate_level_6", size), |b| {
            b.iter(|| read_all_entries(zip_deflate.path()));
        });

        #[cfg(feature = "zstd-support")]
        {
            let zip_zstd = create_test_zip(&data, CompressionMethod::Zstd, 3);
            group.bench_function(BenchmarkId::new("zstd_level_3", size), |b| {
                b.iter(|| read_all_entries(zip_zstd.path()));
            });
        }

        group.finish();
    }
}

fn bench_read_random_data(c: &mut Criterion) {
    let sizes = vec![100 * 1024, 1024 * 1024];

    for size in sizes {
        let mut group = c.benchmark_group(format!("read_random_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));

        let data = generate_random_data(size);

        let zip_deflate = create_test_zip(&data, Method::Deflate, 6);
        group.bench_function(BenchmarkId::new("deflate_level_6", size), |b| {
            b.iter(|| read_all_entries(zip_deflate.path()));
        });

        #[cfg(feature = "zstd-support")]
        {
            let zip_zstd = create_test_zip(&data, CompressionMethod::Zstd, 3);
            group.bench_function(BenchmarkId::new("zstd_level_3", size), |b| {
                b.iter(|| read_all_entries(zip_zstd.path()));
            });
        }

        group.finish();
    }
}

fn bench_read_multiple_entries(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_multiple_entries");

    let entry_count = 100;
    let entry_size = 10 * 1024;
    group.throughput(Throughput::Bytes((entry_count * entry_size) as u64));

    let data = generate_compressible_data(entry_size);

    let temp_deflate = NamedTempFile::new().unwrap();
    {
        let mut archive = Archive::open_with_flags(temp_deflate.path(), OpenFlags::CREATE).unwrap();
        for i in 0..entry_count {
            let name = format!("file_{}.txt", i);
            let idx = archive.add(name.as_bytes(), wrap(BufferSource::new(data.clone()))).unwrap();
            archive.set_compression(idx, Method::Deflate, 6).unwrap();
        }
        archive.close().unwrap();
    }

    group.bench_function("deflate_100_entries", |b| {
        b.iter(|| read_all_entries(temp_deflate.path()));
    });

    #[cfg(feature = "zstd-support")]
    {
        let temp_zstd = NamedTempFile::new().unwrap();
        {
            let mut archive = Archive::open_with_flags(temp_zstd.path(), OpenFlags::CREATE).unwrap();
            for i in 0..entry_count {
                let name = format!("file_{}.txt", i);
                let idx = archive.add(name.as_bytes(), wrap(BufferSource::new(data.clone()))).unwrap();
                archive.set_compression(idx, CompressionMethod::Zstd, 3).unwrap();
            }
            archive.close().unwrap();
        }

        group.bench_function("zstd_100_entries", |b| {
            b.iter(|| read_all_entries(temp_zstd.path()));
        });
    }

    group.finish();
}

fn bench_read_streaming_vs_full(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_method_comparison");

    let size = 1024 * 1024;
    let data = generate_compressible_data(size);
    group.throughput(Throughput::Bytes(size as u64));

    let zip_file = create_test_zip(&data, Method::Deflate, 6);

    group.bench_function("full_read", |b| {
        b.iter(|| read_all_entries(zip_file.path()));
    });

    group.bench_function("range_read", |b| {
        b.iter(|| {
            let archive = Archive::open(zip_file.path()).unwrap();
            for i in 0..archive.entry_count() {
                let stat = archive.stat(i).unwrap();
                if stat.method == Method::Store {
                    black_box(archive.read_range(i, 0, stat.size).unwrap());
                }
            }
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

criterion_group!(
    benches,
    bench_read_compressible_data,
    bench_read_random_data,
    bench_read_multiple_entries,
    bench_read_streaming_vs_full
);
criterion_main!(benches);
