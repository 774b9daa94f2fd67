use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn generate_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let pattern = b"This is a test pattern that repeats. Lorem ipsum dolor sit amet. ";
    for _ in 0..(size / pattern.len() + 1) {
        data.extend_from_slice(pattern);
    }
    data.truncate(size);
    data
}

#[cfg(feature = "encryption")]
fn bench_encryption(c: &mut Criterion) {
    use zipcore::{
        source::{mem::BufferSource, wrap},
        Archive, CompressionMethod, EncryptionMethod,
    };

    let sizes = vec![1024, 10 * 1024, 100 * 1024, 1024 * 1024];

    let mut group = c.benchmark_group("encryption_overhead");

    for size in sizes {
        let data = generate_data(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("no_encryption", size), &data, |b, data| {
            b.iter(|| {
                let mut archive = Archive::create_in_memory();
                let idx = archive.add(b"test.txt", wrap(BufferSource::new(data.to_vec()))).unwrap();
                archive.set_compression(idx, CompressionMethod::Store, 0).unwrap();
                archive.close().unwrap();
            });
        });

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("aes256_encryption", size), &data, |b, data| {
            b.iter(|| {
                let mut archive = Archive::create_in_memory();
                let idx = archive.add(b"test.txt", wrap(BufferSource::new(black_box(data).clone()))).unwrap();
                archive.set_compression(idx, CompressionMethod::Store, 0).unwrap();
                archive
                    .set_encryption(idx, EncryptionMethod::Aes256, Some("benchmark_password_123".to_string()))
                    .unwrap();
                archive.close().unwrap();
            });
        });
    }

    group.finish();
}

#[cfg(feature = "encryption")]
fn bench_memory_usage(c: &mut Criterion) {
    use zipcore::{
        source::{mem::BufferSource, wrap},
        Archive, CompressionMethod, EncryptionMethod,
    };

    let mut group = c.benchmark_group("memory_usage");
    let large_data = generate_data(10 * 1024 * 1024);

    group.bench_function("10mb_no_encryption", |b| {
        b.iter(|| {
            let mut archive = Archive::create_in_memory();
            let idx = archive.add(b"large.txt", wrap(BufferSource::new(black_box(&large_data).clone()))).unwrap();
            archive.set_compression(idx, CompressionMethod::Store, 0).unwrap();
            archive.close().unwrap();
        });
    });

    group.bench_function("10mb_aes256_encryption", |b| {
        b.iter(|| {
            let mut archive = Archive::create_in_memory();
            let idx = archive.add(b"large.txt", wrap(BufferSource::new(black_box(&large_data).clone()))).unwrap();
            archive.set_compression(idx, CompressionMethod::Store, 0).unwrap();
            archive.set_encryption(idx, EncryptionMethod::Aes256, Some("test_password".to_string())).unwrap();
            archive.close().unwrap();
        });
    });

    group.finish();
}

#[cfg(feature = "encryption")]
fn bench_pbkdf2_overhead(c: &mut Criterion) {
    use zipcore::crypto::winzip_aes;
    use zipcore::EncryptionMethod;

    let mut group = c.benchmark_group("key_derivation");

    group.bench_function("pbkdf2_1000_iterations", |b| {
        b.iter(|| winzip_aes::encrypt(EncryptionMethod::Aes256, black_box("test_password_123"), b"x").unwrap());
    });

    group.finish();
}

#[cfg(not(feature = "encryption"))]
fn bench_encryption(_c: &mut Criterion) {}

#[cfg(not(feature = "encryption"))]
fn bench_memory_usage(_c: &mut Criterion) {}

#[cfg(not(feature = "encryption"))]
fn bench_pbkdf2_overhead(_c: &mut Criterion) {}

criterion_group!(benches, bench_encryption, bench_memory_usage, bench_pbkdf2_overhead);
criterion_main!(benches);
