use std::process::Command;
use tempfile::tempdir;

// Writes a ZIP using the library and then calls `unzip -t` to verify
// compatibility with a real-world reader. Skipped if `unzip` isn't
// installed.

#[test]
fn unzip_compatibility() {
    use zipcore::source::{mem::BufferSource, wrap};
    use zipcore::{Archive, OpenFlags};

    let check = Command::new("unzip").arg("-v").output();
    if check.is_err() {
        eprintln!("skipping test: `unzip` not found");
        return;
    }

    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("compat.zip");

    {
        let mut archive = Archive::open_with_flags(&zip_path, OpenFlags::CREATE).unwrap();
        archive.add(b"hello.txt", wrap(BufferSource::new(b"hello from test".to_vec()))).unwrap();

        let mut big = Vec::with_capacity(1024 * 1024);
        for _ in 0..1024 {
            big.extend_from_slice(&[0u8; 1024]);
        }
        archive.add(b"big.bin", wrap(BufferSource::new(big))).unwrap();

        archive.close().unwrap();
    }

    let output = Command::new("unzip")
        .arg("-t")
        .arg(&zip_path)
        .output()
        .expect("failed to run unzip");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "unzip reported failure: {} {}",
        stdout,
        stderr
    );
}
