//! Hashing and signing stream their input in fixed-size chunks.

use std::io::{self, Read};

use tessera_audit::CallRecord;
use tessera_core::Mode;
use tessera_crypto::{CHUNK_SIZE, ContentHash, ContentHasher};
use tessera_session::{Session, SessionConfig};
use tessera_verify::{Verifier, VerifyOptions};

/// Produces `remaining` pseudo-random bytes and remembers the largest buffer
/// it was ever asked to fill.
struct RecordingReader {
    remaining: u64,
    state: u64,
    max_request: usize,
    reads: u64,
}

impl RecordingReader {
    fn new(len: u64) -> Self {
        Self {
            remaining: len,
            state: 0x9e37_79b9_7f4a_7c15,
            max_request: 0,
            reads: 0,
        }
    }
}

impl Read for RecordingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.max_request = self.max_request.max(buf.len());
        self.reads = self.reads.saturating_add(1);
        let available = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        let n = buf.len().min(available);
        for byte in &mut buf[..n] {
            // xorshift64
            self.state ^= self.state.wrapping_shl(13);
            self.state ^= self.state.wrapping_shr(7);
            self.state ^= self.state.wrapping_shl(17);
            *byte = self.state.to_le_bytes()[0];
        }
        self.remaining = self
            .remaining
            .saturating_sub(u64::try_from(n).unwrap_or(u64::MAX));
        Ok(n)
    }
}

/// 64 MiB.
const STREAM_LEN: u64 = 67_108_864;

#[test]
fn hashing_requests_at_most_one_chunk() {
    let mut reader = RecordingReader::new(STREAM_LEN);
    let (digest, size) = ContentHash::hash_reader(&mut reader).unwrap();

    assert_eq!(size, STREAM_LEN);
    assert!(reader.max_request <= CHUNK_SIZE, "asked for {}", reader.max_request);
    let chunk = u64::try_from(CHUNK_SIZE).unwrap();
    assert!(reader.reads >= STREAM_LEN.div_ceil(chunk));

    let mut replay = RecordingReader::new(STREAM_LEN);
    let mut hasher = ContentHasher::new();
    let mut buf = vec![0u8; 4096];
    loop {
        let n = replay.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    assert_eq!(hasher.finalize(), digest);
}

#[test]
fn streaming_signature_requests_at_most_one_chunk() {
    let identity = tessera_test::keys::persistent_identity();
    let mut reader = RecordingReader::new(STREAM_LEN);
    let (digest, signature) = identity.sign_stream(&mut reader).unwrap();

    assert!(reader.max_request <= CHUNK_SIZE, "asked for {}", reader.max_request);
    assert!(identity.public_key().verify(&digest, &signature));
}

#[cfg(target_os = "linux")]
fn peak_rss_kib() -> u64 {
    let status = std::fs::read_to_string("/proc/self/status").unwrap();
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmHWM:"))
        .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse().ok())
        .unwrap()
}

/// Seals and verifies a 3 GiB artifact. Slow and disk-hungry, so it only
/// runs on request: `cargo test -- --ignored multi_gib`.
#[cfg(target_os = "linux")]
#[test]
#[ignore = "writes and hashes several GiB"]
fn multi_gib_artifact_verifies_in_bounded_memory() {
    const ARTIFACT_LEN: u64 = 3_221_225_472;
    const MAX_GROWTH_KIB: u64 = 262_144;

    let dir = tessera_test::test_dir();
    let source = dir.path().join("weights.bin");
    std::fs::File::create(&source)
        .unwrap()
        .set_len(ARTIFACT_LEN)
        .unwrap();
    let output = dir.path().join("run.zip");

    let before = peak_rss_kib();
    let session = Session::start(
        SessionConfig::new(&output)
            .with_mode(Mode::Normal)
            .with_max_artifact_size(ARTIFACT_LEN),
        tessera_test::keys::persistent_identity(),
    )
    .unwrap();
    session.record(CallRecord::call("train").result("ok")).unwrap();
    let artifact = session.add_artifact(&source, None).unwrap().unwrap();
    assert_eq!(artifact.size, ARTIFACT_LEN);
    session.seal().unwrap();

    let report = Verifier::new(VerifyOptions::new()).verify(&output);
    assert!(report.passed, "{report}");

    let growth = peak_rss_kib().saturating_sub(before);
    assert!(growth < MAX_GROWTH_KIB, "peak RSS grew by {growth} KiB");
}
