#[cfg(test)]
mod run_tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Arc;

    use accel_gzip_core::backend::{BackendError, CompressedBlock, CompressionBackend, ReferenceBackend};
    use accel_gzip_core::config::{RunConfig, VerifyPolicy};
    use accel_gzip_core::constants::NATIVE_VECTOR_WIDTH;
    use accel_gzip_core::crc::{aligned_prefix_len, crc32};
    use accel_gzip_core::gzip::{ArtifactVerifier, GzipVerifier, VerifyError};
    use accel_gzip_core::memory::{Allocator, BufferLayout, LimitedAllocator, PoolError};
    use accel_gzip_core::run::Runner;
    use accel_gzip_core::substrate::{Device, DeviceCaps};
    use accel_gzip_core::telemetry::Stage;
    use accel_gzip_core::types::AccelError;
    use accel_gzip_core::utils::output_file_names;
    use rand::{rngs::StdRng, RngCore, SeedableRng};
    use tempfile::TempDir;

    fn repeated_text(len: usize) -> Vec<u8> {
        b"The quick brown fox jumps over the lazy dog. 0123456789\n"
            .iter()
            .copied()
            .cycle()
            .take(len)
            .collect()
    }

    fn write_input(dir: &TempDir, data: &[u8]) -> PathBuf {
        let path = dir.path().join("input.bin");
        fs::write(&path, data).unwrap();
        path
    }

    fn outputs(dir: &TempDir, engines: usize) -> Vec<PathBuf> {
        output_file_names(&dir.path().join("out.gz"), engines)
    }

    fn config(engines: usize, iterations: usize) -> RunConfig {
        let mut cfg = RunConfig::measure(iterations).with_engines(engines);
        cfg.executor_threads = Some(4);
        cfg
    }

    /// Claims one byte more than it was given.
    struct OversizeBackend;

    impl CompressionBackend for OversizeBackend {
        fn name(&self) -> &str {
            "oversize"
        }

        fn crc_block_size(&self) -> usize {
            NATIVE_VECTOR_WIDTH
        }

        fn compress(&self, input: &[u8]) -> Result<CompressedBlock, BackendError> {
            let aligned = aligned_prefix_len(input.len(), NATIVE_VECTOR_WIDTH);
            Ok(CompressedBlock {
                data: vec![0u8; input.len() + 1],
                partial_crc: crc32(&input[..aligned]),
                sub_stages: Default::default(),
            })
        }
    }

    /// Correct output, but a different partial CRC on every call.
    #[derive(Default)]
    struct DriftingCrcBackend {
        calls: AtomicU32,
        inner: ReferenceBackend,
    }

    impl CompressionBackend for DriftingCrcBackend {
        fn name(&self) -> &str {
            "drifting"
        }

        fn crc_block_size(&self) -> usize {
            self.inner.crc_block_size()
        }

        fn compress(&self, input: &[u8]) -> Result<CompressedBlock, BackendError> {
            let mut block = self.inner.compress(input)?;
            block.partial_crc ^= self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(block)
        }
    }

    /// Level 1 on its first call, level 9 afterwards: same input CRC, a
    /// different compressed size.
    struct DriftingLevelBackend {
        calls: AtomicU32,
        fast: ReferenceBackend,
        best: ReferenceBackend,
    }

    impl DriftingLevelBackend {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fast: ReferenceBackend::new(1),
                best: ReferenceBackend::new(9),
            }
        }
    }

    impl CompressionBackend for DriftingLevelBackend {
        fn name(&self) -> &str {
            "drifting-level"
        }

        fn crc_block_size(&self) -> usize {
            self.best.crc_block_size()
        }

        fn compress(&self, input: &[u8]) -> Result<CompressedBlock, BackendError> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => self.fast.compress(input),
                _ => self.best.compress(input),
            }
        }
    }

    #[derive(Default)]
    struct CountingVerifier {
        calls: AtomicUsize,
    }

    impl ArtifactVerifier for CountingVerifier {
        fn verify(&self, artifact: &Path, original: &Path) -> Result<(), VerifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            GzipVerifier.verify(artifact, original)
        }
    }

    #[test]
    fn repeated_text_compresses_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let data = repeated_text(10 * 1024 * 1024);
        let input = write_input(&dir, &data);
        let outs = outputs(&dir, 1);

        let device = Device::emulator(4).unwrap();
        let summary = Runner::new(&device, Arc::new(ReferenceBackend::default()))
            .compress_file(&input, &outs, &config(1, 3))
            .unwrap();

        assert!(summary.passed);
        let report = summary.report.as_ref().unwrap();
        assert!(report.ratio_percent() < 50.0, "ratio {}", report.ratio_percent());
        assert!(report.total_gbps > 0.0);
        assert!(report.engines[0].stage_gbps.contains_key(&Stage::Deflate));

        let engine = &summary.engines[0];
        assert_eq!(engine.counters.iterations, 3);
        assert_eq!(engine.final_crc, crc32(&data));
        assert_eq!(engine.total_compressed(), 3 * engine.compressed_size);

        assert_eq!(GzipVerifier::decompress(&outs[0]).unwrap(), data);
        assert_eq!(device.allocator().ledger().total_live_bytes(), 0);
    }

    #[test]
    fn random_input_fails_size_invariant() {
        let dir = TempDir::new().unwrap();
        let mut data = vec![0u8; 1024 * 1024];
        StdRng::seed_from_u64(0x5eed).fill_bytes(&mut data);
        let input = write_input(&dir, &data);
        let outs = outputs(&dir, 2);

        let device = Device::emulator(4).unwrap();
        let err = Runner::new(&device, Arc::new(ReferenceBackend::default()))
            .compress_file(&input, &outs, &config(2, 5))
            .unwrap_err();

        match err {
            AccelError::ContractViolation { compressed, input, .. } => assert!(compressed > input as u64),
            other => panic!("unexpected {other:?}"),
        }
        assert!(outs.iter().all(|p| !p.exists()));
    }

    #[test]
    fn stub_violating_size_contract_fails_run() {
        let dir = TempDir::new().unwrap();
        let input = write_input(&dir, &repeated_text(4096));
        let verifier = Arc::new(CountingVerifier::default());

        let device = Device::emulator(2).unwrap();
        let err = Runner::new(&device, Arc::new(OversizeBackend))
            .with_verifier(verifier.clone())
            .compress_file(&input, &outputs(&dir, 1), &config(1, 4))
            .unwrap_err();

        assert!(matches!(err, AccelError::ContractViolation { engine: 0, iteration: 0, .. }));
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn drifting_crc_is_rejected() {
        let dir = TempDir::new().unwrap();
        let input = write_input(&dir, &repeated_text(4096));

        let device = Device::emulator(2).unwrap();
        let err = Runner::new(&device, Arc::new(DriftingCrcBackend::default()))
            .compress_file(&input, &outputs(&dir, 1), &config(1, 3))
            .unwrap_err();
        assert!(matches!(err, AccelError::Nondeterministic { engine: 0, .. }), "{err:?}");
    }

    #[test]
    fn size_drift_between_iterations_is_rejected() {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..20_000u32).flat_map(|i| format!("{} ", i * 7919 % 10_007).into_bytes()).collect();
        let fast = ReferenceBackend::new(1).compress(&data).unwrap().data.len();
        let best = ReferenceBackend::new(9).compress(&data).unwrap().data.len();
        assert_ne!(fast, best);

        let input = write_input(&dir, &data);
        let outs = outputs(&dir, 2);
        let mut cfg = config(2, 4);
        cfg.executor_threads = Some(1);
        cfg.verify = VerifyPolicy::AllEngines;

        let device = Device::emulator(1).unwrap();
        let verifier = Arc::new(CountingVerifier::default());
        let err = Runner::new(&device, Arc::new(DriftingLevelBackend::new()))
            .with_verifier(verifier.clone())
            .compress_file(&input, &outs, &cfg)
            .unwrap_err();

        match err {
            AccelError::SizeDrift { expected, got, .. } => assert_ne!(expected, got),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
        assert!(outs.iter().all(|p| !p.exists()));
        assert_eq!(device.allocator().ledger().total_live_bytes(), 0);
    }

    #[test]
    fn minimum_input_size_boundary() {
        let device = Device::emulator(2).unwrap();
        let runner = Runner::new(&device, Arc::new(ReferenceBackend::default()));

        let dir = TempDir::new().unwrap();
        let small = write_input(&dir, &[b'a'; NATIVE_VECTOR_WIDTH]);
        let err = runner.compress_file(&small, &outputs(&dir, 1), &config(1, 1)).unwrap_err();
        assert!(matches!(err, AccelError::InputTooSmall { len: 16, min: 17 }));
        assert_eq!(device.allocator().ledger().total_allocations(), 0);

        let ok = write_input(&dir, &[b'a'; NATIVE_VECTOR_WIDTH + 1]);
        let summary = runner.compress_file(&ok, &outputs(&dir, 1), &config(1, 1)).unwrap();
        assert!(summary.passed);
        assert_eq!(summary.input_len, NATIVE_VECTOR_WIDTH + 1);
    }

    #[test]
    fn allocation_failure_on_second_engine() {
        let dir = TempDir::new().unwrap();
        let len = 64 * 1024;
        let input = write_input(&dir, &repeated_text(len));
        let outs = outputs(&dir, 2);

        let layout = BufferLayout::for_input(len);
        let budget = len + 256 + layout.set_bytes() + layout.set_bytes() / 2;
        let allocator = Arc::new(LimitedAllocator::new(budget));
        let ledger = allocator.ledger().clone();
        let device = Device::new(DeviceCaps::emulator(), allocator, 2).unwrap();
        let verifier = Arc::new(CountingVerifier::default());

        let err = Runner::new(&device, Arc::new(ReferenceBackend::default()))
            .with_verifier(verifier.clone())
            .compress_file(&input, &outs, &config(2, 3))
            .unwrap_err();

        assert!(
            matches!(err, AccelError::Pool(PoolError::SetAllocation { engine: 1, .. })),
            "{err:?}"
        );
        assert_eq!(ledger.total_live_bytes(), 0);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
        assert!(outs.iter().all(|p| !p.exists()));
    }

    #[test]
    fn warmup_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let input = write_input(&dir, &repeated_text(8192));
        let outs = outputs(&dir, 2);

        let device = Device::emulator(2).unwrap();
        let warm = config(2, 5).as_warmup();
        let summary = Runner::new(&device, Arc::new(ReferenceBackend::default()))
            .compress_file(&input, &outs, &warm)
            .unwrap();

        assert_eq!(summary.iterations, 1);
        assert!(summary.report.is_none());
        assert!(summary.artifacts.is_empty());
        assert!(!summary.passed);
        assert!(outs.iter().all(|p| !p.exists()));
    }

    #[test]
    fn single_set_ring_with_many_executors() {
        let dir = TempDir::new().unwrap();
        let data = repeated_text(256 * 1024);
        let input = write_input(&dir, &data);
        let outs = outputs(&dir, 2);

        let mut cfg = config(2, 24);
        cfg.ring_depth = 1;
        cfg.executor_threads = Some(8);
        cfg.verify = VerifyPolicy::AllEngines;

        let device = Device::emulator(8).unwrap();
        let verifier = Arc::new(CountingVerifier::default());
        let summary = Runner::new(&device, Arc::new(ReferenceBackend::default()))
            .with_verifier(verifier.clone())
            .compress_file(&input, &outs, &cfg)
            .unwrap();

        assert!(summary.passed);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 2);
        for engine in &summary.engines {
            assert_eq!(engine.counters.iterations, 24);
            assert_eq!(engine.final_crc, crc32(&data));
        }
    }

    #[test]
    fn benchmark_writes_one_artifact_per_engine() {
        let dir = TempDir::new().unwrap();
        let data = repeated_text(32 * 1024);
        let input = write_input(&dir, &data);
        let outs = outputs(&dir, 3);

        let device = Device::emulator(4).unwrap();
        let summary = Runner::new(&device, Arc::new(ReferenceBackend::default()))
            .run_benchmark(&input, &outs, &config(3, 4), true)
            .unwrap();

        assert!(summary.passed);
        assert_eq!(summary.artifacts, outs);
        assert!(outs[1].to_string_lossy().ends_with("out.gz2"));
        for path in &outs {
            assert_eq!(GzipVerifier::decompress(path).unwrap(), data);
        }
        let report = summary.report.unwrap();
        assert_eq!(report.engines.len(), 3);
        assert!(report.to_string().contains("TP breakdown for engine #2"));
    }

    #[test]
    fn missing_output_paths_are_a_config_error() {
        let dir = TempDir::new().unwrap();
        let input = write_input(&dir, &repeated_text(4096));
        let device = Device::emulator(2).unwrap();
        let err = Runner::new(&device, Arc::new(ReferenceBackend::default()))
            .compress_file(&input, &outputs(&dir, 1), &config(2, 1))
            .unwrap_err();
        assert!(matches!(err, AccelError::Config(_)));
    }
}
