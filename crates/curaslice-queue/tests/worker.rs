//! End-to-end tests of dispatcher, worker and engine session.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use curaslice_engine::fs::FsResult;
use curaslice_engine::{
    BuiltinDefinitions, EngineError, EngineFactory, EngineOptions, MemoryEngineFactory, MemoryFs,
    Override, SliceConfig, SlicingEngine, VirtualFs,
};
use curaslice_mesh::{
    DecodeOptions, DecodedMesh, DecoderRegistry, FormatDescriptor, MeshDecoder, MeshError,
};
use curaslice_queue::{spawn, JobError, JobEvent, JobOutput, Slicer, WorkerConfig};

/// Shared record of everything the engine saw.
#[derive(Default)]
struct Recorder {
    log: Mutex<Vec<String>>,
    staged: AtomicBool,
    overlapped: AtomicBool,
    constructed: AtomicUsize,
}

impl Recorder {
    fn record(&self, entry: impl Into<String>) {
        self.log.lock().unwrap().push(entry.into());
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

struct RecorderFs {
    inner: MemoryFs,
    recorder: Arc<Recorder>,
}

impl VirtualFs for RecorderFs {
    fn mkdir(&mut self, path: &str) -> FsResult<()> {
        if path == "/definitions" && self.recorder.staged.swap(true, Ordering::SeqCst) {
            self.recorder.overlapped.store(true, Ordering::SeqCst);
        }
        self.recorder.record(format!("mkdir {}", path));
        self.inner.mkdir(path)
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> FsResult<()> {
        self.recorder.record(format!("write {}", path));
        self.inner.write_file(path, data)
    }

    fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        self.inner.read_file(path)
    }

    fn unlink(&mut self, path: &str) -> FsResult<()> {
        self.recorder.record(format!("unlink {}", path));
        self.inner.unlink(path)
    }

    fn rmdir(&mut self, path: &str) -> FsResult<()> {
        self.inner.rmdir(path)?;
        if path == "/definitions" {
            self.recorder.staged.store(false, Ordering::SeqCst);
        }
        self.recorder.record(format!("rmdir {}", path));
        Ok(())
    }

    fn read_dir(&self, path: &str) -> FsResult<Vec<String>> {
        self.inner.read_dir(path)
    }
}

struct RecorderEngine {
    fs: RecorderFs,
    recorder: Arc<Recorder>,
}

impl SlicingEngine for RecorderEngine {
    fn fs(&mut self) -> &mut dyn VirtualFs {
        &mut self.fs
    }

    fn call_main(&mut self, args: &[String], progress: &mut dyn FnMut(f64)) -> curaslice_engine::Result<()> {
        if !self.recorder.staged.load(Ordering::SeqCst) {
            self.recorder.overlapped.store(true, Ordering::SeqCst);
        }
        self.recorder.record("call");
        let model = self.fs.read_file("Model.stl")?;
        std::thread::sleep(Duration::from_millis(10));
        progress(0.5);
        progress(1.0);
        let gcode = format!(";FLAVOR:Marlin\n;LAYER_COUNT:{}\n;ARGS:{}\n", model.len(), args.join(" "));
        self.fs.inner.write_file("Model.gcode", gcode.as_bytes())?;
        Ok(())
    }
}

#[derive(Clone, Default)]
struct RecorderFactory {
    recorder: Arc<Recorder>,
}

impl EngineFactory for RecorderFactory {
    type Engine = RecorderEngine;

    fn construct(&self, _options: &EngineOptions) -> curaslice_engine::Result<RecorderEngine> {
        self.recorder.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(RecorderEngine {
            fs: RecorderFs {
                inner: MemoryFs::new(),
                recorder: self.recorder.clone(),
            },
            recorder: self.recorder.clone(),
        })
    }
}

/// Decoder for `obj` that returns the same triangle `meshes` times.
struct TriangleDecoder {
    meshes: usize,
}

impl MeshDecoder for TriangleDecoder {
    fn supports_extension(&self, extension: &str) -> Option<FormatDescriptor> {
        (extension == "obj").then(|| FormatDescriptor::new("Wavefront OBJ", &["obj"]))
    }

    fn decode(
        &self,
        _bytes: &[u8],
        _format: &FormatDescriptor,
        _options: &DecodeOptions,
        progress: &mut dyn FnMut(f64),
    ) -> curaslice_mesh::Result<Vec<DecodedMesh>> {
        progress(50.0);
        progress(100.0);
        let mesh = DecodedMesh {
            normals: vec![0.0f32, 0.0, 1.0].into(),
            vertices: vec![0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0].into(),
        };
        Ok(vec![mesh; self.meshes])
    }
}

fn stl_header() -> Vec<u8> {
    vec![0u8; 84]
}

#[tokio::test]
async fn test_unsupported_format_leaves_session_untouched() {
    let factory = RecorderFactory::default();
    let recorder = factory.recorder.clone();
    let (dispatcher, worker) = spawn(
        factory,
        BuiltinDefinitions::default(),
        Arc::new(DecoderRegistry::new()),
        &WorkerConfig::default(),
    )
    .unwrap();

    let handle = dispatcher
        .slice(b"v 0 0 0".to_vec(), "obj", SliceConfig::default())
        .await
        .unwrap();
    let err = handle.wait().await.unwrap_err();

    assert!(matches!(err, JobError::Mesh(MeshError::UnsupportedFormat(ext)) if ext == "obj"));
    assert_eq!(recorder.constructed.load(Ordering::SeqCst), 0);
    assert!(recorder.log().is_empty());

    // Same with a live session: nothing is staged or written.
    dispatcher.initialize(false).await.unwrap().wait().await.unwrap();
    let handle = dispatcher
        .slice(b"v 0 0 0".to_vec(), "obj", SliceConfig::default())
        .await
        .unwrap();
    assert!(handle.wait().await.is_err());
    assert_eq!(recorder.constructed.load(Ordering::SeqCst), 1);
    assert!(recorder.log().is_empty());

    drop(dispatcher);
    worker.join().unwrap();
}

#[tokio::test]
async fn test_back_to_back_slices_never_overlap() {
    let factory = RecorderFactory::default();
    let recorder = factory.recorder.clone();
    let (dispatcher, worker) = spawn(
        factory,
        BuiltinDefinitions::default(),
        Arc::new(DecoderRegistry::new()),
        &WorkerConfig::default(),
    )
    .unwrap();

    let config = SliceConfig::builder()
        .with_override(Override::extruder(0, "material_print_temperature", 215))
        .build()
        .unwrap();
    let first = {
        let d = dispatcher.clone();
        let config = config.clone();
        tokio::spawn(async move { d.slice(stl_header(), "stl", config).await.unwrap().wait().await })
    };
    let second = {
        let d = dispatcher.clone();
        tokio::spawn(async move { d.slice(stl_header(), "stl", config).await.unwrap().wait().await })
    };

    assert!(matches!(first.await.unwrap(), Ok(JobOutput::Sliced(_))));
    assert!(matches!(second.await.unwrap(), Ok(JobOutput::Sliced(_))));
    assert!(!recorder.overlapped.load(Ordering::SeqCst));

    let phases: Vec<String> = recorder
        .log()
        .into_iter()
        .filter(|e| e == "mkdir /definitions" || e == "call" || e == "rmdir /definitions")
        .collect();
    assert_eq!(
        phases,
        vec![
            "mkdir /definitions",
            "call",
            "rmdir /definitions",
            "mkdir /definitions",
            "call",
            "rmdir /definitions",
        ]
    );

    // Two built-ins, the printer and the default extruder per slice.
    let writes = recorder
        .log()
        .iter()
        .filter(|e| e.starts_with("write /definitions/"))
        .count();
    assert_eq!(writes, 2 * 4);

    drop(dispatcher);
    worker.join().unwrap();
}

#[tokio::test]
async fn test_jobs_run_in_submission_order() {
    let factory = RecorderFactory::default();
    let recorder = factory.recorder.clone();
    let (dispatcher, worker) = spawn(
        factory,
        BuiltinDefinitions::default(),
        Arc::new(DecoderRegistry::new()),
        &WorkerConfig::default(),
    )
    .unwrap();

    let init = dispatcher.initialize(false).await.unwrap();
    let slice = dispatcher
        .slice(stl_header(), "stl", SliceConfig::default())
        .await
        .unwrap();
    let destroy = dispatcher.destroy().await.unwrap();
    let late = dispatcher
        .slice(stl_header(), "stl", SliceConfig::default())
        .await
        .unwrap();

    assert!(matches!(init.wait().await, Ok(JobOutput::Initialized)));
    assert!(matches!(slice.wait().await, Ok(JobOutput::Sliced(_))));
    assert!(matches!(destroy.wait().await, Ok(JobOutput::Destroyed)));
    assert!(matches!(
        late.wait().await,
        Err(JobError::Engine(EngineError::Destroyed))
    ));
    assert_eq!(recorder.constructed.load(Ordering::SeqCst), 1);

    drop(dispatcher);
    worker.join().unwrap();
}

#[tokio::test]
async fn test_multiple_meshes_warn_and_use_first() {
    let factory = RecorderFactory::default();
    let mut registry = DecoderRegistry::new();
    registry.register(Arc::new(TriangleDecoder { meshes: 2 }));
    let (dispatcher, worker) = spawn(
        factory,
        BuiltinDefinitions::default(),
        Arc::new(registry),
        &WorkerConfig::default(),
    )
    .unwrap();

    let handle = dispatcher
        .slice(b"two meshes".to_vec(), "obj", SliceConfig::default())
        .await
        .unwrap();
    let (result, events) = handle.wait_with_events().await;
    let out = result.unwrap().into_slice().unwrap();

    assert_eq!(out.warnings.len(), 1);
    // One triangle: 84-byte header plus one 50-byte record.
    assert_eq!(out.metadata.layer_count, Some(134));

    let warnings = events
        .iter()
        .filter(|e| matches!(e, JobEvent::Warning { .. }))
        .count();
    assert_eq!(warnings, 1);

    let progress: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Progress(p) => Some(p.progress),
            JobEvent::Warning { .. } => None,
        })
        .collect();
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
    assert!((progress[0] - 0.15).abs() < 1e-9);
    assert!(progress.last().is_some_and(|p| (p - 1.0).abs() < 1e-9));

    drop(dispatcher);
    worker.join().unwrap();
}

#[tokio::test]
async fn test_dropped_handle_cancels_queued_job() {
    let (release, gate) = mpsc::channel::<()>();
    let gate = Arc::new(Mutex::new(gate));
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let factory = MemoryEngineFactory::new(move |_, fs, progress| {
        counter.fetch_add(1, Ordering::SeqCst);
        progress(0.5);
        gate.lock()
            .unwrap()
            .recv()
            .map_err(|_| EngineError::EngineFailure("gate closed".into()))?;
        fs.write_file("Model.gcode", b";FLAVOR:Marlin\n")?;
        Ok(())
    });
    let (dispatcher, worker) = spawn(
        factory,
        BuiltinDefinitions::default(),
        Arc::new(DecoderRegistry::new()),
        &WorkerConfig::default(),
    )
    .unwrap();

    let mut running = dispatcher
        .slice(stl_header(), "stl", SliceConfig::default())
        .await
        .unwrap();
    // The first job is inside the engine once its progress arrives.
    assert!(matches!(running.next_event().await, Some(JobEvent::Progress(_))));

    let cancelled = dispatcher
        .slice(stl_header(), "stl", SliceConfig::default())
        .await
        .unwrap();
    drop(cancelled);
    let last = dispatcher
        .slice(stl_header(), "stl", SliceConfig::default())
        .await
        .unwrap();

    release.send(()).unwrap();
    release.send(()).unwrap();

    assert!(running.wait().await.is_ok());
    assert!(last.wait().await.is_ok());
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    drop(dispatcher);
    worker.join().unwrap();
}

#[tokio::test]
async fn test_engine_files_in_definitions_do_not_block_next_job() {
    let factory = MemoryEngineFactory::new(|_, fs, _| {
        fs.write_file("/definitions/scratch.txt", b"left behind")?;
        fs.write_file("/Model.gcode", b";FLAVOR:Marlin\n")?;
        Ok(())
    });
    let (dispatcher, worker) = spawn(
        factory,
        BuiltinDefinitions::default(),
        Arc::new(DecoderRegistry::new()),
        &WorkerConfig::default(),
    )
    .unwrap();

    for _ in 0..3 {
        let handle = dispatcher
            .slice(stl_header(), "stl", SliceConfig::default())
            .await
            .unwrap();
        let out = handle.wait().await.unwrap().into_slice().unwrap();
        assert_eq!(out.metadata.flavor.as_deref(), Some("Marlin"));
    }

    drop(dispatcher);
    worker.join().unwrap();
}

#[tokio::test]
async fn test_slicer_client_transfer_semantics() {
    let factory = RecorderFactory::default();
    let recorder = factory.recorder.clone();
    let (dispatcher, worker) = spawn(
        factory,
        BuiltinDefinitions::default(),
        Arc::new(DecoderRegistry::new()),
        &WorkerConfig::default(),
    )
    .unwrap();

    let mut moving = Slicer::new(dispatcher.clone(), SliceConfig::default());
    assert!(!moving.is_loaded());
    let mut file = stl_header();
    let out = moving.slice(&mut file, "STL").await.unwrap();
    assert!(moving.is_loaded());
    assert!(file.is_empty());
    assert_eq!(out.metadata.layer_count, Some(84));

    let copying = SliceConfig::builder().transfer(false).build().unwrap();
    let mut copying = Slicer::new(dispatcher.clone(), copying);
    let mut file = stl_header();
    copying.slice(&mut file, "stl").await.unwrap();
    assert_eq!(file.len(), 84);

    moving.destroy().await.unwrap();
    assert!(!moving.is_loaded());
    assert_eq!(recorder.constructed.load(Ordering::SeqCst), 1);

    drop((moving, copying, dispatcher));
    worker.join().unwrap();
}
