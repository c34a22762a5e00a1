mod mock_model;

use std::path::Path;
use std::sync::Arc;
use batch_detect::common::{Record, Value, IMAGE_COLUMN};
use batch_detect::data::PredictOptions;
use batch_detect::predictor::{BatchPredictor, Checkpoint, PredictionResult, SsdFormat};
use batch_detect::preprocess::BatchMapper;
use batch_detect::source::{ColorMode, Dataset, ImageFolder, RemoteStore};
use batch_detect::visualize::{BoxPainter, Visualizer};
use batch_detect::DetectError;
use image::{DynamicImage, GrayImage};
use mock_model::{runtime, write_poster, MockWeights};
use object_store::memory::InMemory;
use object_store::{ObjectStore, PutPayload};

const GB: usize = 1 << 30;

fn three_posters(dir: &Path) {
    write_poster(&dir.join("poster_a.png"), 4, 4, 16);
    write_poster(&dir.join("poster_b.png"), 30, 10, 20);
    write_poster(&dir.join("poster_c.png"), 40, 24, 12);
}

fn predictor(weights: MockWeights) -> BatchPredictor {
    let checkpoint = Checkpoint::new(weights, BatchMapper::to_tensor());
    BatchPredictor::from_checkpoint(checkpoint, SsdFormat::new().with_score_threshold(0.5))
}

fn options() -> PredictOptions {
    PredictOptions::new()
        .with_batch_size(2)
        .with_scoring_workers(1, 2)
        .with_keep_columns(&["image", "path"])
}

fn run_posters(images: &Path, spill: &Path, memory: usize) -> Result<PredictionResult, DetectError> {
    let runtime = runtime(4, 0, memory, spill);
    let dataset = ImageFolder::new(images)
        .with_size(32, 32)
        .with_include_paths(true)
        .with_parallelism(2)
        .read()?;
    predictor(MockWeights::default()).predict(&runtime, &dataset, &options())
}

#[test]
fn test_three_posters_give_three_records() {
    let images = tempfile::tempdir().unwrap();
    let spill = tempfile::tempdir().unwrap();
    three_posters(images.path());

    let result = run_posters(images.path(), spill.path(), GB).unwrap();

    assert_eq!(result.len(), 3);
    assert_eq!(result.stats.records, 3);
    for (record, name) in result.iter().zip(["poster_a.png", "poster_b.png", "poster_c.png"]) {
        assert!(record.above(0.5).count() >= 1);
        assert!(record.kept.path().unwrap().ends_with(name));

        let image = record.image().unwrap();
        assert_eq!((image.width(), image.height()), (32, 32));

        let boxes = record.boxes();
        assert_eq!(boxes.shape(), &[1, 4]);
        assert!(boxes[[0, 0]] < boxes[[0, 2]] && boxes[[0, 1]] < boxes[[0, 3]]);
        assert!(boxes.iter().all(|v| (0.0..=32.0).contains(v)));
        assert_eq!(record.labels().to_vec(), vec![1]);
    }
}

#[test]
fn test_repeated_runs_are_identical() {
    let images = tempfile::tempdir().unwrap();
    let spill = tempfile::tempdir().unwrap();
    three_posters(images.path());

    let first = run_posters(images.path(), spill.path(), GB).unwrap();
    let second = run_posters(images.path(), spill.path(), GB).unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.boxes(), b.boxes());
        assert_eq!(a.labels(), b.labels());
        assert_eq!(a.scores(), b.scores());
    }
}

#[test]
fn test_corrupt_image_fails_the_run() {
    let images = tempfile::tempdir().unwrap();
    let spill = tempfile::tempdir().unwrap();
    three_posters(images.path());
    std::fs::write(images.path().join("poster_broken.jpg"), b"\xff\xd8\xff truncated").unwrap();

    let err = run_posters(images.path(), spill.path(), GB).unwrap_err();
    assert!(err.is_input_error(), "{err}");
}

#[test]
fn test_bucket_source_scores_like_a_local_folder() {
    let images = tempfile::tempdir().unwrap();
    let spill = tempfile::tempdir().unwrap();
    three_posters(images.path());

    let bucket = Arc::new(InMemory::new());
    futures::executor::block_on(async {
        for entry in std::fs::read_dir(images.path()).unwrap() {
            let path = entry.unwrap().path();
            let key = format!("posters/{}", path.file_name().unwrap().to_string_lossy());
            let bytes = std::fs::read(&path).unwrap();
            bucket.put(&key.as_str().into(), PutPayload::from(bytes)).await.unwrap();
        }
    });
    let store = RemoteStore::new(bucket, "memory://movies/posters").unwrap();
    let dataset = ImageFolder::from_store(store)
        .with_size(32, 32)
        .with_include_paths(true)
        .with_parallelism(2)
        .read()
        .unwrap();

    let runtime = runtime(4, 0, GB, spill.path());
    let remote = predictor(MockWeights::default()).predict(&runtime, &dataset, &options()).unwrap();
    let local = run_posters(images.path(), spill.path(), GB).unwrap();

    assert_eq!(remote.len(), 3);
    for (r, l) in remote.iter().zip(local.iter()) {
        assert_eq!(r.boxes(), l.boxes());
        assert_eq!(r.scores(), l.scores());
        assert!(r.kept.path().unwrap().starts_with("memory://movies/posters/poster_"));
    }
}

#[test]
fn test_blocks_spill_past_the_memory_cap() {
    let images = tempfile::tempdir().unwrap();
    let spill = tempfile::tempdir().unwrap();
    three_posters(images.path());

    let in_memory = run_posters(images.path(), spill.path(), GB).unwrap();
    let spilled = run_posters(images.path(), spill.path(), 1).unwrap();

    assert_eq!(in_memory.stats.spilled_blocks, 0);
    assert_eq!(spilled.stats.spilled_blocks, 2);
    for (a, b) in in_memory.iter().zip(spilled.iter()) {
        assert_eq!(a, b);
    }
    assert_eq!(std::fs::read_dir(spill.path()).unwrap().count(), 0);
}

#[test]
fn test_pool_size_within_bounds() {
    let spill = tempfile::tempdir().unwrap();
    let runtime = runtime(3, 0, GB, spill.path());
    let weights = MockWeights::default();

    let records: Vec<Record> = (0..12)
        .map(|_| Record::new().with(IMAGE_COLUMN, Value::Image(DynamicImage::new_rgb8(8, 8))))
        .collect();
    let dataset = Dataset::from_records(records, 6);

    let options = PredictOptions::new().with_scoring_workers(1, 8);
    let result = predictor(weights.clone()).predict(&runtime, &dataset, &options).unwrap();

    assert_eq!(result.stats.workers, 3);
    assert_eq!(weights.started().len(), 3);
    assert_eq!(result.len(), 12);
    assert!(result.iter().all(|r| r.is_empty()));

    let too_many = PredictOptions::new().with_scoring_workers(4, 8);
    let err = predictor(MockWeights::default())
        .predict(&runtime, &dataset, &too_many)
        .unwrap_err();
    assert!(matches!(err, DetectError::Resource(_)));

    let inverted = PredictOptions::new().with_scoring_workers(3, 2);
    let err = predictor(MockWeights::default())
        .predict(&runtime, &dataset, &inverted)
        .unwrap_err();
    assert!(matches!(err, DetectError::Config(_)));
}

#[test]
fn test_each_worker_gets_its_own_gpu() {
    let images = tempfile::tempdir().unwrap();
    let spill = tempfile::tempdir().unwrap();
    three_posters(images.path());

    let runtime = runtime(8, 2, GB, spill.path());
    let dataset = ImageFolder::new(images.path()).with_size(32, 32).read().unwrap();
    let weights = MockWeights::default();
    let options = PredictOptions::new()
        .with_scoring_workers(2, 2)
        .with_cpus_per_worker(4)
        .with_gpus_per_worker(1);

    predictor(weights.clone()).predict(&runtime, &dataset, &options).unwrap();

    let started = weights.started();
    assert_eq!(started.len(), 2);
    assert_eq!(started[0].gpu_ids, vec![0]);
    assert_eq!(started[1].gpu_ids, vec![1]);
    assert!(started.iter().all(|s| s.cpus == 4));
    assert_eq!(runtime.resources().available_gpus(), 2);
}

#[test]
fn test_backend_start_failure_is_a_worker_error() {
    let images = tempfile::tempdir().unwrap();
    let spill = tempfile::tempdir().unwrap();
    three_posters(images.path());

    let runtime = runtime(2, 0, GB, spill.path());
    let dataset = ImageFolder::new(images.path())
        .with_include_paths(true)
        .read()
        .unwrap();
    let weights = MockWeights {
        fail_start: true,
        ..Default::default()
    };

    let err = predictor(weights).predict(&runtime, &dataset, &options()).unwrap_err();
    assert!(matches!(err, DetectError::Worker { .. }), "{err}");
    assert!(err.to_string().contains("no such device"));
}

#[test]
fn test_missing_outputs_are_a_worker_error() {
    let images = tempfile::tempdir().unwrap();
    let spill = tempfile::tempdir().unwrap();
    three_posters(images.path());

    let runtime = runtime(2, 0, GB, spill.path());
    let dataset = ImageFolder::new(images.path())
        .with_include_paths(true)
        .read()
        .unwrap();
    let weights = MockWeights {
        drop_last_output: true,
        ..Default::default()
    };

    let err = predictor(weights).predict(&runtime, &dataset, &options()).unwrap_err();
    assert!(matches!(err, DetectError::Worker { .. }), "{err}");
    assert!(err.to_string().contains("outputs for a batch of"), "{err}");
}

#[test]
fn test_grayscale_input_is_a_format_error() {
    let images = tempfile::tempdir().unwrap();
    let spill = tempfile::tempdir().unwrap();
    GrayImage::new(10, 10).save(images.path().join("gray.png")).unwrap();

    let runtime = runtime(2, 0, GB, spill.path());
    let dataset = ImageFolder::new(images.path())
        .with_mode(ColorMode::Luma)
        .read()
        .unwrap();

    let err = predictor(MockWeights::default())
        .predict(&runtime, &dataset, &PredictOptions::new())
        .unwrap_err();
    assert!(matches!(err, DetectError::Format(_)));
}

#[test]
fn test_box_painter_writes_one_file_per_record() {
    let images = tempfile::tempdir().unwrap();
    let spill = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    three_posters(images.path());

    let result = run_posters(images.path(), spill.path(), GB).unwrap();
    let written = BoxPainter::new(output.path()).visualize(&result).unwrap();

    assert_eq!(written, 3);
    for i in 0..3 {
        let painted = image::open(output.path().join(format!("prediction_{:05}.png", i))).unwrap();
        assert_eq!((painted.width(), painted.height()), (32, 32));
    }
}
