#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use batch_detect::data::{RuntimeConfig, SpillingConfig, X, Xs};
use batch_detect::detection_runners::InferenceBackend;
use batch_detect::predictor::ModelWeights;
use batch_detect::runtime::{Runtime, WorkerSlot};
use image::{Rgb, RgbImage};
use ndarray::Axis;

/// Finds the bounding box of near-white pixels and reports it as class 1.
#[derive(Debug)]
pub struct BrightSquareBackend {
    drop_last_output: bool,
}

impl InferenceBackend for BrightSquareBackend {
    fn forward(&mut self, batch: &X) -> anyhow::Result<Vec<Xs>> {
        let mut ys = Vec::new();
        for image in batch.axis_iter(Axis(0)) {
            let (h, w) = (image.shape()[1], image.shape()[2]);
            let (mut x1, mut y1, mut x2, mut y2) = (usize::MAX, usize::MAX, 0, 0);
            for y in 0..h {
                for x in 0..w {
                    if (0..3).all(|c| image[[c, y, x]] > 0.5) {
                        x1 = x1.min(x);
                        y1 = y1.min(y);
                        x2 = x2.max(x + 1);
                        y2 = y2.max(y + 1);
                    }
                }
            }

            let mut xs = Xs::new();
            if x1 == usize::MAX {
                xs.push_kv("boxes", X::from_shape_vec(&[0, 4], vec![])?)?;
                xs.push_kv("labels", X::from_shape_vec(&[0], vec![])?)?;
                xs.push_kv("scores", X::from_shape_vec(&[0], vec![])?)?;
            } else {
                let b = vec![x1 as f32, y1 as f32, x2 as f32, y2 as f32];
                xs.push_kv("boxes", X::from_shape_vec(&[1, 4], b)?)?;
                xs.push_kv("labels", X::from(vec![1.]))?;
                xs.push_kv("scores", X::from(vec![0.9]))?;
            }
            ys.push(xs);
        }

        if self.drop_last_output {
            ys.pop();
        }
        Ok(ys)
    }

    fn class_names(&self) -> Option<&[String]> {
        None
    }

    fn describe(&self) -> String {
        "bright square finder".to_string()
    }
}

/// Weights for the mock backend. Records every slot a worker was started on.
#[derive(Debug, Clone, Default)]
pub struct MockWeights {
    pub slots: Arc<Mutex<Vec<WorkerSlot>>>,
    pub fail_start: bool,
    pub drop_last_output: bool,
}

impl MockWeights {
    pub fn started(&self) -> Vec<WorkerSlot> {
        let mut slots = self.slots.lock().unwrap().clone();
        slots.sort_by_key(|s| s.index);
        slots
    }
}

impl ModelWeights for MockWeights {
    fn load(&self, slot: &WorkerSlot) -> anyhow::Result<Box<dyn InferenceBackend>> {
        if self.fail_start {
            anyhow::bail!("no such device");
        }
        self.slots.lock().unwrap().push(slot.clone());
        Ok(Box::new(BrightSquareBackend {
            drop_last_output: self.drop_last_output,
        }))
    }
}

/// Black poster with a white square whose top-left corner is at `(x, y)`.
pub fn write_poster(path: &Path, x: u32, y: u32, size: u32) {
    let mut img = RgbImage::from_pixel(64, 48, Rgb([0, 0, 0]));
    for py in y..y + size {
        for px in x..x + size {
            img.put_pixel(px, py, Rgb([255, 255, 255]));
        }
    }
    img.save(path).unwrap();
}

pub fn runtime(num_cpus: usize, num_gpus: usize, memory: usize, spill_dir: &Path) -> Runtime {
    Runtime::init(
        RuntimeConfig::new()
            .with_num_cpus(num_cpus)
            .with_num_gpus(num_gpus)
            .with_object_store_memory(memory)
            .with_spilling(SpillingConfig::filesystem(spill_dir)),
    )
    .unwrap()
}
