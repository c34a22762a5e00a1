//! Draws prediction boxes onto the kept input images.

use std::fs;
use std::path::{Path, PathBuf};
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use crate::common::{Detection, PredictionRecord};
use crate::error::DetectError;
use crate::predictor::PredictionResult;

/// Consumes the final result set once the job is done.
pub trait Visualizer {
    /// Returns the number of records rendered.
    fn visualize(&mut self, result: &PredictionResult) -> Result<usize, DetectError>;
}

const VEHICLES: [&str; 8] = ["bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat"];
const ANIMALS: [&str; 10] = ["bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe"];

/// Numbering of COCO classes in unlabelled detections.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CocoIds {
    /// 80 contiguous ids from 0, as emitted by YOLO heads.
    #[default]
    Contiguous,
    /// The 91-slot ids from 1 with gaps used by torchvision detectors (0 is background).
    Torchvision,
}

pub fn class_colour(detection: &Detection, ids: CocoIds) -> Rgb<u8> {
    match detection.label.as_deref() {
        Some("person") => Rgb([128, 0, 128]),                  // purple (people)
        Some(l) if VEHICLES.contains(&l) => Rgb([0, 255, 0]), // green (vehicles)
        Some(l) if ANIMALS.contains(&l) => Rgb([255, 0, 0]),  // red (animals)
        Some(_) => Rgb([0, 0, 255]),                           // blue (everything else)
        None => match (ids, detection.class_id) {
            (CocoIds::Contiguous, 0) | (CocoIds::Torchvision, 1) => Rgb([128, 0, 128]),
            (CocoIds::Contiguous, 1..=8) | (CocoIds::Torchvision, 2..=9) => Rgb([0, 255, 0]),
            (CocoIds::Contiguous, 14..=23) | (CocoIds::Torchvision, 16..=25) => Rgb([255, 0, 0]),
            _ => Rgb([0, 0, 255]),
        },
    }
}

/// Writes `prediction_{i:05}.png` per record, boxes coloured by class.
pub struct BoxPainter {
    output_dir: PathBuf,
    threshold: f32,
    font: Option<FontVec>,
    text_height: f32,
    ids: CocoIds,
}

impl BoxPainter {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            threshold: 0.5,
            font: None,
            text_height: 14.,
            ids: CocoIds::default(),
        }
    }

    /// How to colour detections that carry no label.
    pub fn with_class_ids(mut self, ids: CocoIds) -> Self {
        self.ids = ids;
        self
    }

    /// Only detections at or above `threshold` are drawn.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Labels are drawn next to the boxes when a font is given.
    pub fn with_font<P: AsRef<Path>>(mut self, path: P) -> Result<Self, DetectError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| DetectError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| DetectError::Format(format!("{}: {}", path.display(), e)))?;
        self.font = Some(font);
        Ok(self)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The kept image with boxes drawn, or `None` if the record kept no image.
    pub fn paint(&self, record: &PredictionRecord) -> Option<RgbImage> {
        let mut img = record.image()?.to_rgb8();
        let (width, height) = (img.width() as f32, img.height() as f32);

        for det in record.above(self.threshold) {
            let (x, y, w, h) = det.bbox.clamp_to(width, height).as_xy_wh_i32();
            let rect = Rect::at(x, y).of_size(w.max(1) as u32, h.max(1) as u32);
            let colour = class_colour(det, self.ids);
            draw_hollow_rect_mut(&mut img, rect, colour);

            if let Some(font) = &self.font {
                let scale = PxScale::from(self.text_height);
                let text = format!("{} {:.2}", det.get_label(), det.confidence);
                let y = (y - self.text_height as i32).max(0);
                draw_text_mut(&mut img, colour, x, y, scale, font, &text);
            }
        }
        Some(img)
    }
}

impl std::fmt::Debug for BoxPainter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxPainter")
            .field("output_dir", &self.output_dir)
            .field("threshold", &self.threshold)
            .field("font", &self.font.is_some())
            .field("ids", &self.ids)
            .finish()
    }
}

impl Visualizer for BoxPainter {
    fn visualize(&mut self, result: &PredictionResult) -> Result<usize, DetectError> {
        fs::create_dir_all(&self.output_dir).map_err(|e| {
            DetectError::Storage(format!("cannot create {}: {}", self.output_dir.display(), e))
        })?;

        let mut written = 0;
        for (i, record) in result.iter().enumerate() {
            let Some(img) = self.paint(record) else {
                log::warn!("Record {} kept no image, add `image` to keep_columns to draw it", i);
                continue;
            };
            let path = self.output_dir.join(format!("prediction_{:05}.png", i));
            img.save(&path)
                .map_err(|e| DetectError::Storage(format!("cannot write {}: {}", path.display(), e)))?;
            written += 1;
        }

        log::info!("Wrote {} image(s) to {}", written, self.output_dir.display());
        Ok(written)
    }
}
