//! SCRFD face detector via ONNX Runtime.
//!
//! Anchor-free decoding over three stride levels with NMS, operating
//! on RGB images letterboxed to the 640x640 model input.

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DET_INPUT_SIZE: u32 = 640;
const DET_MEAN: f32 = 127.5;
const DET_STD: f32 = 128.0;
const DET_SCORE_THRESHOLD: f32 = 0.5;
const DET_NMS_IOU: f32 = 0.4;
const DET_STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;
/// Output tensor layout: [0-2] scores, [3-5] boxes, [6-8] landmarks,
/// one per stride.
const DET_OUTPUT_COUNT: usize = 9;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detection model not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("detector inference failed: {0}")]
    Inference(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// One detected face: box and landmarks in source-image pixels.
#[derive(Debug, Clone)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// [left eye, right eye, nose, left mouth, right mouth].
    pub landmarks: [(f32, f32); 5],
}

/// Mapping from letterboxed model coordinates back to source pixels.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

#[derive(Debug)]
pub struct FaceDetector {
    session: Session,
}

impl FaceDetector {
    /// Load the SCRFD ONNX model.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        let num_outputs = session.outputs().len();
        if num_outputs < DET_OUTPUT_COUNT {
            return Err(DetectorError::Inference(format!(
                "SCRFD model requires {DET_OUTPUT_COUNT} outputs (3 strides x score/box/kps), got {num_outputs}"
            )));
        }

        tracing::info!(
            path = %model_path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "SCRFD detector loaded"
        );

        Ok(Self { session })
    }

    /// Detect faces, highest confidence first.
    pub fn detect(&mut self, rgb: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        let (input, letterbox) = preprocess(rgb);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut detections = Vec::new();
        for (i, &stride) in DET_STRIDES.iter().enumerate() {
            let (_, scores) = outputs[i]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::Inference(format!("scores stride {stride}: {e}")))?;
            let (_, boxes) = outputs[i + 3]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::Inference(format!("boxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[i + 6]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::Inference(format!("kps stride {stride}: {e}")))?;

            decode_stride(scores, boxes, kps, stride, letterbox, &mut detections);
        }

        let mut kept = suppress(detections, DET_NMS_IOU);
        kept.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(kept)
    }
}

/// Letterbox an RGB image onto the square model input and normalize.
///
/// Padding stays at the tensor's zero fill, which is the normalized
/// form of the model's mean pixel value.
fn preprocess(rgb: &RgbImage) -> (Array4<f32>, Letterbox) {
    let scale = (DET_INPUT_SIZE as f32 / rgb.width() as f32)
        .min(DET_INPUT_SIZE as f32 / rgb.height() as f32);
    let new_w = ((rgb.width() as f32 * scale).round() as u32).max(1);
    let new_h = ((rgb.height() as f32 * scale).round() as u32).max(1);
    let pad_x = (DET_INPUT_SIZE - new_w) / 2;
    let pad_y = (DET_INPUT_SIZE - new_h) / 2;

    let resized = image::imageops::resize(rgb, new_w, new_h, FilterType::Triangle);

    let size = DET_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let tx = (x + pad_x) as usize;
        let ty = (y + pad_y) as usize;
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - DET_MEAN) / DET_STD;
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    )
}

/// Decode one stride level's anchor-free outputs into detections.
fn decode_stride(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: Letterbox,
    out: &mut Vec<Detection>,
) {
    let grid = DET_INPUT_SIZE as usize / stride;
    let num_anchors = grid * grid * ANCHORS_PER_CELL;

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= DET_SCORE_THRESHOLD {
            continue;
        }

        let cell = idx / ANCHORS_PER_CELL;
        let anchor_x = (cell % grid) as f32 * stride as f32;
        let anchor_y = (cell / grid) as f32 * stride as f32;

        let box_off = idx * 4;
        let kps_off = idx * 10;
        if box_off + 3 >= boxes.len() || kps_off + 9 >= kps.len() {
            continue;
        }

        // Box offsets are [left, top, right, bottom] distances in
        // stride units from the anchor center.
        let (x1, y1) = letterbox.unmap(
            anchor_x - boxes[box_off] * stride as f32,
            anchor_y - boxes[box_off + 1] * stride as f32,
        );
        let (x2, y2) = letterbox.unmap(
            anchor_x + boxes[box_off + 2] * stride as f32,
            anchor_y + boxes[box_off + 3] * stride as f32,
        );

        let landmarks = std::array::from_fn(|i| {
            letterbox.unmap(
                anchor_x + kps[kps_off + i * 2] * stride as f32,
                anchor_y + kps[kps_off + i * 2 + 1] * stride as f32,
            )
        });

        out.push(Detection {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }
}

/// Non-maximum suppression, keeping the highest-confidence detection
/// of each overlapping cluster.
fn suppress(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
