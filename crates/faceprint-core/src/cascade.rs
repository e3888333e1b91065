//! Classical multi-scale sliding-window face detector.
//!
//! Model-file-free fallback used when the ONNX engine cannot be
//! loaded. Scans a 1.1x scale pyramid of square windows over an
//! integral image, applies a short cascade of Haar-like contrast
//! tests per window, and keeps only detections confirmed by at least
//! four overlapping neighbor windows.

use crate::types::{FaceLocator, FaceRegion};
use image::GrayImage;

// --- Cascade configuration ---
const BASE_WINDOW: u32 = 24;
const SCALE_FACTOR: f32 = 1.1;
const MIN_NEIGHBORS: usize = 4;
/// Window shift per step, as a fraction of the window size.
const SHIFT_FRACTION: f32 = 0.1;
/// Minimum IoU for two raw hits to count as neighbors.
const GROUP_OVERLAP: f32 = 0.5;

// --- Stage thresholds (gray levels 0-255) ---
/// Variance gate: windows flatter than this carry no facial structure.
const MIN_STDDEV: f64 = 10.0;
/// The eye band must be at most this fraction of the cheek brightness.
const EYE_CHEEK_RATIO: f64 = 0.85;
/// The nose bridge must exceed the eye patches by at least this factor.
const NOSE_EYE_RATIO: f64 = 1.08;
/// Maximum relative brightness gap tolerated between the two eyes.
const EYE_BALANCE: f64 = 0.4;

/// Summed-area table over a grayscale image.
///
/// Holds plain and squared sums so any rectangle's mean and standard
/// deviation come out in constant time.
pub struct IntegralImage {
    width: usize,
    sum: Vec<f64>,
    sq_sum: Vec<f64>,
}

impl IntegralImage {
    pub fn new(gray: &GrayImage) -> Self {
        let w = gray.width() as usize;
        let h = gray.height() as usize;
        let stride = w + 1;
        let mut sum = vec![0.0f64; stride * (h + 1)];
        let mut sq_sum = vec![0.0f64; stride * (h + 1)];

        for y in 0..h {
            let mut row = 0.0f64;
            let mut sq_row = 0.0f64;
            for x in 0..w {
                let v = gray.get_pixel(x as u32, y as u32)[0] as f64;
                row += v;
                sq_row += v * v;
                sum[(y + 1) * stride + (x + 1)] = sum[y * stride + (x + 1)] + row;
                sq_sum[(y + 1) * stride + (x + 1)] = sq_sum[y * stride + (x + 1)] + sq_row;
            }
        }

        Self {
            width: w,
            sum,
            sq_sum,
        }
    }

    /// Sum of pixel values over the half-open rectangle [x, x+w) x [y, y+h).
    pub fn rect_sum(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        let stride = self.width + 1;
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        self.sum[y1 * stride + x1] + self.sum[y0 * stride + x0]
            - self.sum[y0 * stride + x1]
            - self.sum[y1 * stride + x0]
    }

    fn rect_sq_sum(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        let stride = self.width + 1;
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        self.sq_sum[y1 * stride + x1] + self.sq_sum[y0 * stride + x0]
            - self.sq_sum[y0 * stride + x1]
            - self.sq_sum[y1 * stride + x0]
    }

    /// Mean pixel value over a rectangle. Empty rectangles are 0.
    pub fn rect_mean(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        let area = (w as f64) * (h as f64);
        if area == 0.0 {
            return 0.0;
        }
        self.rect_sum(x, y, w, h) / area
    }

    /// Standard deviation of pixel values over a rectangle.
    pub fn rect_stddev(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        let area = (w as f64) * (h as f64);
        if area == 0.0 {
            return 0.0;
        }
        let mean = self.rect_sum(x, y, w, h) / area;
        let variance = self.rect_sq_sum(x, y, w, h) / area - mean * mean;
        variance.max(0.0).sqrt()
    }
}

/// Multi-scale cascade detector over square windows.
pub struct CascadeDetector {
    scale_factor: f32,
    min_neighbors: usize,
    min_size: u32,
}

impl Default for CascadeDetector {
    fn default() -> Self {
        Self {
            scale_factor: SCALE_FACTOR,
            min_neighbors: MIN_NEIGHBORS,
            min_size: BASE_WINDOW,
        }
    }
}

impl CascadeDetector {
    /// Detect candidate face regions. Output order is deterministic:
    /// groups appear in the scan order of their first confirming window.
    pub fn detect(&self, gray: &GrayImage) -> Vec<FaceRegion> {
        let limit = gray.width().min(gray.height());
        if limit < self.min_size {
            return Vec::new();
        }

        let integral = IntegralImage::new(gray);
        let mut hits = Vec::new();

        let mut size = self.min_size as f32;
        while size as u32 <= limit {
            let w = size as u32;
            let step = ((size * SHIFT_FRACTION) as u32).max(2);

            let mut y = 0u32;
            while y + w <= gray.height() {
                let mut x = 0u32;
                while x + w <= gray.width() {
                    if window_passes(&integral, x, y, w) {
                        hits.push(FaceRegion {
                            x,
                            y,
                            width: w,
                            height: w,
                        });
                    }
                    x += step;
                }
                y += step;
            }

            size *= self.scale_factor;
        }

        group_regions(&hits, self.min_neighbors)
    }
}

impl FaceLocator for CascadeDetector {
    fn locate(&self, gray: &GrayImage) -> Vec<FaceRegion> {
        self.detect(gray)
    }
}

/// Sub-rectangle of a window expressed as fractions of the window size.
fn patch(x: u32, y: u32, w: u32, fx: f64, fy: f64, fw: f64, fh: f64) -> (u32, u32, u32, u32) {
    let size = w as f64;
    (
        x + (size * fx) as u32,
        y + (size * fy) as u32,
        ((size * fw) as u32).max(1),
        ((size * fh) as u32).max(1),
    )
}

/// Run the contrast stages for one window. Stages are ordered cheapest
/// first; the first failure rejects the window.
fn window_passes(integral: &IntegralImage, x: u32, y: u32, w: u32) -> bool {
    // Stage 1: flat windows cannot contain a face.
    if integral.rect_stddev(x, y, w, w) < MIN_STDDEV {
        return false;
    }

    let (lx, ly, lw, lh) = patch(x, y, w, 0.12, 0.20, 0.26, 0.30);
    let (rx, ry, rw, rh) = patch(x, y, w, 0.62, 0.20, 0.26, 0.30);
    let (nx, ny, nw, nh) = patch(x, y, w, 0.40, 0.20, 0.20, 0.30);
    let (cx, cy, cw, ch) = patch(x, y, w, 0.15, 0.55, 0.70, 0.30);

    let left_eye = integral.rect_mean(lx, ly, lw, lh);
    let right_eye = integral.rect_mean(rx, ry, rw, rh);
    let nose = integral.rect_mean(nx, ny, nw, nh);
    let cheeks = integral.rect_mean(cx, cy, cw, ch);
    let eyes = (left_eye + right_eye) / 2.0;

    // Stage 2: the eye band sits in shadow relative to the cheeks.
    if eyes >= cheeks * EYE_CHEEK_RATIO {
        return false;
    }

    // Stage 3: the nose bridge is brighter than the eye sockets.
    if nose <= eyes * NOSE_EYE_RATIO {
        return false;
    }

    // Stage 4: frontal faces are roughly left-right symmetric.
    let reference = left_eye.max(right_eye).max(1.0);
    (left_eye - right_eye).abs() <= reference * EYE_BALANCE
}

/// IoU between two regions.
fn overlap(a: &FaceRegion, b: &FaceRegion) -> f32 {
    let x1 = a.x.max(b.x) as f32;
    let y1 = a.y.max(b.y) as f32;
    let x2 = (a.x + a.width).min(b.x + b.width) as f32;
    let y2 = (a.y + a.height).min(b.y + b.height) as f32;

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }

    let area_a = (a.width * a.height) as f32;
    let area_b = (b.width * b.height) as f32;
    inter / (area_a + area_b - inter)
}

/// Find root with path halving.
fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        // Attach the later root to the earlier one so cluster roots
        // keep scan order.
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi] = lo;
    }
}

/// Cluster raw window hits and average each cluster into one region.
///
/// Clusters smaller than `min_neighbors` are discarded — an isolated
/// hit is treated as noise. Surviving regions come out ordered by the
/// scan position of each cluster's first hit.
pub(crate) fn group_regions(hits: &[FaceRegion], min_neighbors: usize) -> Vec<FaceRegion> {
    if hits.is_empty() {
        return Vec::new();
    }

    let mut parent: Vec<usize> = (0..hits.len()).collect();
    for i in 0..hits.len() {
        for j in (i + 1)..hits.len() {
            if overlap(&hits[i], &hits[j]) > GROUP_OVERLAP {
                union(&mut parent, i, j);
            }
        }
    }

    let mut clusters: Vec<(usize, Vec<usize>)> = Vec::new();
    for i in 0..hits.len() {
        let root = find(&mut parent, i);
        match clusters.iter_mut().find(|(r, _)| *r == root) {
            Some((_, members)) => members.push(i),
            None => clusters.push((root, vec![i])),
        }
    }

    clusters
        .into_iter()
        .filter(|(_, members)| members.len() >= min_neighbors)
        .map(|(_, members)| {
            let n = members.len() as u64;
            let sum = |f: fn(&FaceRegion) -> u32| -> u32 {
                (members.iter().map(|&i| f(&hits[i]) as u64).sum::<u64>() / n) as u32
            };
            FaceRegion {
                x: sum(|r| r.x),
                y: sum(|r| r.y),
                width: sum(|r| r.width),
                height: sum(|r| r.height),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn region(x: u32, y: u32, size: u32) -> FaceRegion {
        FaceRegion {
            x,
            y,
            width: size,
            height: size,
        }
    }

    /// Paint a strongly contrasted frontal-face pattern into `img` at
    /// the given square box: dark eye patches, a bright nose bridge
    /// between them, and a bright cheek band below.
    fn paint_face(img: &mut GrayImage, bx: u32, by: u32, size: u32) {
        let f = |frac: f64| (size as f64 * frac) as u32;
        let fill = |img: &mut GrayImage, x0: u32, x1: u32, y0: u32, y1: u32, v: u8| {
            for y in y0..y1 {
                for x in x0..x1 {
                    img.put_pixel(bx + x, by + y, Luma([v]));
                }
            }
        };
        // Eye band rows with margin around the 0.20..0.50 stage rows.
        fill(img, f(0.05), f(0.40), f(0.12), f(0.55), 50); // left eye
        fill(img, f(0.60), f(0.95), f(0.12), f(0.55), 50); // right eye
        fill(img, f(0.40), f(0.60), f(0.12), f(0.55), 210); // nose bridge
        fill(img, f(0.05), f(0.95), f(0.55), f(0.95), 200); // cheeks
    }

    #[test]
    fn test_integral_rect_sum() {
        // 3x3 image with values 1..9 row-major.
        let mut img = GrayImage::new(3, 3);
        for y in 0..3 {
            for x in 0..3 {
                img.put_pixel(x, y, Luma([(y * 3 + x + 1) as u8]));
            }
        }
        let integral = IntegralImage::new(&img);
        assert_eq!(integral.rect_sum(0, 0, 3, 3), 45.0);
        assert_eq!(integral.rect_sum(1, 1, 2, 2), 5.0 + 6.0 + 8.0 + 9.0);
        assert_eq!(integral.rect_sum(2, 0, 1, 1), 3.0);
    }

    #[test]
    fn test_integral_mean_and_stddev_uniform() {
        let img = GrayImage::from_pixel(16, 16, Luma([77]));
        let integral = IntegralImage::new(&img);
        assert!((integral.rect_mean(0, 0, 16, 16) - 77.0).abs() < 1e-9);
        assert!(integral.rect_stddev(0, 0, 16, 16) < 1e-6);
    }

    #[test]
    fn test_uniform_image_yields_no_detections() {
        let img = GrayImage::from_pixel(120, 120, Luma([128]));
        let regions = CascadeDetector::default().detect(&img);
        assert!(regions.is_empty());
    }

    #[test]
    fn test_image_smaller_than_window_yields_no_detections() {
        let img = GrayImage::from_pixel(16, 16, Luma([128]));
        let regions = CascadeDetector::default().detect(&img);
        assert!(regions.is_empty());
    }

    #[test]
    fn test_synthetic_face_is_detected() {
        let mut img = GrayImage::from_pixel(140, 140, Luma([128]));
        paint_face(&mut img, 40, 40, 60);

        let regions = CascadeDetector::default().detect(&img);
        assert!(!regions.is_empty(), "expected at least one detection");

        // Some detection should be centered inside the painted box.
        let centered = regions.iter().any(|r| {
            let (cx, cy) = r.center();
            (40.0..=100.0).contains(&cx) && (40.0..=100.0).contains(&cy)
        });
        assert!(centered, "no detection centered on the painted face: {regions:?}");
    }

    #[test]
    fn test_detection_is_deterministic() {
        let mut img = GrayImage::from_pixel(140, 140, Luma([128]));
        paint_face(&mut img, 40, 40, 60);

        let detector = CascadeDetector::default();
        assert_eq!(detector.detect(&img), detector.detect(&img));
    }

    #[test]
    fn test_overlap_identical_and_disjoint() {
        let a = region(0, 0, 40);
        assert!((overlap(&a, &a) - 1.0).abs() < 1e-6);
        let b = region(100, 100, 40);
        assert_eq!(overlap(&a, &b), 0.0);
    }

    #[test]
    fn test_group_requires_min_neighbors() {
        // Three coincident hits are below the neighbor floor of four.
        let hits = vec![region(10, 10, 40); 3];
        assert!(group_regions(&hits, 4).is_empty());

        let hits = vec![region(10, 10, 40); 4];
        let grouped = group_regions(&hits, 4);
        assert_eq!(grouped, vec![region(10, 10, 40)]);
    }

    #[test]
    fn test_group_averages_cluster_members() {
        let hits = vec![
            region(10, 10, 40),
            region(14, 10, 40),
            region(10, 14, 40),
            region(14, 14, 40),
        ];
        let grouped = group_regions(&hits, 4);
        assert_eq!(grouped, vec![region(12, 12, 40)]);
    }

    #[test]
    fn test_group_keeps_separate_clusters_apart() {
        let mut hits = vec![region(10, 10, 40); 4];
        hits.extend(vec![region(200, 200, 40); 5]);
        let grouped = group_regions(&hits, 4);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0], region(10, 10, 40));
        assert_eq!(grouped[1], region(200, 200, 40));
    }

    #[test]
    fn test_group_isolated_hits_are_noise() {
        let hits = vec![
            region(10, 10, 40),
            region(100, 10, 40),
            region(10, 100, 40),
            region(100, 100, 40),
        ];
        assert!(group_regions(&hits, 4).is_empty());
    }
}
