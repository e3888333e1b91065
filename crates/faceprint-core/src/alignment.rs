//! Five-point face alignment to the canonical ArcFace crop.
//!
//! Estimates a 4-DOF similarity transform (scale, rotation,
//! translation) from detected landmarks to the InsightFace reference
//! positions and warps the face into a 112x112 RGB crop.

use image::{Rgb, RgbImage};

/// InsightFace reference landmarks for a 112x112 output:
/// left eye, right eye, nose, left mouth corner, right mouth corner.
const REFERENCE_LANDMARKS: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

pub(crate) const ALIGNED_SIZE: u32 = 112;

/// Similarity transform parameters. The full 2x3 matrix is
/// `[[a, -b, tx], [b, a, ty]]`.
#[derive(Debug, Clone, Copy)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

/// Warp a detected face into the canonical 112x112 aligned crop.
pub fn align_face(rgb: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let transform = estimate_transform(landmarks, &REFERENCE_LANDMARKS);
    warp(rgb, transform)
}

/// Least-squares fit of a similarity transform mapping `src` onto `dst`.
///
/// Each point pair contributes two rows to an overdetermined system in
/// the unknowns `(a, b, tx, ty)`:
/// `sx*a - sy*b + tx = dx` and `sy*a + sx*b + ty = dy`.
fn estimate_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Similarity {
    let mut normal = [[0.0f32; 5]; 4]; // augmented [AtA | Atb]

    for i in 0..5 {
        let (sx, sy) = src[i];
        let (dx, dy) = dst[i];
        let rows = [([sx, -sy, 1.0, 0.0], dx), ([sy, sx, 0.0, 1.0], dy)];

        for (row, rhs) in rows {
            for j in 0..4 {
                for k in 0..4 {
                    normal[j][k] += row[j] * row[k];
                }
                normal[j][4] += row[j] * rhs;
            }
        }
    }

    match solve(&mut normal) {
        Some([a, b, tx, ty]) => Similarity { a, b, tx, ty },
        // Collinear/degenerate landmarks; fall back to identity.
        None => Similarity {
            a: 1.0,
            b: 0.0,
            tx: 0.0,
            ty: 0.0,
        },
    }
}

/// Gaussian elimination with partial pivoting on a 4x5 augmented matrix.
fn solve(m: &mut [[f32; 5]; 4]) -> Option<[f32; 4]> {
    for col in 0..4 {
        let pivot_row = (col..4).max_by(|&a, &b| {
            m[a][col]
                .abs()
                .partial_cmp(&m[b][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        m.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return None;
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for k in col..5 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        let mut acc = m[i][4];
        for j in (i + 1)..4 {
            acc -= m[i][j] * x[j];
        }
        x[i] = acc / m[i][i];
    }
    Some(x)
}

/// Apply the inverse similarity transform with bilinear sampling.
/// Pixels mapping outside the source are black.
fn warp(rgb: &RgbImage, t: Similarity) -> RgbImage {
    // Invert the 2x2 rotation-scale block; det = a^2 + b^2.
    let det = t.a * t.a + t.b * t.b;
    if det.abs() < 1e-12 {
        return RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    }
    let ia = t.a / det;
    let ib = t.b / det;

    let (src_w, src_h) = (rgb.width() as i32, rgb.height() as i32);
    let sample = |x: i32, y: i32, c: usize| -> f32 {
        if x >= 0 && x < src_w && y >= 0 && y < src_h {
            rgb.get_pixel(x as u32, y as u32)[c] as f32
        } else {
            0.0
        }
    };

    RgbImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |ox, oy| {
        let dx = ox as f32 - t.tx;
        let dy = oy as f32 - t.ty;
        let sx = ia * dx + ib * dy;
        let sy = -ib * dx + ia * dy;

        let x0 = sx.floor() as i32;
        let y0 = sy.floor() as i32;
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let mut pixel = [0u8; 3];
        for (c, out) in pixel.iter_mut().enumerate() {
            let val = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1, c) * fx * fy;
            *out = val.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(pixel)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_identity() {
        let t = estimate_transform(&REFERENCE_LANDMARKS, &REFERENCE_LANDMARKS);
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-3, "tx = {}", t.tx);
        assert!(t.ty.abs() < 1e-3, "ty = {}", t.ty);
    }

    #[test]
    fn test_transform_halves_doubled_landmarks() {
        let doubled: [(f32, f32); 5] =
            std::array::from_fn(|i| (REFERENCE_LANDMARKS[i].0 * 2.0, REFERENCE_LANDMARKS[i].1 * 2.0));
        let t = estimate_transform(&doubled, &REFERENCE_LANDMARKS);
        assert!((t.a - 0.5).abs() < 0.05, "a = {}, expected ~0.5", t.a);
        assert!(t.b.abs() < 0.05, "b = {}", t.b);
    }

    #[test]
    fn test_align_output_dimensions() {
        let rgb = RgbImage::from_pixel(320, 240, Rgb([120, 120, 120]));
        let aligned = align_face(&rgb, &REFERENCE_LANDMARKS);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
    }

    #[test]
    fn test_align_moves_patch_to_reference() {
        // Paint a bright patch at the source left-eye position; after
        // alignment it should land near the reference left eye.
        let mut rgb = RgbImage::new(200, 200);
        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        let (ex, ey) = (src[0].0 as u32, src[0].1 as u32);
        for y in ey.saturating_sub(2)..=ey + 2 {
            for x in ex.saturating_sub(2)..=ex + 2 {
                rgb.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }

        let aligned = align_face(&rgb, &src);

        let (rx, ry) = (
            REFERENCE_LANDMARKS[0].0.round() as u32,
            REFERENCE_LANDMARKS[0].1.round() as u32,
        );
        let mut brightest = 0u8;
        for y in ry - 2..=ry + 2 {
            for x in rx - 2..=rx + 2 {
                brightest = brightest.max(aligned.get_pixel(x, y)[0]);
            }
        }
        assert!(
            brightest > 100,
            "no bright patch near reference eye ({rx}, {ry}): max {brightest}"
        );
    }

    #[test]
    fn test_warp_out_of_bounds_is_black() {
        let rgb = RgbImage::from_pixel(10, 10, Rgb([200, 200, 200]));
        // Large translation pushes every output pixel outside the source.
        let t = Similarity {
            a: 1.0,
            b: 0.0,
            tx: -500.0,
            ty: -500.0,
        };
        let warped = warp(&rgb, t);
        assert!(warped.pixels().all(|p| p.0 == [0, 0, 0]));
    }
}
