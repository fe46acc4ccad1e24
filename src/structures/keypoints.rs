//! Ground-truth keypoints and the heatmap encode/decode pair.
//!
//! Both directions run on host memory: encoding happens once per training
//! batch on the annotations, decoding once per inference batch on detached
//! logits.

/// Ground-truth keypoints of one image, `(N, K, 3)` rows of `(x, y, visibility)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Keypoints {
    data: Vec<Vec<[f32; 3]>>,
}

/// Flattened `(N * K)` heatmap targets: bin index into the `S * S` grid and
/// whether the entry contributes to the loss.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeatmapTargets {
    pub bins: Vec<i64>,
    pub valid: Vec<bool>,
}

impl HeatmapTargets {
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn num_valid(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }
}

impl Keypoints {
    pub fn new(data: Vec<Vec<[f32; 3]>>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn num_keypoints(&self) -> usize {
        self.data.first().map(Vec::len).unwrap_or(0)
    }

    /// Encode every keypoint into a bin of a `side_len x side_len` grid laid
    /// over its instance's reference box.
    ///
    /// A keypoint is valid when it is labeled (visibility > 0) and its bin
    /// falls inside the grid. Points exactly on the right or bottom edge of
    /// the box land in the last bin. Invalid entries carry bin 0.
    pub fn to_heatmap(&self, rois: &[[f32; 4]], side_len: usize) -> HeatmapTargets {
        let mut targets = HeatmapTargets::default();
        let side = side_len as i64;

        for (instance, roi) in self.data.iter().zip(rois) {
            let [x0, y0, x1, y1] = *roi;
            let (width, height) = (x1 - x0, y1 - y0);
            let degenerate = width <= 0.0 || height <= 0.0;
            let scale_x = side_len as f32 / width;
            let scale_y = side_len as f32 / height;

            for &[x, y, visibility] in instance {
                let bin_x = if x == x1 {
                    side - 1
                } else {
                    ((x - x0) * scale_x).floor() as i64
                };
                let bin_y = if y == y1 {
                    side - 1
                } else {
                    ((y - y0) * scale_y).floor() as i64
                };

                let inside = bin_x >= 0 && bin_y >= 0 && bin_x < side && bin_y < side;
                let valid = !degenerate && inside && visibility > 0.0;

                targets.bins.push(if valid { bin_y * side + bin_x } else { 0 });
                targets.valid.push(valid);
            }
        }

        targets
    }
}

const CUBIC_A: f32 = -0.75;

fn cubic_near(x: f32) -> f32 {
    ((CUBIC_A + 2.0) * x - (CUBIC_A + 3.0)) * x * x + 1.0
}

fn cubic_far(x: f32) -> f32 {
    ((CUBIC_A * x - 5.0 * CUBIC_A) * x + 8.0 * CUBIC_A) * x - 4.0 * CUBIC_A
}

/// Source taps and weights for a half-pixel bicubic resize along one axis.
fn cubic_taps(in_len: usize, out_len: usize) -> Vec<([usize; 4], [f32; 4])> {
    let scale = in_len as f32 / out_len as f32;
    let last = in_len as i64 - 1;

    (0..out_len)
        .map(|dst| {
            let real = scale * (dst as f32 + 0.5) - 0.5;
            let base = real.floor();
            let t = real - base;
            let base = base as i64;

            let idx = [-1i64, 0, 1, 2].map(|o| (base + o).clamp(0, last) as usize);
            let weights = [
                cubic_far(t + 1.0),
                cubic_near(t),
                cubic_near(1.0 - t),
                cubic_far(2.0 - t),
            ];
            (idx, weights)
        })
        .collect()
}

fn resize_bicubic(map: &[f32], side: usize, out_h: usize, out_w: usize) -> Vec<f32> {
    let rows = cubic_taps(side, out_h);
    let cols = cubic_taps(side, out_w);
    let mut out = vec![0.0f32; out_h * out_w];

    for (oy, (ry, wy)) in rows.iter().enumerate() {
        for (ox, (rx, wx)) in cols.iter().enumerate() {
            let mut acc = 0.0f32;
            for (iy, wyi) in ry.iter().zip(wy) {
                let row = &map[iy * side..(iy + 1) * side];
                let mut line = 0.0f32;
                for (ix, wxi) in rx.iter().zip(wx) {
                    line += row[*ix] * wxi;
                }
                acc += line * wyi;
            }
            out[oy * out_w + ox] = acc;
        }
    }

    out
}

/// Decode `(R, K, S, S)` heatmap logits into `(R * K)` rows of
/// `(x, y, logit, score)` in image coordinates.
///
/// Each map is resized to its box's pixel size before taking the peak. The
/// score is a spatial softmax evaluated at the peak but normalized over the
/// pooled-resolution map, so objects of different sizes get comparable
/// scores.
pub fn heatmaps_to_keypoints(maps: &[f32], shape: [usize; 4], rois: &[[f32; 4]]) -> Vec<[f32; 4]> {
    let [num_rois, num_keypoints, side_h, side_w] = shape;
    debug_assert_eq!(side_h, side_w, "heatmaps must be square");
    let side = side_h;
    let plane = side * side;
    let mut out = Vec::with_capacity(num_rois * num_keypoints);

    for (i, roi) in rois.iter().enumerate().take(num_rois) {
        let [x0, y0, x1, y1] = *roi;
        let width = (x1 - x0).max(1.0);
        let height = (y1 - y0).max(1.0);
        let width_ceil = width.ceil();
        let height_ceil = height.ceil();
        let width_correction = width / width_ceil;
        let height_correction = height / height_ceil;
        let (out_w, out_h) = (width_ceil as usize, height_ceil as usize);

        for k in 0..num_keypoints {
            let offset = (i * num_keypoints + k) * plane;
            let pooled = &maps[offset..offset + plane];
            let roi_map = resize_bicubic(pooled, side, out_h, out_w);

            let (pos, max_score) = roi_map.iter().enumerate().fold(
                (0usize, f32::NEG_INFINITY),
                |(best_pos, best), (pos, &v)| if v > best { (pos, v) } else { (best_pos, best) },
            );
            let denom: f32 = pooled.iter().map(|v| (v - max_score).exp()).sum();
            let score = 1.0 / denom;

            let x_int = pos % out_w;
            let y_int = pos / out_w;
            let x = (x_int as f32 + 0.5) * width_correction + x0;
            let y = (y_int as f32 + 0.5) * height_correction + y0;

            out.push([x, y, max_score, score]);
        }
    }

    out
}
