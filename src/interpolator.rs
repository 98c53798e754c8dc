use ndarray::{Array2, Array3, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut1, Axis, Zip};

/// Pole of the cubic B-spline prefilter.
const POLE: f64 = -0.267_949_192_431_122_7; // sqrt(3) - 2

pub(crate) struct Interpolator;

impl Interpolator {
    /// Trilinear sample of a `[z, y, x]` grid at a continuous index.
    ///
    /// Points within half a voxel of the grid use clamped neighbours, anything
    /// further out is 0.
    pub(crate) fn trilinear(data: &ArrayView3<f32>, z: f64, y: f64, x: f64) -> f32 {
        let (depth, height, width) = data.dim();
        let inside = |c: f64, n: usize| c >= -0.5 && c <= n as f64 - 0.5;
        if !(inside(z, depth) && inside(y, height) && inside(x, width)) {
            return 0.0;
        }

        let split = |c: f64, n: usize| {
            let c = c.clamp(0.0, (n - 1) as f64);
            let c0 = c.floor() as usize;
            let c1 = (c0 + 1).min(n - 1);
            (c0, c1, (c - c0 as f64) as f32)
        };
        let (z0, z1, dz) = split(z, depth);
        let (y0, y1, dy) = split(y, height);
        let (x0, x1, dx) = split(x, width);

        let plane = |zi: usize| {
            let v0 = data[[zi, y0, x0]].mul_add(1.0 - dx, data[[zi, y0, x1]] * dx);
            let v1 = data[[zi, y1, x0]].mul_add(1.0 - dx, data[[zi, y1, x1]] * dx);
            v0.mul_add(1.0 - dy, v1 * dy)
        };
        plane(z0).mul_add(1.0 - dz, plane(z1) * dz)
    }

    #[inline]
    pub(crate) fn bilinear_interpolate(slice: &ArrayView2<f64>, y: f64, x: f64) -> f64 {
        let (height, width) = slice.dim();

        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dy = y - y0 as f64;
        let dx = x - x0 as f64;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v00 = slice[[y0, x0]];
        let v01 = slice[[y0, x1]];
        let v10 = slice[[y1, x0]];
        let v11 = slice[[y1, x1]];

        let v0 = v00.mul_add(one_minus_dx, v01 * dx);
        let v1 = v10.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }

    /// Linearly resample the rows of `array` to `rows`, columns unchanged.
    ///
    /// Pixel centres are aligned the way image resizing does it: output row
    /// `r` reads source row `(r + 0.5) * h_in / h_out - 0.5`, clamped to the
    /// valid range.
    pub(crate) fn resize_rows(array: &ArrayView2<f64>, rows: usize) -> Array2<f64> {
        let (height, width) = array.dim();
        if height == 0 || width == 0 {
            return Array2::zeros((rows, width));
        }
        let scale = height as f64 / rows as f64;

        Array2::from_shape_fn((rows, width), |(r, c)| {
            let src_y = ((r as f64 + 0.5) * scale - 0.5).clamp(0.0, (height - 1) as f64);
            Self::bilinear_interpolate(array, src_y, c as f64)
        })
    }

    /// Cubic B-spline coefficients of a 3D grid (mirror boundary).
    pub(crate) fn spline_coefficients_3d(data: &ArrayView3<f32>) -> Array3<f64> {
        let mut coeffs = data.mapv(f64::from);
        for axis in 0..3 {
            Zip::from(coeffs.lanes_mut(Axis(axis))).par_for_each(prefilter_lane);
        }
        coeffs
    }

    pub(crate) fn spline_coefficients_2d(data: &ArrayView2<f64>) -> Array2<f64> {
        let mut coeffs = data.to_owned();
        for axis in 0..2 {
            Zip::from(coeffs.lanes_mut(Axis(axis))).par_for_each(prefilter_lane);
        }
        coeffs
    }

    /// Cubic spline resampling of a 3D grid at `(z, y, x)` coordinate arrays,
    /// 0 outside `[0, n - 1]` on any axis.
    pub(crate) fn map_coordinates_3d(
        data: &ArrayView3<f32>,
        z: &ArrayView3<f64>,
        y: &ArrayView3<f64>,
        x: &ArrayView3<f64>,
    ) -> Array3<f64> {
        let coeffs = Self::spline_coefficients_3d(data);
        let (depth, height, width) = coeffs.dim();
        let mut out = Array3::zeros(z.raw_dim());

        Zip::from(&mut out)
            .and(z)
            .and(y)
            .and(x)
            .par_for_each(|out, &z, &y, &x| {
                let (Some(tz), Some(ty), Some(tx)) =
                    (taps(z, depth), taps(y, height), taps(x, width))
                else {
                    return;
                };
                let mut sum = 0.0;
                for (iz, wz) in tz {
                    for (iy, wy) in ty {
                        let row = coeffs.slice(ndarray::s![iz, iy, ..]);
                        sum += wz * wy * dot_row(&row, &tx);
                    }
                }
                *out = sum;
            });
        out
    }

    /// Cubic spline resampling of a 2D grid at `(y, x)` coordinate arrays,
    /// 0 outside `[0, n - 1]` on any axis.
    pub(crate) fn map_coordinates_2d(
        data: &ArrayView2<f64>,
        y: &ArrayView2<f64>,
        x: &ArrayView2<f64>,
    ) -> Array2<f64> {
        let coeffs = Self::spline_coefficients_2d(data);
        let (height, width) = coeffs.dim();
        let mut out = Array2::zeros(y.raw_dim());

        Zip::from(&mut out).and(y).and(x).par_for_each(|out, &y, &x| {
            let (Some(ty), Some(tx)) = (taps(y, height), taps(x, width)) else {
                return;
            };
            *out = ty
                .iter()
                .map(|&(iy, wy)| wy * dot_row(&coeffs.row(iy), &tx))
                .sum();
        });
        out
    }
}

fn dot_row(row: &ArrayView1<f64>, taps: &[(usize, f64); 4]) -> f64 {
    taps.iter().map(|&(i, w)| w * row[i]).sum()
}

/// Indices and weights of the four spline taps around `c`.
fn taps(c: f64, n: usize) -> Option<[(usize, f64); 4]> {
    if n == 0 || !(0.0..=(n - 1) as f64).contains(&c) {
        return None;
    }
    let base = c.floor();
    let t = c - base;
    let u = 1.0 - t;
    let weights = [
        u * u * u / 6.0,
        2.0 / 3.0 - t * t + t * t * t / 2.0,
        2.0 / 3.0 - u * u + u * u * u / 2.0,
        t * t * t / 6.0,
    ];
    let base = base as i64;
    Some(std::array::from_fn(|k| {
        (mirror(base - 1 + k as i64, n), weights[k])
    }))
}

fn mirror(i: i64, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as i64 - 1);
    let i = i.rem_euclid(period);
    if i >= n as i64 { (period - i) as usize } else { i as usize }
}

fn prefilter_lane(mut lane: ArrayViewMut1<f64>) {
    let n = lane.len();
    if n < 2 {
        return;
    }
    let mut c: Vec<f64> = lane.iter().map(|v| v * 6.0).collect();

    c[0] = causal_init(&c);
    for k in 1..n {
        c[k] += POLE * c[k - 1];
    }
    c[n - 1] = POLE / (POLE * POLE - 1.0) * (POLE * c[n - 2] + c[n - 1]);
    for k in (0..n - 1).rev() {
        c[k] = POLE * (c[k + 1] - c[k]);
    }

    for (dst, src) in lane.iter_mut().zip(c) {
        *dst = src;
    }
}

fn causal_init(c: &[f64]) -> f64 {
    let n = c.len();
    let horizon = (f64::EPSILON.ln() / POLE.abs().ln()).ceil() as usize;

    if horizon < n {
        let mut zn = POLE;
        let mut sum = c[0];
        for v in &c[1..horizon] {
            sum += zn * v;
            zn *= POLE;
        }
        return sum;
    }

    // full mirror-symmetric sum
    let iz = 1.0 / POLE;
    let mut zn = POLE;
    let mut z2n = POLE.powi(n as i32 - 1);
    let mut sum = c[0] + z2n * c[n - 1];
    z2n *= z2n * iz;
    for v in &c[1..n - 1] {
        sum += (zn + z2n) * v;
        zn *= POLE;
        z2n *= iz;
    }
    sum / (1.0 - zn * zn)
}
