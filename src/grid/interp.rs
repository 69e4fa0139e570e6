use log::debug;

use super::{round2, GridSnapshot};

/// Index of the largest key <= x, clamped so that both a low and
/// a high neighbor exist (they coincide on single row/column grids).
fn bracket(keys: &[f64], x: f64) -> (usize, usize) {
    let i = keys.partition_point(|k| *k <= x).saturating_sub(1);
    let i = i.min(keys.len().saturating_sub(2));
    (i, (i + 1).min(keys.len() - 1))
}

/// Bilinear interpolation of the [GridSnapshot] at (lat, lon), rounded to 2 decimal digits.
///
/// - Returns None when (lat, lon) lies outside the grid bounds: we never extrapolate.
/// - When one of the 4 bracketing corners is not defined (sparse grid), we fall back
///   to the nearest defined corner, or to the nearest grid point if none of them exists.
pub fn interpolate(grid: &GridSnapshot, lat: f64, lon: f64) -> Option<f64> {
    if grid.is_empty() || !grid.contains(lat, lon) {
        debug!("grid: ({:.6}, {:.6}) outside grid bounds", lat, lon);
        return None;
    }

    let (lats, lons) = (grid.latitudes(), grid.longitudes());

    let (i0, i1) = bracket(lats, lat);
    let (j0, j1) = bracket(lons, lon);

    let (lat0, lat1) = (lats[i0], lats[i1]);
    let (lon0, lon1) = (lons[j0], lons[j1]);

    let corners = [(lat0, lon0), (lat1, lon0), (lat0, lon1), (lat1, lon1)];
    let values = corners.map(|(la, lo)| grid.value(la, lo));

    if let [Some(q00), Some(q10), Some(q01), Some(q11)] = values {
        let tx = if lat1 == lat0 {
            0.0
        } else {
            (lat - lat0) / (lat1 - lat0)
        };

        let ty = if lon1 == lon0 {
            0.0
        } else {
            (lon - lon0) / (lon1 - lon0)
        };

        let value = q00 * (1.0 - tx) * (1.0 - ty)
            + q10 * tx * (1.0 - ty)
            + q01 * (1.0 - tx) * ty
            + q11 * tx * ty;

        return Some(round2(value));
    }

    let distance = |la: f64, lo: f64| (la - lat).powi(2) + (lo - lon).powi(2);

    let nearest = corners
        .iter()
        .zip(values.iter())
        .filter_map(|((la, lo), value)| Some((distance(*la, *lo), *la, *lo, (*value)?)))
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .or_else(|| {
            grid.points()
                .map(|(la, lo, value)| (distance(la, lo), la, lo, value))
                .min_by(|a, b| a.0.total_cmp(&b.0))
        });

    let (_, la, lo, value) = nearest?;
    debug!("grid: nearest neighbor fallback ({}, {})={}", la, lo, value);
    Some(round2(value))
}
