//! Synthetic fixtures shared by unit tests.

use crate::vector::Matrix;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Gaussian-ish blobs around `centers`, `sizes[i]` points each, in blob order.
pub fn blobs(centers: &[Vec<f32>], sizes: &[usize], spread: f32, seed: u64) -> Matrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Vec::new();
    for (center, &size) in centers.iter().zip(sizes) {
        for _ in 0..size {
            let row = center
                .iter()
                .map(|c| {
                    // sum of uniforms is close enough to normal for fixtures
                    let noise: f32 = (0..4).map(|_| rng.random::<f32>() - 0.5).sum();
                    c + noise * spread
                })
                .collect();
            rows.push(row);
        }
    }
    Matrix::from_rows(rows).unwrap()
}

/// One-hot style center on `axis` of a `dim`-dimensional space.
pub fn axis(dim: usize, axis: usize, scale: f32) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[axis] = scale;
    v
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_time(NaiveTime::MIN)
}
