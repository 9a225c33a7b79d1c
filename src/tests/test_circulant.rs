use ndarray::{Array4, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::circulant::{BccbLayout, KroneckerComposer, LayoutCache, SkewCirculantGenerator};
use crate::linalg;

#[test]
fn test_orthogonality_for_all_small_kernels() {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut cache = LayoutCache::new();
    for k1 in 1..=7 {
        for k2 in 1..=7 {
            let generator = SkewCirculantGenerator::from_cache(&mut cache, k1, k2).unwrap();
            let q = generator.generate(&mut rng).unwrap();
            let residual = linalg::orthogonality_residual(q.view());
            assert!(residual < 1e-4, "k = ({}, {}) residual {}", k1, k2, residual);
        }
    }
    assert_eq!(cache.len(), 49);
}

#[test]
fn test_kronecker_orthogonality() {
    let mut rng = StdRng::seed_from_u64(17);
    for n in [1, 2, 4] {
        let w = KroneckerComposer::new(n, 3, 3).unwrap().compose(&mut rng).unwrap();
        assert!(linalg::orthogonality_residual(w.view()) < 1e-4);
    }
}

#[test]
fn test_channel_blocks_scale_q() {
    // Every channel block of T ⊗ Q is a multiple of the same Q
    let w = KroneckerComposer::new(3, 2, 3)
        .unwrap()
        .compose(&mut StdRng::seed_from_u64(23))
        .unwrap();
    let q = SkewCirculantGenerator::new(2, 3)
        .unwrap()
        .generate(&mut StdRng::seed_from_u64(23))
        .unwrap();
    let k = 6;
    for i in 0..3 {
        for j in 0..3 {
            let block = w.slice(ndarray::s![i * k..(i + 1) * k, j * k..(j + 1) * k]);
            // <Q, Q> = k for an orthogonal Q
            let scale = block.iter().zip(q.iter()).map(|(a, b)| a * b).sum::<f64>() / k as f64;
            for (a, b) in block.iter().zip(q.iter()) {
                assert!((a - scale * b).abs() < 1e-10);
            }
        }
    }
}

#[test]
fn test_round_trip_preserves_every_tap() {
    let layout = BccbLayout::new(3, 3, 4).unwrap();
    let filter = Array4::from_shape_fn((3, 3, 4, 4), |(a, b, c, d)| {
        (a * 1000 + b * 100 + c * 10 + d) as f32
    });
    let matrix = layout.forward(filter.view()).unwrap();
    assert_eq!(layout.backward(matrix.view()).unwrap(), filter);

    // Each tap appears exactly k1*k2 times in the BCCB matrix
    let count = matrix.iter().filter(|&&x| x == 1203.0).count();
    assert_eq!(count, 9);
}

#[test]
fn test_backward_reads_first_column_of_each_block() {
    let layout = BccbLayout::new(2, 2, 2).unwrap();
    let filter = Array4::from_shape_fn((2, 2, 2, 2), |(a, b, c, d)| (a * 8 + b * 4 + c * 2 + d) as i32);
    let matrix = layout.forward(filter.view()).unwrap();
    // Block (in=1, out=0) column 0 lists the taps of channel pair (1, 0) in filter order
    let column: Vec<i32> = matrix.column(0).iter().skip(4).copied().collect();
    let taps: Vec<i32> = filter
        .index_axis(Axis(3), 0)
        .index_axis(Axis(2), 1)
        .iter()
        .copied()
        .collect();
    assert_eq!(column, taps);
}
