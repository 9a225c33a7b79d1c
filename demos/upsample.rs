//! Upsample a feature map with a pseudo-orthogonal filter
//!
//! Run with `RUST_LOG=debug cargo run --example upsample` to see the dispatch decisions.

use ndarray::{Array4, Ix4};
use orthoconv::circulant::BccbLayout;
use orthoconv::layers::{GeneralizedConvolution, InitializerExt, PseudoOrthogonalInit};
use orthoconv::linalg;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let mut init = PseudoOrthogonalInit::new(Some(2017));
    let filter = init.initialize::<f64>(&[3, 3, 4, 4])?;

    let layout = BccbLayout::new(3, 3, 4)?;
    let matrix = layout.forward(filter.view().into_dimensionality::<Ix4>()?)?;
    println!(
        "BCCB matrix {}x{}, max |WᵗW - I| = {:e}",
        matrix.nrows(),
        matrix.ncols(),
        linalg::orthogonality_residual(matrix.view())
    );

    let filter = filter.mapv(|x| x as f32);
    let input = Array4::from_shape_fn((1, 8, 8, 4), |(_, y, x, c)| ((y * 8 + x) * 4 + c) as f32 / 256.0).into_dyn();

    let conv: GeneralizedConvolution = GeneralizedConvolution::default();
    for strides in [vec![Some(1.0), Some(1.0)], vec![Some(0.5), Some(0.5)], vec![Some(2.0), None]] {
        let output = conv.apply(input.view(), filter.view(), &[3, 3, 4, 4], &strides)?;
        println!("strides {:?} -> output shape {:?}", strides, output.shape());
    }

    match conv.apply(input.view(), filter.view(), &[3, 3, 4, 4], &[Some(2.0), Some(0.5)]) {
        Ok(_) => println!("mixed strides unexpectedly accepted"),
        Err(e) => println!("mixed strides rejected: {}", e),
    }

    Ok(())
}
