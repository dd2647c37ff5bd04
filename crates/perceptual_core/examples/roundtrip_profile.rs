use ndarray::Array4;
use perceptual_core::{Execution, Height, PyramidConfig, Selection, SteerablePyramid};
use std::time::Instant;

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse::<T>().ok())
        .unwrap_or(default)
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn build_image(batch: usize, rows: usize, cols: usize) -> Array4<f32> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    Array4::from_shape_fn((batch, 1, rows, cols), |_| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 40) as f32) / ((1u64 << 24) as f32)
    })
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let rows = parse_arg(&args, "--rows", 512usize);
    let cols = parse_arg(&args, "--cols", 512usize);
    let batch = parse_arg(&args, "--batch", 4usize);
    let order = parse_arg(&args, "--order", 3usize);
    let height = parse_arg(&args, "--height", 0usize);
    let is_complex = has_flag(&args, "--complex");
    let no_downsample = has_flag(&args, "--no-downsample");
    let execution = if has_flag(&args, "--sequential") {
        Execution::Sequential
    } else {
        Execution::default()
    };

    println!(
        "roundtrip start rows={} cols={} batch={} order={} height={} complex={} \
         downsample={} execution={:?}",
        rows,
        cols,
        batch,
        order,
        height,
        is_complex,
        !no_downsample,
        execution
    );

    let config = PyramidConfig::new((rows, cols))
        .height(if height == 0 { Height::Auto } else { Height::Levels(height) })
        .order(order)
        .is_complex(is_complex)
        .downsample(!no_downsample)
        .execution(execution);

    let t0 = Instant::now();
    let mut pyr = SteerablePyramid::<f32>::new(config).expect("pyramid construction failed");
    let build = t0.elapsed();

    let image = build_image(batch, rows, cols);

    let t1 = Instant::now();
    let coeffs = pyr.forward(image.view(), &[]).expect("forward failed");
    let forward = t1.elapsed();

    let t2 = Instant::now();
    let recon = pyr
        .recon_pyr(&coeffs, Selection::All, Selection::All, 1.0)
        .expect("reconstruction failed");
    let reconstruction = t2.elapsed();

    let max_err = image
        .iter()
        .zip(recon.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max);
    let coeff_count: usize = coeffs.iter().map(|(_, b)| b.shape().iter().product::<usize>()).sum();

    println!(
        "roundtrip done scales={} bands={} coeffs={} build_s={:.3} forward_s={:.3} \
         recon_s={:.3} max_abs_err={:.3e}",
        pyr.num_scales(),
        coeffs.len(),
        coeff_count,
        build.as_secs_f64(),
        forward.as_secs_f64(),
        reconstruction.as_secs_f64(),
        max_err
    );
}
