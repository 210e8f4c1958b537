use anyhow::Result;
use sleep_posture::data_loading::read_matrix;
use sleep_posture::experiment::ExperimentKind;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        println!("Usage: {} <matrix_file>", args[0]);
        std::process::exit(1);
    }

    let matrix = read_matrix(&args[1])?;

    println!("\nMatrix:");
    println!("  rows:    {}", matrix.rows);
    println!("  columns: {}", matrix.columns);
    println!("  samples: {}", matrix.values.len());

    println!("\nFrame shapes:");
    for kind in [ExperimentKind::I, ExperimentKind::II] {
        let dims = kind.frame_dims();
        let len = matrix.values.len();
        if len % dims.area() == 0 {
            println!("  {} ({}): {} frames", kind, dims, len / dims.area());
        } else {
            println!(
                "  {} ({}): incompatible, {} samples left over",
                kind,
                dims,
                len % dims.area()
            );
        }
    }

    Ok(())
}
