//! scopecam_probe - open the camera and dump its description.

use anyhow::Result;
use clap::Parser;

use scopecam::driver::sim::{SimCamera, SimConfig};
use scopecam::CameraDriver;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Pretend no camera is attached (exercises the failure path).
    #[arg(long)]
    absent: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut camera = SimCamera::new(SimConfig {
        present: !args.absent,
        ..SimConfig::default()
    });
    camera.open()?;
    let info = camera.describe()?;

    println!("camera: {} (serial {})", info.model, info.serial);
    println!("  firmware: {}", info.firmware);
    println!("  hardware: {}", info.hardware);
    println!("  max bit depth: {}", info.max_bit_depth);
    println!("  mono: {}", info.mono);
    println!("  max frame rate: {} fps", info.max_fps);
    println!("  still resolutions:");
    for (index, (width, height)) in info.resolutions.iter().enumerate() {
        println!("    {index}: {width} x {height}");
    }
    let (width, height) = camera.geometry()?;
    println!("  active geometry: {width} x {height}");

    camera.close();
    Ok(())
}
