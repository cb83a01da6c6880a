//! Check external tool availability.

use chromix_common::config::AppConfig;
use chromix_composite_engine::accel::select_encoder;
use chromix_composite_engine::ffmpeg::verify_tools;

pub fn run() -> anyhow::Result<()> {
    let tools = AppConfig::load().tools;
    println!("Checking external tools:");
    println!("  ffmpeg:  {}", tools.ffmpeg);
    println!("  ffprobe: {}", tools.ffprobe);

    match verify_tools(&tools.ffmpeg, &tools.ffprobe) {
        Ok(()) => println!("  Status:  OK"),
        Err(e) => {
            println!("  Status:  UNAVAILABLE ({e})");
            return Err(e.into());
        }
    }

    let hardware = select_encoder(&tools.ffmpeg, true, false);
    if hardware.hardware {
        println!("  Hardware encoder: {}", hardware.codec);
    } else {
        println!("  Hardware encoder: none (software x264 will be used)");
    }

    Ok(())
}
