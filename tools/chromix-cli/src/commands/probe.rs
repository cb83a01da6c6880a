//! Show media information for a file.

use std::path::PathBuf;

use chromix_common::config::AppConfig;
use chromix_composite_engine::probe::probe_media;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let tools = AppConfig::load().tools;
    let info = probe_media(&tools.ffprobe, &path)?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
