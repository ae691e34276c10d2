//! Synthesize one phrase with the persisted configuration and write it to a WAV file
//!
//! ```text
//! cargo run --example synthesize -- "你好，旅行者" out.wav [speaker]
//! ```

use anyhow::Context;
use tts_bridge::config::default_config_path;
use tts_bridge::{SynthesisOverrides, TtsBridge};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let text = args.next().context("usage: synthesize <text> <output.wav> [speaker]")?;
    let output = args.next().unwrap_or_else(|| "output.wav".to_string());

    let mut overrides = SynthesisOverrides::new();
    if let Some(speaker) = args.next() {
        overrides = overrides.speaker(speaker);
    }

    // Loads (or creates) the config file and installs the logger
    let config_path = default_config_path();
    let bridge = TtsBridge::open(config_path.clone())
        .with_context(|| format!("failed to open config {}", config_path.display()))?;

    let asset = bridge.synthesize(&text, overrides).await?;
    tokio::fs::write(&output, &asset.bytes)
        .await
        .with_context(|| format!("failed to write {}", output))?;

    println!("Wrote {} bytes to {}", asset.len(), output);
    if let Some(url) = &asset.source_url {
        println!("Provider URL: {}", url);
    }

    bridge.cleanup().await;
    Ok(())
}
