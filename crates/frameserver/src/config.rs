use anyhow::Context;
use common::{Environment, config};
use datatypes::PixelFormat;

#[derive(Debug, Clone)]
pub struct FrameServerConfig {
    pub environment: Environment,
    pub sink_address: String,
    pub rows: u32,
    pub cols: u32,
    pub pixel_format: PixelFormat,
    pub fps: f64,
    pub num_frames: Option<u64>,
}

impl FrameServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();

        let sink_address = config::var("SINK_ADDRESS")
            .context("SINK_ADDRESS must name the frame segment to publish")?;

        let rows = config::var_or("FRAME_ROWS", 480);
        let cols = config::var_or("FRAME_COLS", 640);
        let fps = config::var_or("FPS", 30.0);
        let num_frames = config::var("NUM_FRAMES").and_then(|s| s.parse().ok());

        let pixel_format = match config::var("PIXEL_FORMAT").as_deref() {
            None | Some("gray8") => PixelFormat::Gray8,
            Some("bgr8") => PixelFormat::Bgr8,
            Some("rgb8") => PixelFormat::Rgb8,
            Some(other) => anyhow::bail!("Unknown PIXEL_FORMAT '{other}'"),
        };

        anyhow::ensure!(rows > 0 && cols > 0, "Frame dimensions must be non-zero");

        Ok(Self {
            environment,
            sink_address,
            rows,
            cols,
            pixel_format,
            fps,
            num_frames,
        })
    }
}
