//! ffmpeg argument builder for the background overlay render.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Target frame size (vertical 9:16).
pub const FRAME_WIDTH: u32 = 1080;
pub const FRAME_HEIGHT: u32 = 1920;
/// Width the overlay video is scaled to; height follows the aspect ratio.
pub const OVERLAY_WIDTH: u32 = 800;
pub const FRAME_RATE: u32 = 60;
pub const CRF: u8 = 22;
pub const PRESET: &str = "veryfast";
pub const AUDIO_BITRATE: &str = "128k";
const LOG_LEVEL: &str = "error";

/// Builds the argument list for one overlay render.
///
/// Input 0 is the looped background image, input 1 the source video.
#[derive(Debug, Clone)]
pub struct OverlayCommand {
    background: PathBuf,
    input: PathBuf,
    output: PathBuf,
    frame_width: u32,
    frame_height: u32,
    overlay_width: u32,
    frame_rate: u32,
}

impl OverlayCommand {
    pub fn new(
        background: impl AsRef<Path>,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Self {
        Self {
            background: background.as_ref().to_path_buf(),
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            frame_width: FRAME_WIDTH,
            frame_height: FRAME_HEIGHT,
            overlay_width: OVERLAY_WIDTH,
            frame_rate: FRAME_RATE,
        }
    }

    /// The `-filter_complex` graph.
    ///
    /// The background is fitted inside the frame and padded black, the
    /// overlay is scaled to a fixed width with an even height (`-2`), then
    /// centered on top for as long as the shorter input lasts.
    pub fn filter_graph(&self) -> String {
        let (w, h, ow) = (self.frame_width, self.frame_height, self.overlay_width);
        format!(
            "[0:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black[bg];\
             [1:v]scale={ow}:-2[ov];\
             [bg][ov]overlay=(W-w)/2:(H-h)/2:shortest=1,format=yuv420p[out]"
        )
    }

    /// Build the command arguments (without the program name).
    ///
    /// Paths are passed through as `OsString`, so names that are not valid
    /// UTF-8 reach ffmpeg byte for byte.
    pub fn build_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", LOG_LEVEL]
            .map(OsString::from)
            .to_vec();

        args.extend(["-loop", "1", "-i"].map(OsString::from));
        args.push(self.background.clone().into_os_string());
        args.push("-i".into());
        args.push(self.input.clone().into_os_string());

        args.push("-filter_complex".into());
        args.push(self.filter_graph().into());
        // Audio is optional: `?` makes a silent source map nothing instead of failing.
        args.extend(["-map", "[out]", "-map", "1:a?"].map(OsString::from));

        let crf = CRF.to_string();
        let rate = self.frame_rate.to_string();
        args.extend(
            [
                "-c:v",
                "libx264",
                "-preset",
                PRESET,
                "-crf",
                crf.as_str(),
                "-r",
                rate.as_str(),
                "-c:a",
                "aac",
                "-b:a",
                AUDIO_BITRATE,
                "-shortest",
            ]
            .map(OsString::from),
        );

        args.push(self.output.clone().into_os_string());
        args
    }
}
