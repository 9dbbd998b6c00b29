//! Filter-graph descriptions for the retiming filters, kept free of FFmpeg
//! types so they can be checked without native libraries.

use crate::config::Speed;

/// Target format of the audio chain, normally the encoder's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_format: String,
    pub sample_rate: u32,
    pub channel_layout: String,
    /// Samples per output frame.
    pub frame_size: usize,
}

/// `setpts` divides presentation time by the speed, then frames are
/// converted to the encoder's pixel format.
pub fn video_chain(speed: Speed, pixel_format: &str) -> String {
    format!("setpts=PTS/{},format={}", speed, pixel_format)
}

/// `atempo` resamples the audio to the new tempo (skipped at 1x). Timestamps
/// are then regenerated from the running sample count, so they stay
/// contiguous after the tempo change and line up with the encoder's frames.
pub fn audio_chain(speed: Speed, format: &AudioFormat) -> String {
    let mut filters = Vec::with_capacity(4);
    if !speed.is_identity() {
        filters.push(format!("atempo={}", speed));
    }
    filters.push("asetpts=N/SR/TB".to_string());
    filters.push(format!(
        "aformat=sample_fmts={}:sample_rates={}:channel_layouts={}",
        format.sample_format, format.sample_rate, format.channel_layout
    ));
    filters.push(format!("asetnsamples=n={}", format.frame_size));
    filters.join(",")
}
