use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Playback-speed multiplier applied by the retiming filters.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Speed(f64);

impl Speed {
    pub const MIN: f64 = 0.5;
    pub const MAX: f64 = 3.0;

    /// Clamps into `[MIN, MAX]`. Non-finite values fall back to 1.0.
    pub fn new(value: f64) -> Self {
        if !value.is_finite() {
            log::warn!("speed {} is not finite, using 1.0", value);
            return Self::default();
        }
        let clamped = value.clamp(Self::MIN, Self::MAX);
        if clamped != value {
            log::warn!("speed {} out of range, clamped to {}", value, clamped);
        }
        Self(clamped)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_identity(&self) -> bool {
        self.0 == 1.0
    }
}

impl Default for Speed {
    fn default() -> Self {
        Self(1.0)
    }
}

impl Display for Speed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Speed {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid speed {:?}: {}", s, e))?;
        if !value.is_finite() {
            return Err(anyhow::anyhow!("invalid speed {:?}: not a finite number", s));
        }
        Ok(Self::new(value))
    }
}

/// Everything one transcode run needs to know.
#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    pub input: String,
    pub output: String,
    pub speed: Speed,
    /// Encoder names tried in order; the first one available wins.
    pub video_encoders: Vec<String>,
    pub audio_encoders: Vec<String>,
    /// Used when the input stream does not report a bit rate.
    pub video_bit_rate_fallback: usize,
    pub audio_bit_rate_fallback: usize,
    pub gop_size: u32,
    pub max_b_frames: usize,
    /// Samples per audio frame fed to the encoder.
    pub audio_frame_size: usize,
}

pub const DEFAULT_INPUT: &str = "1.mp4";
pub const DEFAULT_OUTPUT: &str = "output.mp4";

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            input: DEFAULT_INPUT.to_string(),
            output: DEFAULT_OUTPUT.to_string(),
            speed: Speed::default(),
            video_encoders: ["libx264", "mpeg4", "h264", "libxvid", "mjpeg"]
                .map(String::from)
                .to_vec(),
            audio_encoders: ["libfdk_aac", "libfaac", "aac", "mp3", "libmp3lame"]
                .map(String::from)
                .to_vec(),
            video_bit_rate_fallback: 431_000,
            audio_bit_rate_fallback: 130_000,
            gop_size: 25,
            max_b_frames: 3,
            audio_frame_size: 1024,
        }
    }
}

impl TranscodeConfig {
    pub fn new(input: &str, output: &str, speed: Speed) -> Self {
        Self {
            input: input.to_string(),
            output: output.to_string(),
            speed,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_is_clamped() {
        assert_eq!(Speed::new(0.1).value(), 0.5);
        assert_eq!(Speed::new(5.0).value(), 3.0);
        assert_eq!(Speed::new(1.5).value(), 1.5);
        assert_eq!(Speed::new(f64::NAN).value(), 1.0);
        assert!(Speed::default().is_identity());
    }

    #[test]
    fn test_speed_parses() {
        assert_eq!("2".parse::<Speed>().unwrap().value(), 2.0);
        assert_eq!(" 0.75 ".parse::<Speed>().unwrap().value(), 0.75);
        assert_eq!("10".parse::<Speed>().unwrap().value(), 3.0);
        assert!("fast".parse::<Speed>().is_err());
        assert!("".parse::<Speed>().is_err());
        assert!("inf".parse::<Speed>().is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = TranscodeConfig::new("in.mkv", "out.mp4", Speed::new(2.0));
        assert_eq!(config.input, "in.mkv");
        assert_eq!(config.speed.value(), 2.0);
        assert_eq!(config.video_encoders[0], "libx264");
        assert_eq!(config.audio_encoders.last().unwrap(), "libmp3lame");
        assert_eq!(config.gop_size, 25);
        assert_eq!(config.audio_frame_size, 1024);
    }
}
