use ffmpeg_next::{codec::Parameters, format::stream, media};

use crate::unit::{Rational, StreamTag};

unsafe impl Send for AvStream {}
unsafe impl Sync for AvStream {}

/// Snapshot of an input stream, detached from its format context.
pub struct AvStream {
    index: usize,
    parameters: Parameters,
    time_base: Rational,
    rate: Rational,
    bit_rate: usize,
}

impl AvStream {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn rate(&self) -> Rational {
        self.rate
    }

    /// Declared bit rate, 0 when the container does not report one.
    pub fn bit_rate(&self) -> usize {
        self.bit_rate
    }

    pub fn tag(&self) -> Option<StreamTag> {
        match self.parameters.medium() {
            media::Type::Video => Some(StreamTag::Video),
            media::Type::Audio => Some(StreamTag::Audio),
            media::Type::Subtitle => Some(StreamTag::Subtitle),
            _ => None,
        }
    }
}

impl From<stream::Stream<'_>> for AvStream {
    fn from(stream: stream::Stream<'_>) -> Self {
        let parameters = stream.parameters();
        let bit_rate = unsafe { (*parameters.as_ptr()).bit_rate.max(0) as usize };
        Self {
            index: stream.index(),
            parameters,
            time_base: stream.time_base().into(),
            rate: stream.avg_frame_rate().into(),
            bit_rate,
        }
    }
}

impl Clone for AvStream {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            parameters: self.parameters.clone(),
            time_base: self.time_base,
            rate: self.rate,
            bit_rate: self.bit_rate,
        }
    }
}
