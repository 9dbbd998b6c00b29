use ffmpeg_next::{Packet, codec::decoder, frame};

use crate::{
    ffmpeg::{frame::RawFrame, is_again, stream::AvStream},
    stage::{Feed, Transform},
    unit::{Rational, StreamTag, Unit},
};

enum DecoderType {
    Video(decoder::Video),
    Audio(decoder::Audio),
}

impl DecoderType {
    fn send_packet(&mut self, packet: &Packet) -> Result<(), ffmpeg_next::Error> {
        match self {
            DecoderType::Video(decoder) => decoder.send_packet(packet),
            DecoderType::Audio(decoder) => decoder.send_packet(packet),
        }
    }

    fn send_eof(&mut self) -> Result<(), ffmpeg_next::Error> {
        match self {
            DecoderType::Video(decoder) => decoder.send_eof(),
            DecoderType::Audio(decoder) => decoder.send_eof(),
        }
    }

    fn receive_frame(&mut self) -> anyhow::Result<Option<RawFrame>> {
        let result = match self {
            DecoderType::Video(decoder) => {
                let mut frame = frame::Video::empty();
                decoder
                    .receive_frame(&mut frame)
                    .map(|_| RawFrame::Video(frame))
            }
            DecoderType::Audio(decoder) => {
                let mut frame = frame::Audio::empty();
                decoder
                    .receive_frame(&mut frame)
                    .map(|_| RawFrame::Audio(frame))
            }
        };
        match result {
            Ok(frame) => Ok(Some(frame)),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(e) if is_again(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Packet to frame decoder for one input stream. Frames keep the stream's
/// time base.
pub struct Decoder {
    tag: StreamTag,
    inner: DecoderType,
    time_base: Rational,
}

impl Decoder {
    pub fn new(stream: &AvStream) -> anyhow::Result<Self> {
        let tag = stream
            .tag()
            .ok_or(anyhow::anyhow!("unsupported stream #{}", stream.index()))?;
        let mut decoder_ctx =
            ffmpeg_next::codec::Context::from_parameters(stream.parameters().clone())?;
        let time_base: ffmpeg_next::Rational = stream.time_base().into();
        unsafe {
            (*decoder_ctx.as_mut_ptr()).time_base = time_base.into();
            (*decoder_ctx.as_mut_ptr()).pkt_timebase = time_base.into();
        }

        let inner = match tag {
            StreamTag::Video => {
                let video = decoder_ctx.decoder().video()?;
                if video.format() == ffmpeg_next::format::Pixel::None
                    || video.width() == 0
                    || video.height() == 0
                {
                    return Err(anyhow::anyhow!("missing video codec parameters"));
                }
                log::info!(
                    "video decoder: {}x{} {:?}",
                    video.width(),
                    video.height(),
                    video.format()
                );
                DecoderType::Video(video)
            }
            StreamTag::Audio => {
                let audio = decoder_ctx.decoder().audio()?;
                log::info!(
                    "audio decoder: {} Hz, {} channels, {:?}",
                    audio.rate(),
                    audio.channels(),
                    audio.format()
                );
                DecoderType::Audio(audio)
            }
            StreamTag::Subtitle => {
                return Err(anyhow::anyhow!("subtitle decoding is not supported"));
            }
        };

        Ok(Self {
            tag,
            inner,
            time_base: stream.time_base(),
        })
    }

    pub fn tag(&self) -> StreamTag {
        self.tag
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn video(&self) -> Option<&decoder::Video> {
        match &self.inner {
            DecoderType::Video(decoder) => Some(decoder),
            DecoderType::Audio(_) => None,
        }
    }

    pub fn audio(&self) -> Option<&decoder::Audio> {
        match &self.inner {
            DecoderType::Audio(decoder) => Some(decoder),
            DecoderType::Video(_) => None,
        }
    }
}

impl Transform for Decoder {
    type Input = Packet;
    type Output = RawFrame;

    fn feed(&mut self, unit: Unit<Packet>) -> anyhow::Result<Feed<Packet>> {
        match self.inner.send_packet(unit.payload()) {
            Ok(()) => Ok(Feed::Accepted),
            Err(e) if is_again(&e) => Ok(Feed::Full(unit)),
            Err(e) => Err(anyhow::anyhow!("{} decoder send packet: {}", self.tag, e)),
        }
    }

    fn drain(&mut self) -> anyhow::Result<Option<Unit<RawFrame>>> {
        let Some(mut frame) = self.inner.receive_frame()? else {
            return Ok(None);
        };
        let pts = frame.best_effort_pts();
        frame.set_pts(pts);
        Ok(Some(Unit::new(self.tag, frame, self.time_base).with_pts(pts)))
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.inner.send_eof()?;
        Ok(())
    }
}
