use ffmpeg_next::{
    Codec, Packet, Rescale,
    codec::{self, encoder},
    format::{Pixel, Sample, sample},
};

use crate::{
    config::TranscodeConfig,
    ffmpeg::{frame::RawFrame, is_again, stream::AvStream},
    stage::{Feed, Transform},
    unit::{Rational, StreamTag, Unit},
};

pub enum EncoderType {
    Video(encoder::Video),
    Audio(encoder::Audio),
}

impl EncoderType {
    fn send_frame(&mut self, frame: &RawFrame) -> Result<(), ffmpeg_next::Error> {
        match (self, frame) {
            (EncoderType::Video(encoder), RawFrame::Video(frame)) => encoder.send_frame(frame),
            (EncoderType::Audio(encoder), RawFrame::Audio(frame)) => encoder.send_frame(frame),
            _ => Err(ffmpeg_next::Error::InvalidData),
        }
    }

    fn send_eof(&mut self) -> Result<(), ffmpeg_next::Error> {
        match self {
            EncoderType::Video(encoder) => encoder.send_eof(),
            EncoderType::Audio(encoder) => encoder.send_eof(),
        }
    }

    fn receive_packet(&mut self) -> anyhow::Result<Option<Packet>> {
        let mut packet = Packet::empty();
        let result = match self {
            EncoderType::Video(encoder) => encoder.receive_packet(&mut packet),
            EncoderType::Audio(encoder) => encoder.receive_packet(&mut packet),
        };
        match result {
            Ok(()) => Ok(Some(packet)),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(e) if is_again(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// First encoder of `names` that this FFmpeg build provides, else the
/// default encoder for `fallback`.
fn find_encoder(names: &[String], fallback: codec::Id) -> Option<(Codec, String)> {
    for name in names {
        if let Some(codec) = encoder::find_by_name(name) {
            return Some((codec, name.clone()));
        }
        log::info!("encoder {} not available", name);
    }
    encoder::find(fallback).map(|codec| {
        let name = codec.name().to_string();
        log::warn!("no preferred encoder available, using default {}", name);
        (codec, name)
    })
}

/// Frame to packet encoder. Packets carry the encoder's time base.
pub struct Encoder {
    tag: StreamTag,
    name: String,
    inner: EncoderType,
    time_base: Rational,
    frame_size: usize,
}

impl Encoder {
    /// Opens a video encoder matching the decoded stream's geometry and rate.
    pub fn video(
        stream: &AvStream,
        decoder: &ffmpeg_next::codec::decoder::Video,
        config: &TranscodeConfig,
    ) -> anyhow::Result<Self> {
        let (codec, name) = find_encoder(&config.video_encoders, codec::Id::MPEG4)
            .ok_or(anyhow::anyhow!("no usable video encoder"))?;

        let mut time_base = stream.time_base();
        if name == "mpeg4" && time_base.denominator() > 65535 {
            // mpeg4 cannot represent time bases this fine
            time_base = Rational::new(1, 25000);
        }
        let bit_rate = if stream.bit_rate() > 0 {
            stream.bit_rate()
        } else {
            config.video_bit_rate_fallback
        };

        let mut encoder = codec::Context::new_with_codec(codec).encoder().video()?;
        encoder.set_width(decoder.width());
        encoder.set_height(decoder.height());
        encoder.set_format(Pixel::YUV420P);
        encoder.set_bit_rate(bit_rate);
        encoder.set_time_base(ffmpeg_next::Rational::from(time_base));
        if stream.rate().is_valid() {
            encoder.set_frame_rate(Some(ffmpeg_next::Rational::from(stream.rate())));
        }
        encoder.set_gop(config.gop_size);
        encoder.set_max_b_frames(config.max_b_frames);
        encoder.set_flags(codec::Flags::GLOBAL_HEADER);

        let encoder = encoder
            .open_as(codec)
            .map_err(|e| anyhow::anyhow!("open video encoder {}: {}", name, e))?;
        log::info!(
            "video encoder {}: {}x{}, bit_rate {}, time_base {}, gop {}",
            name,
            decoder.width(),
            decoder.height(),
            bit_rate,
            time_base,
            config.gop_size
        );

        Ok(Self {
            tag: StreamTag::Video,
            name,
            inner: EncoderType::Video(encoder),
            time_base,
            frame_size: 0,
        })
    }

    /// Opens an audio encoder at the decoded stream's rate and layout.
    pub fn audio(
        stream: &AvStream,
        decoder: &ffmpeg_next::codec::decoder::Audio,
        config: &TranscodeConfig,
    ) -> anyhow::Result<Self> {
        let (codec, name) = find_encoder(&config.audio_encoders, codec::Id::MP3)
            .ok_or(anyhow::anyhow!("no usable audio encoder"))?;

        let format = codec
            .audio()
            .ok()
            .and_then(|audio| audio.formats().map(|formats| formats.collect::<Vec<_>>()))
            .and_then(|formats| {
                let float = formats.iter().copied().find(|f| {
                    matches!(
                        f,
                        Sample::F32(sample::Type::Packed) | Sample::F32(sample::Type::Planar)
                    )
                });
                float.or_else(|| formats.first().copied())
            })
            .unwrap_or(Sample::F32(sample::Type::Planar));
        let bit_rate = if stream.bit_rate() > 0 {
            stream.bit_rate()
        } else {
            config.audio_bit_rate_fallback
        };
        let rate = decoder.rate();
        let time_base = Rational::new(1, rate as i32);

        let mut encoder = codec::Context::new_with_codec(codec).encoder().audio()?;
        encoder.set_rate(rate as i32);
        encoder.set_format(format);
        encoder.set_bit_rate(bit_rate);
        encoder.set_time_base(ffmpeg_next::Rational::from(time_base));
        encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        unsafe {
            let ret = ffmpeg_next::ffi::av_channel_layout_copy(
                &mut (*encoder.as_mut_ptr()).ch_layout,
                &(*decoder.as_ptr()).ch_layout,
            );
            if ret < 0 {
                return Err(anyhow::anyhow!(
                    "copy channel layout: {}",
                    ffmpeg_next::Error::from(ret)
                ));
            }
        }

        let encoder = encoder
            .open_as(codec)
            .map_err(|e| anyhow::anyhow!("open audio encoder {}: {}", name, e))?;
        let frame_size = match encoder.frame_size() as usize {
            0 => config.audio_frame_size,
            n => n,
        };
        log::info!(
            "audio encoder {}: {} Hz, {:?}, bit_rate {}, frame_size {}",
            name,
            rate,
            format,
            bit_rate,
            frame_size
        );

        Ok(Self {
            tag: StreamTag::Audio,
            name,
            inner: EncoderType::Audio(encoder),
            time_base,
            frame_size,
        })
    }

    pub fn tag(&self) -> StreamTag {
        self.tag
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Samples per frame the audio encoder expects; 0 for video.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn pixel_format(&self) -> Option<Pixel> {
        match &self.inner {
            EncoderType::Video(encoder) => Some(encoder.format()),
            EncoderType::Audio(_) => None,
        }
    }

    pub fn sample_format(&self) -> Option<Sample> {
        match &self.inner {
            EncoderType::Audio(encoder) => Some(encoder.format()),
            EncoderType::Video(_) => None,
        }
    }

    pub fn sample_rate(&self) -> Option<u32> {
        match &self.inner {
            EncoderType::Audio(encoder) => Some(encoder.rate()),
            EncoderType::Video(_) => None,
        }
    }

    /// Codec parameters of the opened encoder, for the muxer's stream.
    pub fn parameters(&self) -> codec::Parameters {
        match &self.inner {
            EncoderType::Video(encoder) => codec::Parameters::from(encoder),
            EncoderType::Audio(encoder) => codec::Parameters::from(encoder),
        }
    }
}

impl Transform for Encoder {
    type Input = RawFrame;
    type Output = Packet;

    fn feed(&mut self, mut unit: Unit<RawFrame>) -> anyhow::Result<Feed<RawFrame>> {
        let src: ffmpeg_next::Rational = unit.time_base().into();
        let dst: ffmpeg_next::Rational = self.time_base.into();
        let pts = unit.payload().pts().map(|pts| pts.rescale(src, dst));
        unit.payload_mut().set_pts(pts);

        match self.inner.send_frame(unit.payload()) {
            Ok(()) => Ok(Feed::Accepted),
            Err(e) if is_again(&e) => {
                // restore the unit's own time base before handing it back
                let back = unit.payload().pts().map(|pts| pts.rescale(dst, src));
                unit.payload_mut().set_pts(back);
                Ok(Feed::Full(unit))
            }
            Err(e) => Err(anyhow::anyhow!(
                "{} encoder {} send frame: {}",
                self.tag,
                self.name,
                e
            )),
        }
    }

    fn drain(&mut self) -> anyhow::Result<Option<Unit<Packet>>> {
        loop {
            let Some(packet) = self.inner.receive_packet()? else {
                return Ok(None);
            };
            let Some(pts) = packet.pts() else {
                log::warn!(
                    "{} encoder {} produced a packet without pts, dropping",
                    self.tag,
                    self.name
                );
                continue;
            };
            let dts = packet.dts();
            let unit = Unit::new(self.tag, packet, self.time_base)
                .with_pts(Some(pts))
                .with_dts(dts);
            return Ok(Some(unit));
        }
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.inner.send_eof()?;
        Ok(())
    }
}
