use std::ffi::CStr;
use std::os::raw::c_char;

use ffmpeg_next::{Rescale, codec::decoder, filter, frame};

use crate::{
    config::Speed,
    ffmpeg::{encoder::Encoder, frame::RawFrame, is_again},
    filter_spec::{self, AudioFormat},
    stage::{Feed, Transform},
    unit::{Rational, StreamTag, Unit},
};

unsafe impl Send for Filter {}

/// Frame filter graph between a decoder and an encoder: retimes by the
/// playback speed and converts to the encoder's input format.
pub struct Filter {
    tag: StreamTag,
    graph: filter::Graph,
    input_time_base: Rational,
    output_time_base: Rational,
    last_pts: Option<i64>,
}

impl Filter {
    pub fn video(
        decoder: &decoder::Video,
        time_base: Rational,
        encoder: &Encoder,
        speed: Speed,
    ) -> anyhow::Result<Self> {
        let pixel_format = encoder
            .pixel_format()
            .and_then(|format| format.descriptor())
            .map(|descriptor| descriptor.name())
            .ok_or(anyhow::anyhow!("video encoder has no pixel format"))?;
        let aspect = decoder.aspect_ratio();
        let aspect = if aspect.numerator() > 0 && aspect.denominator() > 0 {
            aspect
        } else {
            ffmpeg_next::Rational::new(1, 1)
        };
        let args = format!(
            "video_size={}x{}:pix_fmt={}:time_base={}:pixel_aspect={}/{}",
            decoder.width(),
            decoder.height(),
            ffmpeg_next::ffi::AVPixelFormat::from(decoder.format()) as i32,
            time_base,
            aspect.numerator(),
            aspect.denominator()
        );
        let spec = filter_spec::video_chain(speed, pixel_format);
        Self::build(StreamTag::Video, "buffer", "buffersink", &args, &spec, time_base)
    }

    pub fn audio(
        decoder: &decoder::Audio,
        time_base: Rational,
        encoder: &Encoder,
        speed: Speed,
    ) -> anyhow::Result<Self> {
        let layout = describe_channel_layout(decoder)?;
        let args = format!(
            "time_base={}:sample_rate={}:sample_fmt={}:channel_layout={}",
            time_base,
            decoder.rate(),
            decoder.format().name(),
            layout
        );
        let format = AudioFormat {
            sample_format: encoder
                .sample_format()
                .map(|format| format.name().to_string())
                .ok_or(anyhow::anyhow!("audio encoder has no sample format"))?,
            sample_rate: encoder.sample_rate().unwrap_or(decoder.rate()),
            channel_layout: layout,
            frame_size: encoder.frame_size(),
        };
        let spec = filter_spec::audio_chain(speed, &format);
        Self::build(StreamTag::Audio, "abuffer", "abuffersink", &args, &spec, time_base)
    }

    fn build(
        tag: StreamTag,
        source: &str,
        sink: &str,
        args: &str,
        spec: &str,
        time_base: Rational,
    ) -> anyhow::Result<Self> {
        let mut graph = filter::Graph::new();
        let source_filter =
            filter::find(source).ok_or(anyhow::anyhow!("filter not found: {}", source))?;
        let sink_filter = filter::find(sink).ok_or(anyhow::anyhow!("filter not found: {}", sink))?;
        graph.add(&source_filter, "in", args)?;
        graph.add(&sink_filter, "out", "")?;
        graph
            .output("in", 0)?
            .input("out", 0)?
            .parse(spec)
            .map_err(|e| anyhow::anyhow!("{} filter {:?}: {}", tag, spec, e))?;
        graph.validate()?;

        let mut out = graph
            .get("out")
            .ok_or(anyhow::anyhow!("{} filter has no sink", tag))?;
        let output_time_base: Rational = ffmpeg_next::Rational::from(unsafe {
            ffmpeg_next::ffi::av_buffersink_get_time_base(out.as_mut_ptr())
        })
        .into();
        log::info!(
            "{} filter: {} ({}), time_base {} -> {}",
            tag,
            spec,
            args,
            time_base,
            output_time_base
        );

        Ok(Self {
            tag,
            graph,
            input_time_base: time_base,
            output_time_base,
            last_pts: None,
        })
    }

    /// Audio frames without a pts continue from the previous frame.
    fn repair_audio_pts(&mut self, unit: &mut Unit<RawFrame>) {
        if self.tag != StreamTag::Audio {
            return;
        }
        let pts = match unit.payload().pts() {
            Some(pts) => pts,
            None => {
                let samples = unit.payload().samples() as i64;
                let pts = match (self.last_pts, unit.payload()) {
                    (Some(last), RawFrame::Audio(frame)) => {
                        let rate = frame.rate().max(1) as i32;
                        let sample_tb = ffmpeg_next::Rational::new(1, rate);
                        last + samples.rescale(sample_tb, self.input_time_base)
                    }
                    _ => 0,
                };
                log::warn!("audio filter: frame without pts, using {}", pts);
                unit.payload_mut().set_pts(Some(pts));
                unit.set_pts(Some(pts));
                pts
            }
        };
        self.last_pts = Some(pts);
    }

    fn receive(&mut self) -> anyhow::Result<Option<RawFrame>> {
        let mut out = self
            .graph
            .get("out")
            .ok_or(anyhow::anyhow!("{} filter has no sink", self.tag))?;
        let mut sink = out.sink();
        let result = match self.tag {
            StreamTag::Audio => {
                let mut frame = frame::Audio::empty();
                sink.frame(&mut frame).map(|_| RawFrame::Audio(frame))
            }
            _ => {
                let mut frame = frame::Video::empty();
                sink.frame(&mut frame).map(|_| RawFrame::Video(frame))
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

impl Transform for Filter {
    type Input = RawFrame;
    type Output = RawFrame;

    fn feed(&mut self, mut unit: Unit<RawFrame>) -> anyhow::Result<Feed<RawFrame>> {
        self.repair_audio_pts(&mut unit);
        let mut input = self
            .graph
            .get("in")
            .ok_or(anyhow::anyhow!("{} filter has no source", self.tag))?;
        let result = match unit.payload() {
            RawFrame::Video(frame) => input.source().add(frame),
            RawFrame::Audio(frame) => input.source().add(frame),
        };
        match result {
            Ok(()) => Ok(Feed::Accepted),
            Err(e) if is_again(&e) => Ok(Feed::Full(unit)),
            Err(e) => Err(anyhow::anyhow!("{} filter add frame: {}", self.tag, e)),
        }
    }

    fn drain(&mut self) -> anyhow::Result<Option<Unit<RawFrame>>> {
        let Some(frame) = self.receive()? else {
            return Ok(None);
        };
        let pts = frame.pts();
        Ok(Some(Unit::new(self.tag, frame, self.output_time_base).with_pts(pts)))
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        let mut input = self
            .graph
            .get("in")
            .ok_or(anyhow::anyhow!("{} filter has no source", self.tag))?;
        input.source().flush()?;
        Ok(())
    }
}

/// Channel layout of the decoder in FFmpeg's textual form, e.g. "stereo".
fn describe_channel_layout(decoder: &decoder::Audio) -> anyhow::Result<String> {
    let mut buf = [0 as c_char; 128];
    let ret = unsafe {
        let ctx = decoder.as_ptr();
        if (*ctx).ch_layout.nb_channels == 0 {
            return Err(anyhow::anyhow!("audio decoder has no channel layout"));
        }
        ffmpeg_next::ffi::av_channel_layout_describe(
            &(*ctx).ch_layout,
            buf.as_mut_ptr(),
            buf.len(),
        )
    };
    if ret < 0 {
        return Err(anyhow::anyhow!(
            "describe channel layout: {}",
            ffmpeg_next::Error::from(ret)
        ));
    }
    let layout = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Ok(layout.to_string_lossy().into_owned())
}
