//! FFmpeg-backed collaborators: container reader and writer, decoders,
//! retiming filters and encoders.

pub mod decoder;
pub mod encoder;
pub mod filter;
pub mod frame;
pub mod input;
pub mod output;
pub mod stream;

use ffmpeg_next::Packet;

use crate::{
    config::TranscodeConfig,
    graph::TranscodeGraph,
    pipeline::Pipeline,
    unit::StreamTag,
};

use self::{
    decoder::Decoder, encoder::Encoder, filter::Filter, frame::RawFrame, input::AvInput,
    output::AvOutput, stream::AvStream,
};

/// Registers FFmpeg components. Call once at startup.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

/// "Try again after draining" from any send or receive call.
pub(crate) fn is_again(e: &ffmpeg_next::Error) -> bool {
    matches!(e, ffmpeg_next::Error::Other { errno } if *errno == ffmpeg_next::util::error::EAGAIN)
}

fn open_video(
    stream: &AvStream,
    config: &TranscodeConfig,
) -> anyhow::Result<(Decoder, Filter, Encoder)> {
    let decoder = Decoder::new(stream)?;
    let video = decoder
        .video()
        .ok_or(anyhow::anyhow!("stream #{} is not video", stream.index()))?;
    let encoder = Encoder::video(stream, video, config)?;
    let filter = Filter::video(video, decoder.time_base(), &encoder, config.speed)?;
    Ok((decoder, filter, encoder))
}

fn open_audio(
    stream: &AvStream,
    config: &TranscodeConfig,
) -> anyhow::Result<(Decoder, Filter, Encoder)> {
    let decoder = Decoder::new(stream)?;
    let audio = decoder
        .audio()
        .ok_or(anyhow::anyhow!("stream #{} is not audio", stream.index()))?;
    let encoder = Encoder::audio(stream, audio, config)?;
    let filter = Filter::audio(audio, decoder.time_base(), &encoder, config.speed)?;
    Ok((decoder, filter, encoder))
}

/// Opens the input and output named by `config` and wires a speed-change
/// transcode: video always, audio when the input has a usable audio stream.
pub fn build_transcode(config: &TranscodeConfig) -> anyhow::Result<Pipeline> {
    let mut input = AvInput::new(&config.input)?;
    let mut output = AvOutput::new(&config.output)?;
    let mut graph = TranscodeGraph::<Packet, RawFrame>::new("transcode");

    let video_stream = input
        .stream(StreamTag::Video)
        .cloned()
        .ok_or(anyhow::anyhow!("no video stream in {}", config.input))?;
    let (decoder, filter, encoder) = open_video(&video_stream, config)?;
    output.add_stream(&encoder)?;
    graph = graph.branch(
        StreamTag::Video,
        Box::new(decoder),
        Box::new(filter),
        Box::new(encoder),
    );

    match input.stream(StreamTag::Audio).cloned() {
        Some(audio_stream) => match open_audio(&audio_stream, config) {
            Ok((decoder, filter, encoder)) => {
                output.add_stream(&encoder)?;
                graph = graph.branch(
                    StreamTag::Audio,
                    Box::new(decoder),
                    Box::new(filter),
                    Box::new(encoder),
                );
            }
            Err(e) => {
                log::warn!("audio disabled, transcoding video only: {:#}", e);
                input.deselect(StreamTag::Audio);
            }
        },
        None => log::info!("no audio stream, transcoding video only"),
    }

    log::info!(
        "transcode {} -> {} at {}x, streams {:?}",
        config.input,
        config.output,
        config.speed,
        graph.tags()
    );
    graph.build(input, output)
}
