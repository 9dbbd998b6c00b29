use std::collections::HashMap;
use std::path::Path;

use ffmpeg_next::{Packet, media};

use crate::{
    ffmpeg::stream::AvStream,
    source::Source,
    unit::{StreamTag, Unit},
};

unsafe impl Send for AvInput {}

/// Container reader. Yields the packets of the best video stream and, when
/// present, the best audio stream, each tagged with its stream kind.
pub struct AvInput {
    inner: ffmpeg_next::format::context::Input,
    streams: HashMap<usize, AvStream>,
    selected: HashMap<usize, StreamTag>,
}

impl AvInput {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let input = ffmpeg_next::format::input(Path::new(url))
            .map_err(|e| anyhow::anyhow!("open input {}: {}", url, e))?;

        let mut streams = HashMap::new();
        for stream in input.streams() {
            streams.insert(stream.index(), AvStream::from(stream));
        }

        let mut selected = HashMap::new();
        let video = input
            .streams()
            .best(media::Type::Video)
            .ok_or(anyhow::anyhow!("no video stream in {}", url))?;
        selected.insert(video.index(), StreamTag::Video);
        if let Some(audio) = input.streams().best(media::Type::Audio) {
            selected.insert(audio.index(), StreamTag::Audio);
        } else {
            log::info!("input {} has no audio stream", url);
        }

        for (index, tag) in selected.iter() {
            if let Some(stream) = streams.get(index) {
                log::info!(
                    "input {}: {} stream #{}, codec {:?}, time_base {}, bit_rate {}",
                    url,
                    tag,
                    index,
                    stream.parameters().id(),
                    stream.time_base(),
                    stream.bit_rate()
                );
            }
        }

        Ok(Self {
            inner: input,
            streams,
            selected,
        })
    }

    /// Stops yielding packets of `tag`, e.g. when its branch failed to open.
    pub fn deselect(&mut self, tag: StreamTag) {
        self.selected.retain(|_, t| *t != tag);
    }

    pub fn streams(&self) -> &HashMap<usize, AvStream> {
        &self.streams
    }

    /// The selected stream for `tag`, if any.
    pub fn stream(&self, tag: StreamTag) -> Option<&AvStream> {
        self.selected
            .iter()
            .find(|(_, t)| **t == tag)
            .and_then(|(index, _)| self.streams.get(index))
    }
}

impl Source for AvInput {
    type Payload = Packet;

    fn read(&mut self) -> anyhow::Result<Option<Unit<Packet>>> {
        loop {
            let mut packet = Packet::empty();
            match packet.read(&mut self.inner) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(e) => return Err(e.into()),
            }

            let index = packet.stream();
            let Some(tag) = self.selected.get(&index).copied() else {
                continue;
            };
            let Some(stream) = self.streams.get(&index) else {
                continue;
            };
            let pts = packet.pts();
            let dts = packet.dts();
            let unit = Unit::new(tag, packet, stream.time_base())
                .with_pts(pts)
                .with_dts(dts);
            return Ok(Some(unit));
        }
    }
}
