use std::collections::HashMap;

use ffmpeg_next::Packet;

use crate::{
    ffmpeg::encoder::Encoder,
    sink::Sink,
    unit::{StreamTag, Unit},
};

unsafe impl Send for AvOutput {}

/// Container writer. One output stream per encoder; packets are routed by
/// their stream tag.
pub struct AvOutput {
    inner: ffmpeg_next::format::context::Output,
    url: String,
    streams: HashMap<StreamTag, usize>,
    have_written_header: bool,
    have_written_trailer: bool,
}

impl AvOutput {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let output = ffmpeg_next::format::output(&url)
            .map_err(|e| anyhow::anyhow!("create output {}: {}", url, e))?;
        Ok(Self {
            inner: output,
            url: url.to_string(),
            streams: HashMap::new(),
            have_written_header: false,
            have_written_trailer: false,
        })
    }

    pub fn add_stream(&mut self, encoder: &Encoder) -> anyhow::Result<()> {
        if self.have_written_header {
            return Err(anyhow::anyhow!("output {}: header already written", self.url));
        }
        let parameters = encoder.parameters();
        let mut stream = self
            .inner
            .add_stream(ffmpeg_next::encoder::find(parameters.id()))?;
        stream.set_parameters(parameters);
        stream.set_time_base(encoder.time_base());
        let index = stream.index();
        self.streams.insert(encoder.tag(), index);
        log::info!(
            "output {}: {} stream #{} from encoder {}",
            self.url,
            encoder.tag(),
            index,
            encoder.name()
        );
        Ok(())
    }

    fn write_header(&mut self) -> anyhow::Result<()> {
        if !self.have_written_header {
            self.inner
                .write_header()
                .map_err(|e| anyhow::anyhow!("output {}: write header: {}", self.url, e))?;
            self.have_written_header = true;
        }
        Ok(())
    }
}

impl Sink for AvOutput {
    type Payload = Packet;

    fn write(&mut self, unit: Unit<Packet>) -> anyhow::Result<()> {
        self.write_header()?;

        let index = *self
            .streams
            .get(&unit.stream())
            .ok_or(anyhow::anyhow!("output {}: no {} stream", self.url, unit.stream()))?;
        let out_time_base = self
            .inner
            .stream(index)
            .ok_or(anyhow::anyhow!("output {}: stream #{} missing", self.url, index))?
            .time_base();

        let time_base = unit.time_base();
        let (pts, dts) = (unit.pts(), unit.dts());
        let mut packet = unit.into_payload();
        // timestamps may have been repaired upstream
        packet.set_pts(pts);
        packet.set_dts(dts);
        packet.set_stream(index);
        packet.set_position(-1);
        packet.rescale_ts(time_base, out_time_base);
        packet.write_interleaved(&mut self.inner)?;
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        if self.have_written_trailer {
            return Ok(());
        }
        self.write_header()?;
        self.have_written_trailer = true;
        self.inner
            .write_trailer()
            .map_err(|e| anyhow::anyhow!("output {}: write trailer: {}", self.url, e))?;
        log::info!("output {}: trailer written", self.url);
        Ok(())
    }
}
