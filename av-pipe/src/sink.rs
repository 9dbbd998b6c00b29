use crate::{
    queue::QueueReceiver,
    stage::{Stage, StageStats},
    unit::Unit,
};

/// Container-facing consumer. Receives units in interleaved order and owns any
/// header/trailer framing.
pub trait Sink: Send {
    type Payload: Send;

    fn write(&mut self, unit: Unit<Self::Payload>) -> anyhow::Result<()>;

    /// Called once, after the last unit.
    fn finish(&mut self) -> anyhow::Result<()>;
}

impl<K: Sink + ?Sized> Sink for Box<K> {
    type Payload = K::Payload;

    fn write(&mut self, unit: Unit<Self::Payload>) -> anyhow::Result<()> {
        (**self).write(unit)
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        (**self).finish()
    }
}

/// Terminal stage: writes every unit of its input, then finishes the sink.
pub struct SinkStage<K: Sink> {
    name: String,
    sink: K,
    input: QueueReceiver<Unit<K::Payload>>,
}

impl<K: Sink> SinkStage<K> {
    pub fn new(name: &str, sink: K, input: QueueReceiver<Unit<K::Payload>>) -> Self {
        Self {
            name: name.to_string(),
            sink,
            input,
        }
    }
}

impl<K: Sink> Stage for SinkStage<K> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Box<Self>) -> StageStats {
        let Self {
            name,
            mut sink,
            input,
        } = *self;
        let mut stats = StageStats::new(&name);
        log::info!("{}: started", name);

        for unit in input {
            stats.received += 1;
            match sink.write(unit) {
                Ok(()) => stats.emitted += 1,
                Err(e) => {
                    log::error!("{}: write error: {:#}", name, e);
                    stats.dropped += 1;
                }
            }
        }

        if let Err(e) = sink.finish() {
            log::error!("{}: finish error: {:#}", name, e);
        }
        log::info!("{}", stats);
        stats
    }
}
