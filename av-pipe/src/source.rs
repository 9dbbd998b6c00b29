use crate::{
    queue::QueueSender,
    stage::{Stage, StageStats},
    unit::Unit,
};

/// Container-facing producer: yields tagged units until exhausted.
pub trait Source: Send {
    type Payload: Send;

    /// `Ok(None)` once the input is exhausted.
    fn read(&mut self) -> anyhow::Result<Option<Unit<Self::Payload>>>;
}

impl<S: Source + ?Sized> Source for Box<S> {
    type Payload = S::Payload;

    fn read(&mut self) -> anyhow::Result<Option<Unit<Self::Payload>>> {
        (**self).read()
    }
}

/// Source over any iterator of units, mostly for tests and synthetic inputs.
pub struct IterSource<I> {
    iter: I,
}

impl<I> IterSource<I> {
    pub fn new<T: IntoIterator<IntoIter = I>>(units: T) -> Self {
        Self {
            iter: units.into_iter(),
        }
    }
}

impl<P, I> Source for IterSource<I>
where
    P: Send,
    I: Iterator<Item = Unit<P>> + Send,
{
    type Payload = P;

    fn read(&mut self) -> anyhow::Result<Option<Unit<P>>> {
        Ok(self.iter.next())
    }
}

/// Reads the source to exhaustion, numbering units in read order.
pub struct SourceStage<S: Source> {
    name: String,
    source: S,
    output: QueueSender<Unit<S::Payload>>,
}

impl<S: Source> SourceStage<S> {
    pub fn new(name: &str, source: S, output: QueueSender<Unit<S::Payload>>) -> Self {
        Self {
            name: name.to_string(),
            source,
            output,
        }
    }
}

impl<S: Source> Stage for SourceStage<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Box<Self>) -> StageStats {
        let Self {
            name,
            mut source,
            output,
        } = *self;
        let mut stats = StageStats::new(&name);
        log::info!("{}: started", name);

        let mut sequence = 0u64;
        loop {
            match source.read() {
                Ok(Some(mut unit)) => {
                    unit.set_sequence(sequence);
                    sequence += 1;
                    stats.received += 1;
                    log::trace!("{}: read {}", name, unit);
                    output.push(unit);
                    stats.emitted += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("{}: read error, ending input: {:#}", name, e);
                    break;
                }
            }
        }

        output.close();
        log::info!("{}", stats);
        stats
    }
}
