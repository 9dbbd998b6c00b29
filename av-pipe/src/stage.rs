use std::fmt::{Display, Formatter};

use crate::{
    queue::{QueueReceiver, QueueSender},
    unit::Unit,
};

/// A pipeline worker. Runs exactly once, on its own thread, until its input
/// reaches end of stream, then closes its outputs and reports what it did.
pub trait Stage: Send {
    fn name(&self) -> &str;

    fn run(self: Box<Self>) -> StageStats;
}

/// Unit counters reported by a finished stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageStats {
    pub name: String,
    /// Units popped from the input queue(s) or read from the source.
    pub received: u64,
    /// Units pushed downstream or written to the sink.
    pub emitted: u64,
    /// Units rejected by a collaborator or not routable.
    pub dropped: u64,
    /// Units whose timestamps had to be synthesised or clamped.
    pub repaired: u64,
}

impl StageStats {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl Display for StageStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: received {}, emitted {}, dropped {}, repaired {}",
            self.name, self.received, self.emitted, self.dropped, self.repaired
        )
    }
}

/// Result of offering a unit to a [`Transform`].
pub enum Feed<P> {
    Accepted,
    /// The collaborator's internal buffer is full. The unit is handed back
    /// and offered again once pending output has been drained. It gets one
    /// retry: if that drain produced nothing and the unit is refused again,
    /// the stage treats it as rejected and drops it.
    Full(Unit<P>),
}

/// A codec-like collaborator: decoder, filter or encoder.
///
/// The calling stage offers one unit with `feed`, then calls `drain` until it
/// returns `Ok(None)` ("no more output right now"). After the input reaches
/// end of stream it calls `flush` once and drains the remainder.
///
/// An `Err` from `feed` means the unit was rejected; the stage logs it and
/// moves on.
///
/// Drained units are stamped with the sequence number of the most recently
/// accepted input, so they can still be traced back to the source.
pub trait Transform: Send {
    type Input: Send;
    type Output: Send;

    fn feed(&mut self, unit: Unit<Self::Input>) -> anyhow::Result<Feed<Self::Input>>;

    fn drain(&mut self) -> anyhow::Result<Option<Unit<Self::Output>>>;

    fn flush(&mut self) -> anyhow::Result<()>;
}

impl<T: Transform + ?Sized> Transform for Box<T> {
    type Input = T::Input;
    type Output = T::Output;

    fn feed(&mut self, unit: Unit<Self::Input>) -> anyhow::Result<Feed<Self::Input>> {
        (**self).feed(unit)
    }

    fn drain(&mut self) -> anyhow::Result<Option<Unit<Self::Output>>> {
        (**self).drain()
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        (**self).flush()
    }
}

pub type BoxTransform<I, O> = Box<dyn Transform<Input = I, Output = O>>;

/// Identity transform with a single-unit buffer.
pub struct Passthrough<P> {
    slot: Option<Unit<P>>,
}

impl<P> Passthrough<P> {
    pub fn new() -> Self {
        Self { slot: None }
    }
}

impl<P> Default for Passthrough<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Send> Transform for Passthrough<P> {
    type Input = P;
    type Output = P;

    fn feed(&mut self, unit: Unit<P>) -> anyhow::Result<Feed<P>> {
        if self.slot.is_some() {
            return Ok(Feed::Full(unit));
        }
        self.slot = Some(unit);
        Ok(Feed::Accepted)
    }

    fn drain(&mut self) -> anyhow::Result<Option<Unit<P>>> {
        Ok(self.slot.take())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// The decode / filter / encode stage: pop, feed, drain, push; flush at EOF.
pub struct TransformStage<T: Transform> {
    name: String,
    transform: T,
    input: QueueReceiver<Unit<T::Input>>,
    output: QueueSender<Unit<T::Output>>,
    last_sequence: u64,
}

impl<T: Transform> TransformStage<T> {
    pub fn new(
        name: &str,
        transform: T,
        input: QueueReceiver<Unit<T::Input>>,
        output: QueueSender<Unit<T::Output>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            transform,
            input,
            output,
            last_sequence: 0,
        }
    }

    fn feed_unit(&mut self, unit: Unit<T::Input>, stats: &mut StageStats) {
        let sequence = unit.sequence();
        let mut pending = unit;
        let mut retried = false;
        loop {
            match self.transform.feed(pending) {
                Ok(Feed::Accepted) => {
                    self.last_sequence = sequence;
                    self.drain(stats);
                    return;
                }
                Ok(Feed::Full(unit)) => {
                    let freed = self.drain(stats);
                    if freed == 0 && retried {
                        log::warn!(
                            "{}: collaborator stays full without producing output, treating {} as rejected",
                            self.name,
                            unit
                        );
                        stats.dropped += 1;
                        return;
                    }
                    retried = true;
                    pending = unit;
                }
                Err(e) => {
                    log::warn!("{}: unit rejected: {:#}", self.name, e);
                    stats.dropped += 1;
                    return;
                }
            }
        }
    }

    fn drain(&mut self, stats: &mut StageStats) -> u64 {
        let mut count = 0;
        loop {
            match self.transform.drain() {
                Ok(Some(mut unit)) => {
                    unit.set_sequence(self.last_sequence);
                    log::trace!("{}: emit {}", self.name, unit);
                    self.output.push(unit);
                    count += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    log::error!("{}: drain error: {:#}", self.name, e);
                    break;
                }
            }
        }
        stats.emitted += count;
        count
    }
}

impl<T: Transform> Stage for TransformStage<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(mut self: Box<Self>) -> StageStats {
        let mut stats = StageStats::new(&self.name);
        log::info!("{}: started", self.name);

        while let Some(unit) = self.input.pop() {
            stats.received += 1;
            self.feed_unit(unit, &mut stats);
        }

        if let Err(e) = self.transform.flush() {
            log::error!("{}: flush error: {:#}", self.name, e);
        }
        self.drain(&mut stats);

        let Self { output, .. } = *self;
        output.close();
        log::info!("{}", stats);
        stats
    }
}

#[cfg(test)]
#[path = "stage_test.rs"]
mod stage_test;
