//! Timestamp-ordered interleaving of several time-ordered streams.
//!
//! Each input is assumed to be non-decreasing in presentation time on its
//! own. The stage keeps one buffered head per input, repairs its timestamps,
//! and always emits the head with the earliest presentation time, so the
//! output is non-decreasing across all inputs: a streaming K-way merge.
//!
//! Repairs applied to each head before it competes:
//! - a missing presentation timestamp, or one on an unusable time base,
//!   becomes the last one emitted on that input plus one tick (on the last
//!   usable time base), and the decode timestamp is set to match;
//! - a decode timestamp later than the presentation timestamp is clamped
//!   down to it.
//!
//! Ties on the exact instant go to the input registered first. With
//! video registered before audio, `video@10` is emitted before `audio@10`.

use crate::{
    queue::{QueueReceiver, QueueSender},
    stage::{Stage, StageStats},
    unit::{Rational, StreamTag, Timestamp, Unit},
};

struct MergeInput<P> {
    tag: StreamTag,
    receiver: QueueReceiver<Unit<P>>,
    head: Option<Unit<P>>,
    eof: bool,
    last_pts: i64,
    last_time_base: Option<Rational>,
}

impl<P> MergeInput<P> {
    fn new(tag: StreamTag, receiver: QueueReceiver<Unit<P>>) -> Self {
        Self {
            tag,
            receiver,
            head: None,
            eof: false,
            last_pts: 0,
            last_time_base: None,
        }
    }

    /// Blocks until this input has a head or is known to be exhausted.
    fn refill(&mut self, stage: &str, stats: &mut StageStats) {
        if self.head.is_some() || self.eof {
            return;
        }
        match self.receiver.pop() {
            Some(mut unit) => {
                stats.received += 1;
                if repair(stage, self.tag, self.last_pts, self.last_time_base, &mut unit) {
                    stats.repaired += 1;
                }
                self.head = Some(unit);
            }
            None => {
                log::info!("{}: {} input reached end of stream", stage, self.tag);
                self.eof = true;
            }
        }
    }

    /// Merge key of the buffered head; `None` sorts after everything.
    fn key(&self) -> Option<Timestamp> {
        self.head.as_ref().and_then(|unit| unit.timestamp())
    }

    fn take(&mut self) -> Option<Unit<P>> {
        let unit = self.head.take()?;
        if let Some(pts) = unit.pts() {
            self.last_pts = pts;
            self.last_time_base = Some(unit.time_base());
        }
        Some(unit)
    }
}

/// Fixes up a unit's timestamps in place. Returns whether anything changed.
fn repair<P>(
    stage: &str,
    tag: StreamTag,
    last_pts: i64,
    last_time_base: Option<Rational>,
    unit: &mut Unit<P>,
) -> bool {
    let mut repaired = false;

    let pts = match unit.pts() {
        Some(pts) if unit.time_base().is_valid() => pts,
        _ => {
            let pts = last_pts + 1;
            if !unit.time_base().is_valid() {
                let time_base = last_time_base.unwrap_or_default();
                log::warn!(
                    "{}: {} unit #{} has invalid time base {}, using {}",
                    stage,
                    tag,
                    unit.sequence(),
                    unit.time_base(),
                    time_base
                );
                unit.set_time_base(time_base);
            }
            log::warn!(
                "{}: {} unit #{} has no valid pts, using {}",
                stage,
                tag,
                unit.sequence(),
                pts
            );
            unit.set_pts(Some(pts));
            unit.set_dts(Some(pts));
            repaired = true;
            pts
        }
    };

    if let Some(dts) = unit.dts() {
        if dts > pts {
            log::warn!(
                "{}: {} unit #{} has dts {} after pts {}, clamping",
                stage,
                tag,
                unit.sequence(),
                dts,
                pts
            );
            unit.set_dts(Some(pts));
            repaired = true;
        }
    }

    repaired
}

/// Multiplexing stage: merges its inputs into one time-ordered output.
pub struct InterleaveStage<P> {
    name: String,
    inputs: Vec<MergeInput<P>>,
    output: QueueSender<Unit<P>>,
}

impl<P: Send> InterleaveStage<P> {
    pub fn new(name: &str, output: QueueSender<Unit<P>>) -> Self {
        Self {
            name: name.to_string(),
            inputs: Vec::new(),
            output,
        }
    }

    /// Adds an input. Registration order is the tie-break priority.
    pub fn input(mut self, tag: StreamTag, receiver: QueueReceiver<Unit<P>>) -> Self {
        self.inputs.push(MergeInput::new(tag, receiver));
        self
    }

    /// Tags in tie-break priority order.
    pub fn priority(&self) -> Vec<StreamTag> {
        self.inputs.iter().map(|input| input.tag).collect()
    }

    fn select(&self) -> Option<usize> {
        let mut best: Option<(usize, Timestamp)> = None;
        for (index, input) in self.inputs.iter().enumerate() {
            let Some(key) = input.key() else {
                continue;
            };
            // strictly earlier only: equal keys keep the earlier input
            if best.is_none_or(|(_, best_key)| key < best_key) {
                best = Some((index, key));
            }
        }
        best.map(|(index, _)| index)
    }
}

impl<P: Send> Stage for InterleaveStage<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(mut self: Box<Self>) -> StageStats {
        let mut stats = StageStats::new(&self.name);
        log::info!("{}: started, priority {:?}", self.name, self.priority());

        let this = &mut *self;
        loop {
            for input in this.inputs.iter_mut() {
                input.refill(&this.name, &mut stats);
            }

            let Some(index) = this.select() else {
                break;
            };
            if let Some(unit) = this.inputs[index].take() {
                log::trace!("{}: emit {}", this.name, unit);
                this.output.push(unit);
                stats.emitted += 1;
            }
        }

        let Self { output, .. } = *self;
        output.close();
        log::info!("{}", stats);
        stats
    }
}

#[cfg(test)]
#[path = "interleave_test.rs"]
mod interleave_test;
