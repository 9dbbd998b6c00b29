use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use super::{Feed, Passthrough, Stage, StageStats, Transform, TransformStage};
use crate::queue::channel;
use crate::sink::{Sink, SinkStage};
use crate::source::{IterSource, Source, SourceStage};
use crate::unit::{Rational, StreamTag, Unit};

const MS: Rational = Rational::new(1, 1000);

fn unit(pts: i64) -> Unit<Bytes> {
    Unit::new(StreamTag::Video, Bytes::from(pts.to_string()), MS).with_timestamps(pts, pts)
}

fn run_transform<T: Transform>(
    transform: T,
    units: Vec<Unit<T::Input>>,
) -> (StageStats, Vec<Unit<T::Output>>) {
    let (in_tx, in_rx) = channel();
    let (out_tx, out_rx) = channel();
    for unit in units {
        in_tx.push(unit);
    }
    in_tx.close();
    let stats = Box::new(TransformStage::new("transform", transform, in_rx, out_tx)).run();
    (stats, out_rx.collect())
}

/// Doubles each payload and rejects odd timestamps.
struct Doubler {
    pending: VecDeque<Unit<Bytes>>,
}

impl Transform for Doubler {
    type Input = Bytes;
    type Output = Bytes;

    fn feed(&mut self, unit: Unit<Bytes>) -> anyhow::Result<Feed<Bytes>> {
        if unit.pts().unwrap_or(0) % 2 != 0 {
            anyhow::bail!("odd pts {:?}", unit.pts());
        }
        self.pending.push_back(unit.map(|b| {
            let mut doubled = b.to_vec();
            doubled.extend_from_slice(&b);
            Bytes::from(doubled)
        }));
        Ok(Feed::Accepted)
    }

    fn drain(&mut self) -> anyhow::Result<Option<Unit<Bytes>>> {
        Ok(self.pending.pop_front())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Buffers everything until flushed, like an encoder with lookahead.
struct Delayed {
    held: Vec<Unit<Bytes>>,
    flushed: bool,
}

impl Transform for Delayed {
    type Input = Bytes;
    type Output = Bytes;

    fn feed(&mut self, unit: Unit<Bytes>) -> anyhow::Result<Feed<Bytes>> {
        self.held.push(unit);
        Ok(Feed::Accepted)
    }

    fn drain(&mut self) -> anyhow::Result<Option<Unit<Bytes>>> {
        if !self.flushed || self.held.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.held.remove(0)))
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.flushed = true;
        Ok(())
    }
}

/// Holds at most two units and only produces output once it has reported
/// being full, or after a flush, like a codec answering EAGAIN.
struct Narrow {
    held: VecDeque<Unit<Bytes>>,
    blocked: bool,
    flushed: bool,
    full_count: Arc<AtomicUsize>,
}

impl Transform for Narrow {
    type Input = Bytes;
    type Output = Bytes;

    fn feed(&mut self, unit: Unit<Bytes>) -> anyhow::Result<Feed<Bytes>> {
        if self.held.len() >= 2 {
            self.full_count.fetch_add(1, Ordering::SeqCst);
            self.blocked = true;
            return Ok(Feed::Full(unit));
        }
        self.held.push_back(unit);
        Ok(Feed::Accepted)
    }

    fn drain(&mut self) -> anyhow::Result<Option<Unit<Bytes>>> {
        if self.flushed {
            return Ok(self.held.pop_front());
        }
        if !self.blocked {
            return Ok(None);
        }
        self.blocked = false;
        Ok(self.held.pop_front())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.flushed = true;
        Ok(())
    }
}

/// Never accepts anything and never produces anything.
/// Always full, counting how often it is offered a unit.
#[derive(Default)]
struct Stuck {
    offers: Arc<AtomicUsize>,
}

impl Transform for Stuck {
    type Input = Bytes;
    type Output = Bytes;

    fn feed(&mut self, unit: Unit<Bytes>) -> anyhow::Result<Feed<Bytes>> {
        self.offers.fetch_add(1, Ordering::SeqCst);
        Ok(Feed::Full(unit))
    }

    fn drain(&mut self) -> anyhow::Result<Option<Unit<Bytes>>> {
        Ok(None)
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[test]
fn test_one_to_one_transform_preserves_count_and_order() {
    let units: Vec<_> = (0..50).map(|i| unit(i * 2)).collect();
    let (stats, out) = run_transform(
        Doubler {
            pending: VecDeque::new(),
        },
        units,
    );

    assert_eq!(stats.received, 50);
    assert_eq!(stats.emitted, 50);
    assert_eq!(stats.dropped, 0);
    let pts: Vec<_> = out.iter().map(|u| u.pts().unwrap()).collect();
    assert_eq!(pts, (0..50).map(|i| i * 2).collect::<Vec<_>>());
    assert_eq!(out[1].payload().as_ref(), b"22");
}

#[test]
fn test_rejected_unit_is_dropped_and_stage_continues() {
    let units = vec![unit(0), unit(1), unit(2), unit(3), unit(4)];
    let (stats, out) = run_transform(
        Doubler {
            pending: VecDeque::new(),
        },
        units,
    );

    assert_eq!(stats.received, 5);
    assert_eq!(stats.dropped, 2);
    assert_eq!(stats.emitted, 3);
    let pts: Vec<_> = out.iter().map(|u| u.pts().unwrap()).collect();
    assert_eq!(pts, vec![0, 2, 4]);
}

#[test]
fn test_flush_output_arrives_before_eof() {
    let units: Vec<_> = (0..4).map(unit).collect();
    let (stats, out) = run_transform(
        Delayed {
            held: Vec::new(),
            flushed: false,
        },
        units,
    );

    assert_eq!(stats.emitted, 4);
    let pts: Vec<_> = out.iter().map(|u| u.pts().unwrap()).collect();
    assert_eq!(pts, vec![0, 1, 2, 3]);
}

#[test]
fn test_would_block_unit_is_retried_after_drain() {
    let full_count = Arc::new(AtomicUsize::new(0));
    let narrow = Narrow {
        held: VecDeque::new(),
        blocked: false,
        flushed: false,
        full_count: Arc::clone(&full_count),
    };
    let (stats, out) = run_transform(narrow, (0..6).map(unit).collect());

    assert_eq!(full_count.load(Ordering::SeqCst), 4);
    assert_eq!(stats.received, 6);
    assert_eq!(stats.dropped, 0);
    assert_eq!(stats.emitted, 6);
    let pts: Vec<_> = out.iter().map(|u| u.pts().unwrap()).collect();
    assert_eq!(pts, vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn test_collaborator_that_never_frees_space_drops_instead_of_spinning() {
    let stuck = Stuck::default();
    let offers = stuck.offers.clone();
    let (stats, out) = run_transform(stuck, vec![unit(0), unit(1)]);
    assert_eq!(stats.received, 2);
    assert_eq!(stats.dropped, 2);
    assert!(out.is_empty());
    // each unit is offered once and retried once
    assert_eq!(offers.load(Ordering::SeqCst), 4);
}

/// Builds fresh output units, as a decoder does for its frames.
#[derive(Default)]
struct Rewrap {
    pending: VecDeque<i64>,
}

impl Transform for Rewrap {
    type Input = Bytes;
    type Output = Bytes;

    fn feed(&mut self, unit: Unit<Bytes>) -> anyhow::Result<Feed<Bytes>> {
        self.pending.extend(unit.pts());
        Ok(Feed::Accepted)
    }

    fn drain(&mut self) -> anyhow::Result<Option<Unit<Bytes>>> {
        Ok(self
            .pending
            .pop_front()
            .map(|pts| Unit::new(StreamTag::Video, Bytes::new(), MS).with_timestamps(pts, pts)))
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[test]
fn test_outputs_carry_the_input_sequence() {
    let units: Vec<_> = (0..3)
        .map(|i| {
            let mut unit = unit(i * 40);
            unit.set_sequence(10 + i as u64);
            unit
        })
        .collect();
    let (_, out) = run_transform(Rewrap::default(), units);
    let sequences: Vec<_> = out.iter().map(|u| u.sequence()).collect();
    assert_eq!(sequences, vec![10, 11, 12]);
}

#[test]
fn test_passthrough_forwards_everything() {
    let units: Vec<_> = (0..10).map(unit).collect();
    let (stats, out) = run_transform(Passthrough::new(), units);
    assert_eq!(stats.emitted, 10);
    assert_eq!(out.len(), 10);
}

#[test]
fn test_empty_input_still_closes_output() {
    let (stats, out) = run_transform(Passthrough::<Bytes>::new(), Vec::new());
    assert_eq!(stats.received, 0);
    assert!(out.is_empty());
}

struct Failing {
    remaining: usize,
}

impl Source for Failing {
    type Payload = Bytes;

    fn read(&mut self) -> anyhow::Result<Option<Unit<Bytes>>> {
        if self.remaining == 0 {
            anyhow::bail!("truncated container");
        }
        self.remaining -= 1;
        Ok(Some(unit(self.remaining as i64)))
    }
}

#[test]
fn test_source_stage_numbers_units_in_read_order() {
    let (tx, rx) = channel();
    let source = IterSource::new((0..5).map(|i| unit(i * 40)));
    let stats = Box::new(SourceStage::new("demux", source, tx)).run();

    assert_eq!(stats.emitted, 5);
    let sequences: Vec<_> = rx.map(|u| u.sequence()).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_source_read_error_ends_input() {
    let (tx, rx) = channel();
    let stats = Box::new(SourceStage::new("demux", Failing { remaining: 3 }, tx)).run();

    assert_eq!(stats.emitted, 3);
    assert_eq!(rx.count(), 3);
}

#[derive(Clone, Default)]
struct Recorder {
    written: Arc<Mutex<Vec<i64>>>,
    finished: Arc<Mutex<usize>>,
}

impl Sink for Recorder {
    type Payload = Bytes;

    fn write(&mut self, unit: Unit<Bytes>) -> anyhow::Result<()> {
        let pts = unit.pts().unwrap_or(-1);
        if pts < 0 {
            anyhow::bail!("negative pts");
        }
        self.written.lock().unwrap().push(pts);
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        *self.finished.lock().unwrap() += 1;
        Ok(())
    }
}

#[test]
fn test_sink_stage_writes_all_then_finishes_once() {
    let recorder = Recorder::default();
    let (tx, rx) = channel();
    tx.push(unit(0));
    tx.push(unit(-5));
    tx.push(unit(40));
    tx.close();

    let stats = Box::new(SinkStage::new("sink", recorder.clone(), rx)).run();

    assert_eq!(stats.received, 3);
    assert_eq!(stats.emitted, 2);
    assert_eq!(stats.dropped, 1);
    assert_eq!(*recorder.written.lock().unwrap(), vec![0, 40]);
    assert_eq!(*recorder.finished.lock().unwrap(), 1);
}
