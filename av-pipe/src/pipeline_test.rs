use std::sync::{Arc, Mutex};

use bytes::Bytes;

use super::Pipeline;
use crate::queue::{QueueSender, channel};
use crate::sink::{Sink, SinkStage};
use crate::source::{IterSource, SourceStage};
use crate::stage::{Passthrough, Stage, StageStats, TransformStage};
use crate::unit::{Rational, StreamTag, Unit};

fn unit(pts: i64) -> Unit<Bytes> {
    Unit::new(StreamTag::Video, Bytes::new(), Rational::new(1, 1000)).with_timestamps(pts, pts)
}

#[derive(Clone, Default)]
struct Collect {
    pts: Arc<Mutex<Vec<i64>>>,
    finished: Arc<Mutex<bool>>,
}

impl Sink for Collect {
    type Payload = Bytes;

    fn write(&mut self, unit: Unit<Bytes>) -> anyhow::Result<()> {
        self.pts.lock().unwrap().extend(unit.pts());
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        *self.finished.lock().unwrap() = true;
        Ok(())
    }
}

/// Forwards a few units, then panics while still holding its output.
struct Exploding {
    output: QueueSender<Unit<Bytes>>,
}

impl Stage for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }

    fn run(self: Box<Self>) -> StageStats {
        self.output.push(unit(0));
        self.output.push(unit(40));
        panic!("collaborator crashed");
    }
}

#[tokio::test]
async fn test_linear_pipeline_runs_to_completion() -> anyhow::Result<()> {
    let sink = Collect::default();
    let (src_tx, src_rx) = channel();
    let (mid_tx, mid_rx) = channel();

    let mut pipeline = Pipeline::new("linear");
    pipeline
        .add_stage(Box::new(SourceStage::new(
            "demux",
            IterSource::new((0..100).map(|i| unit(i * 40))),
            src_tx,
        )))
        .add_stage(Box::new(TransformStage::new(
            "copy",
            Passthrough::new(),
            src_rx,
            mid_tx,
        )))
        .add_stage(Box::new(SinkStage::new("sink", sink.clone(), mid_rx)));
    assert_eq!(pipeline.stage_names(), vec!["demux", "copy", "sink"]);

    let report = pipeline.run().await?;

    assert_eq!(report.stages.len(), 3);
    assert_eq!(report.stage("demux").unwrap().emitted, 100);
    assert_eq!(report.stage("copy").unwrap().emitted, 100);
    assert_eq!(report.stage("sink").unwrap().emitted, 100);
    assert!(report.stage("missing").is_none());
    assert!(report.to_string().contains("copy: received 100"));

    let pts = sink.pts.lock().unwrap().clone();
    assert_eq!(pts, (0..100).map(|i| i * 40).collect::<Vec<_>>());
    assert!(*sink.finished.lock().unwrap());
    Ok(())
}

#[tokio::test]
async fn test_panicking_stage_fails_run_without_wedging_downstream() {
    let sink = Collect::default();
    let (tx, rx) = channel();

    let mut pipeline = Pipeline::new("broken");
    pipeline
        .add_stage(Box::new(Exploding { output: tx }))
        .add_stage(Box::new(SinkStage::new("sink", sink.clone(), rx)));

    let err = pipeline.run().await.unwrap_err();
    assert!(err.to_string().contains("exploding"));

    // the sink saw EOF through the dropped sender and finished normally
    assert_eq!(*sink.pts.lock().unwrap(), vec![0, 40]);
    assert!(*sink.finished.lock().unwrap());
}

#[tokio::test]
async fn test_empty_pipeline_is_rejected() {
    let pipeline = Pipeline::new("empty");
    assert!(pipeline.is_empty());
    assert!(pipeline.run().await.is_err());
}
