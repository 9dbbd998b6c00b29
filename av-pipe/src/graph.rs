//! Wiring of the transcode graph:
//!
//! ```text
//! source -> split -+-> decode -> filter -> encode -+-> interleave -> sink
//!                  +-> decode -> filter -> encode -+
//! ```
//!
//! One branch per stream tag. Branch registration order is the interleave
//! tie-break priority.

use crate::{
    interleave::InterleaveStage,
    pipeline::Pipeline,
    queue::channel,
    sink::{Sink, SinkStage},
    source::{Source, SourceStage},
    split::SplitStage,
    stage::{BoxTransform, Stage, TransformStage},
    unit::StreamTag,
};

/// Collaborators of one elementary stream. `P` is the encoded payload
/// (packets), `F` the decoded one (frames).
pub struct Branch<P, F> {
    pub tag: StreamTag,
    pub decoder: BoxTransform<P, F>,
    pub filter: BoxTransform<F, F>,
    pub encoder: BoxTransform<F, P>,
}

pub struct TranscodeGraph<P, F> {
    name: String,
    branches: Vec<Branch<P, F>>,
}

impl<P, F> TranscodeGraph<P, F>
where
    P: Send + 'static,
    F: Send + 'static,
{
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            branches: Vec::new(),
        }
    }

    pub fn branch(
        mut self,
        tag: StreamTag,
        decoder: BoxTransform<P, F>,
        filter: BoxTransform<F, F>,
        encoder: BoxTransform<F, P>,
    ) -> Self {
        self.branches.push(Branch {
            tag,
            decoder,
            filter,
            encoder,
        });
        self
    }

    pub fn tags(&self) -> Vec<StreamTag> {
        self.branches.iter().map(|branch| branch.tag).collect()
    }

    /// Creates every queue, then every stage, and hands them to a pipeline.
    /// Nothing runs until [`Pipeline::run`].
    pub fn build<S, K>(self, source: S, sink: K) -> anyhow::Result<Pipeline>
    where
        S: Source<Payload = P> + 'static,
        K: Sink<Payload = P> + 'static,
    {
        let Self { name, branches } = self;
        if branches.is_empty() {
            return Err(anyhow::anyhow!("graph {} has no branches", name));
        }
        for (i, branch) in branches.iter().enumerate() {
            if branches[..i].iter().any(|b| b.tag == branch.tag) {
                return Err(anyhow::anyhow!(
                    "graph {}: duplicate {} branch",
                    name,
                    branch.tag
                ));
            }
        }

        let (source_tx, source_rx) = channel();
        let (mux_tx, mux_rx) = channel();

        let mut split = SplitStage::new("split", source_rx);
        let mut interleave = InterleaveStage::new("mux", mux_tx);
        let mut transforms: Vec<Box<dyn Stage>> = Vec::with_capacity(branches.len() * 3);

        for branch in branches {
            let tag = branch.tag;
            let (split_tx, decode_rx) = channel();
            let (decode_tx, filter_rx) = channel();
            let (filter_tx, encode_rx) = channel();
            let (encode_tx, mux_in_rx) = channel();

            split = split.route(tag, split_tx);
            interleave = interleave.input(tag, mux_in_rx);

            transforms.push(Box::new(TransformStage::new(
                &format!("{}-decode", tag),
                branch.decoder,
                decode_rx,
                decode_tx,
            )));
            transforms.push(Box::new(TransformStage::new(
                &format!("{}-filter", tag),
                branch.filter,
                filter_rx,
                filter_tx,
            )));
            transforms.push(Box::new(TransformStage::new(
                &format!("{}-encode", tag),
                branch.encoder,
                encode_rx,
                encode_tx,
            )));
        }

        let mut pipeline = Pipeline::new(&name);
        pipeline.add_stage(Box::new(SourceStage::new("demux", source, source_tx)));
        pipeline.add_stage(Box::new(split));
        for stage in transforms {
            pipeline.add_stage(stage);
        }
        pipeline.add_stage(Box::new(interleave));
        pipeline.add_stage(Box::new(SinkStage::new("sink", sink, mux_rx)));

        log::info!("graph {}: built stages {:?}", name, pipeline.stage_names());
        Ok(pipeline)
    }
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod graph_test;
