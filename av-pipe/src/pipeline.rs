use std::fmt::{Display, Formatter};

use crate::stage::{Stage, StageStats};

/// Owns every stage of one run. Queues are owned by the stages at their two
/// ends, so dropping the pipeline drops the whole graph.
pub struct Pipeline {
    name: String,
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stages: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_stage(&mut self, stage: Box<dyn Stage>) -> &mut Self {
        self.stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Starts one blocking worker per stage and waits for all of them.
    ///
    /// Workers are joined even when one of them panics; its dropped queue
    /// senders latch EOF so the rest of the graph drains normally. The
    /// panic is reported as an error after the join.
    pub async fn run(self) -> anyhow::Result<PipelineReport> {
        let Self { name, stages } = self;
        if stages.is_empty() {
            return Err(anyhow::anyhow!("pipeline {} has no stages", name));
        }
        log::info!("pipeline {}: starting {} stages", name, stages.len());

        let mut names = Vec::with_capacity(stages.len());
        let mut handles = Vec::with_capacity(stages.len());
        for stage in stages {
            names.push(stage.name().to_string());
            handles.push(tokio::task::spawn_blocking(move || stage.run()));
        }

        let results = futures::future::join_all(handles).await;

        let mut report = PipelineReport {
            name: name.clone(),
            stages: Vec::with_capacity(results.len()),
        };
        let mut failed = Vec::new();
        for (stage_name, result) in names.into_iter().zip(results) {
            match result {
                Ok(stats) => report.stages.push(stats),
                Err(e) => {
                    log::error!("pipeline {}: stage {} failed: {}", name, stage_name, e);
                    failed.push(stage_name);
                }
            }
        }

        if !failed.is_empty() {
            return Err(anyhow::anyhow!(
                "pipeline {}: stages failed: {}",
                name,
                failed.join(", ")
            ));
        }
        log::info!("pipeline {}: finished", name);
        Ok(report)
    }
}

/// Per-stage statistics of a finished run, in stage registration order.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub name: String,
    pub stages: Vec<StageStats>,
}

impl PipelineReport {
    pub fn stage(&self, name: &str) -> Option<&StageStats> {
        self.stages.iter().find(|stats| stats.name == name)
    }
}

impl Display for PipelineReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "pipeline {}:", self.name)?;
        for stats in &self.stages {
            writeln!(f, "  {}", stats)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
