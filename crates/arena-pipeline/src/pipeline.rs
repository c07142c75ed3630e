//! Pipeline construction and execution: an ordered chain of
//! stages wired by channels, run as independent tasks, with both a
//! streaming and a synchronous entry point.

use std::sync::Arc;
use std::time::Duration;

use arena_domain::{Error, Result};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::context::SharedContext;
use crate::element::StreamElement;
use crate::stage::Stage;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bounded channel capacity between consecutive stages.
    pub channel_buffer_size: usize,
    /// Overall wall-clock budget for one `execute_sync` call. `None`
    /// means no bound beyond the graceful-shutdown timeout applied
    /// after cancellation.
    pub execution_timeout: Option<Duration>,
    /// How long the supervisor waits for in-flight stages to notice
    /// cancellation and exit cleanly before aborting them outright.
    pub graceful_shutdown_timeout: Duration,
    /// Reserved for a future priority-queue scheduling mode; stages
    /// that set `StreamElement::priority` are otherwise processed FIFO.
    pub priority_queue_mode: bool,
    pub metrics_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 16,
            execution_timeout: Some(Duration::from_secs(120)),
            graceful_shutdown_timeout: Duration::from_secs(5),
            priority_queue_mode: false,
            metrics_enabled: true,
        }
    }
}

pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
    config: PipelineConfig,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            stages: Vec::new(),
            config,
        }
    }

    pub fn add_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
            config: self.config,
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running pipeline execution: a receiver for the final stage's
/// output, plus a handle that resolves to the first hard error any
/// stage returned (or `Ok(())` if every stage exited cleanly).
pub struct PipelineRun {
    pub output: mpsc::Receiver<StreamElement>,
    supervisor: tokio::task::JoinHandle<Result<()>>,
}

impl PipelineRun {
    /// Wait for every stage to finish and surface the first hard error,
    /// if any.
    pub async fn join(self) -> Result<()> {
        match self.supervisor.await {
            Ok(result) => result,
            Err(join_err) => Err(Error::Internal(join_err.to_string())),
        }
    }
}

/// The aggregated result of draining a pipeline to completion via
/// `execute_sync`'s synchronous entry point.
pub struct PipelineOutcome {
    pub elements: Vec<StreamElement>,
    pub error: Option<Error>,
}

impl PipelineOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start the pipeline and return immediately with a streaming
    /// output channel. The pipeline exposes both this streaming entry
    /// point and a synchronous one (`execute_sync`).
    pub async fn execute(&self, ctx: SharedContext, seed: StreamElement) -> PipelineRun {
        let stage_count = self.stages.len();
        let buffer = self.config.channel_buffer_size.max(1);

        let mut txs = Vec::with_capacity(stage_count + 1);
        let mut rxs = Vec::with_capacity(stage_count + 1);
        for _ in 0..=stage_count {
            let (tx, rx) = mpsc::channel(buffer);
            txs.push(tx);
            rxs.push(rx);
        }

        let mut rx_iter = rxs.into_iter();
        let stage_inputs: Vec<_> = (&mut rx_iter).take(stage_count).collect();
        let final_rx = rx_iter.next().expect("stage_count + 1 channels were built");

        let mut tx_iter = txs.into_iter();
        let seed_tx = tx_iter.next().expect("stage_count + 1 channels were built");
        let stage_outputs: Vec<_> = tx_iter.collect();

        let stages = self.stages.clone();
        let graceful_timeout = self.config.graceful_shutdown_timeout;
        let ctx_for_cancel = ctx.clone();

        let supervisor = tokio::spawn(async move {
            let cancel = { ctx_for_cancel.lock().await.cancel.clone() };

            // Seed the first stage's input, then drop the sender so its
            // channel closes once the seed is consumed.
            tokio::spawn(async move {
                let _ = seed_tx.send(seed).await;
            });

            let mut join_set = JoinSet::new();
            for (stage, (mut input, output)) in stages
                .into_iter()
                .zip(stage_inputs.into_iter().zip(stage_outputs.into_iter()))
            {
                let stage_ctx = ctx.clone();
                let stage_cancel = cancel.clone();
                join_set.spawn(async move {
                    let name = stage.name().to_string();
                    let result = stage.process(&stage_ctx, &mut input, &output).await;
                    drop(output);
                    if let Err(ref e) = result {
                        tracing::warn!(stage = %name, error = %e, "stage returned a hard error, cancelling peers");
                        stage_cancel.cancel();
                    }
                    result
                });
            }

            let mut first_err = None;
            let drain = async {
                while let Some(joined) = join_set.join_next().await {
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            if first_err.is_none() {
                                first_err = Some(e);
                            }
                        }
                        Err(join_err) => {
                            if first_err.is_none() {
                                first_err = Some(Error::Internal(join_err.to_string()));
                            }
                        }
                    }
                }
            };

            if tokio::time::timeout(graceful_timeout, drain).await.is_err() {
                join_set.abort_all();
                if first_err.is_none() {
                    first_err = Some(Error::Timeout(
                        "pipeline graceful shutdown timeout exceeded".into(),
                    ));
                }
            }

            match first_err {
                Some(e) => Err(e),
                None => Ok(()),
            }
        });

        PipelineRun {
            output: final_rx,
            supervisor,
        }
    }

    /// Drain the pipeline to completion and assemble an aggregated
    /// result — the synchronous entry point. Applies the pipeline's
    /// `execution_timeout`, if configured, as an outer bound; on
    /// timeout the cancellation signal fires and the supervisor is
    /// still awaited so the caller gets an accurate error.
    pub async fn execute_sync(&self, ctx: SharedContext, seed: StreamElement) -> PipelineOutcome {
        let cancel = { ctx.lock().await.cancel.clone() };
        let run = self.execute(ctx, seed).await;
        let PipelineRun { mut output, supervisor } = run;

        let drain = async {
            let mut elements = Vec::new();
            while let Some(element) = output.recv().await {
                elements.push(element);
            }
            elements
        };

        let (elements, timed_out) = match self.config.execution_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, drain).await {
                Ok(elements) => (elements, false),
                Err(_) => {
                    cancel.cancel();
                    (Vec::new(), true)
                }
            },
            None => (drain.await, false),
        };

        let stage_result = match supervisor.await {
            Ok(result) => result,
            Err(join_err) => Err(Error::Internal(join_err.to_string())),
        };

        let error = if timed_out {
            Some(stage_result.err().unwrap_or_else(|| Error::Timeout("pipeline execution timeout exceeded".into())))
        } else {
            stage_result.err()
        };

        PipelineOutcome { elements, error }
    }
}
