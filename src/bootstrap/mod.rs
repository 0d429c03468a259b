//! Bootstrap sequencer.
//!
//! Runs the ordered, idempotent provisioning steps — lifecycle policy,
//! component templates, inference endpoints, retention, index template —
//! under one of three policies. Steps never roll back; a re-run after a
//! partial failure resumes safely because every step is idempotent against
//! server state.

mod context;
mod steps;

pub use context::{BootstrapContext, BootstrapPolicy, DataStreamType, JsonProvider};

use crate::error::ChannelError;
use tracing::{info, warn};

/// Inference endpoint provisioning parameters, only relevant to semantic-search variants.
#[derive(Default, Clone)]
pub struct InferenceOptions {
    pub endpoint_id: Option<String>,
    pub reuse_existing: bool,
}

/// Runs the sequencer against `ctx`. `is_data_stream` governs whether the
/// index template step embeds a `data_stream` block. Returns whether the
/// index template was actually provisioned (bootstrap succeeded either way
/// under `Silent`/`None`; the return value only distinguishes "did work"
/// from "short-circuited").
pub async fn bootstrap(
    ctx: &mut BootstrapContext,
    is_data_stream: bool,
    inference: InferenceOptions,
) -> anyhow::Result<bool> {
    if ctx.policy == BootstrapPolicy::None {
        return Ok(true);
    }

    match run_steps(ctx, is_data_stream, inference).await {
        Ok(applied) => Ok(applied),
        Err(err) => match ctx.policy {
            BootstrapPolicy::Failure => {
                Err(anyhow::Error::from(err).context("bootstrap sequencer failed"))
            }
            BootstrapPolicy::Silent => {
                warn!(error = %err, "bootstrap step failed under silent policy");
                Ok(false)
            }
            BootstrapPolicy::None => unreachable!("handled above"),
        },
    }
}

async fn run_steps(
    ctx: &mut BootstrapContext,
    is_data_stream: bool,
    inference: InferenceOptions,
) -> Result<bool, ChannelError> {
    steps::lifecycle_policy(ctx).await?;
    steps::component_templates(ctx).await?;
    steps::inference_endpoints(ctx, inference.endpoint_id.as_deref(), inference.reuse_existing).await?;
    // data_stream_retention has no server effect; callers set ctx.retention
    // directly before calling bootstrap if they need a non-default value.
    let applied = steps::index_template(ctx, is_data_stream).await?;
    info!(template = %ctx.template_name, applied, "bootstrap sequence complete");
    Ok(applied)
}
