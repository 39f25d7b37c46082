use std::sync::Arc;

use anyhow::Result;
use hf_hub::api::tokio::Api;

use crate::{ImagePipeline, LoadOptions, Loader, StableDiffusionLoader, StableDiffusionVersion};

/// Load the pipeline for a hub model identifier.
///
/// The identifier goes to the hub untouched; it only picks which architecture
/// configuration the downloaded weights are read with.
pub async fn load_pipeline(
    model_id: &str,
    api: Api,
    options: LoadOptions,
) -> Result<Arc<dyn ImagePipeline>> {
    let version = StableDiffusionVersion::from_model_id(model_id);
    tracing::info!(
        model = model_id,
        version = ?version,
        device_map = ?options.device_map,
        force_f32 = options.force_f32,
        "loading model"
    );

    let pipeline = StableDiffusionLoader::load(model_id, api, options).await?;
    tracing::info!(model = model_id, "model loaded");
    Ok(Arc::new(pipeline))
}
