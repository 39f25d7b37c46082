use std::future::Future;

use anyhow::Result;
use hf_hub::api::tokio::Api;

use crate::{DeviceMap, ImagePipeline};

/// Knobs that apply to every loader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub device_map: DeviceMap,
    /// Keep f32 even when an accelerator would allow f16.
    pub force_f32: bool,
}

pub trait Loader {
    type Pipeline: ImagePipeline;

    fn load(
        model_id: &str,
        api: Api,
        options: LoadOptions,
    ) -> impl Future<Output = Result<Self::Pipeline>>
    where
        Self: Sized;
}
