use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_transformers::models::stable_diffusion::{
    self as sd, clip::ClipTextTransformer, schedulers::Scheduler, unet_2d::UNet2DConditionModel,
    vae::AutoEncoderKL, StableDiffusionConfig,
};
use hf_hub::api::tokio::Api;
use image::DynamicImage;
use tokenizers::Tokenizer;

mod sampling;
mod version;

pub use version::StableDiffusionVersion;

use crate::{
    select_best_device, tensor_to_image, GenerationRequest, ImagePipeline, LoadOptions, Loader,
    Precision,
};

struct Components {
    config: StableDiffusionConfig,
    tokenizer: Tokenizer,
    text_model: ClipTextTransformer,
    unet: UNet2DConditionModel,
    vae: AutoEncoderKL,
}

/// Stable Diffusion text-to-image pipeline bound to one device.
///
/// Generation holds an internal lock, so concurrent callers run one after
/// another rather than interleaving on the device. The components are only
/// read during generation, so a lock poisoned by a panicking caller is
/// recovered instead of failing every later request.
pub struct StableDiffusionPipeline {
    version: StableDiffusionVersion,
    device: Device,
    dtype: DType,
    components: Mutex<Components>,
}

impl ImagePipeline for StableDiffusionPipeline {
    fn generate(&self, request: GenerationRequest) -> Result<Vec<DynamicImage>> {
        request.validate()?;
        let (default_height, default_width) = self.version.default_size();
        let height = request.height.unwrap_or(default_height);
        let width = request.width.unwrap_or(default_width);
        let steps = request.steps.unwrap_or(self.version.default_steps());
        let guidance_scale = request
            .guidance_scale
            .unwrap_or(self.version.default_guidance_scale());
        let use_guidance = guidance_scale > 1.0;

        let components = self
            .components
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tracing::info!(height, width, steps, guidance_scale, seed = ?request.seed, "generating image");

        // --- Text conditioning, unconditional first when guiding ---
        let text_embeddings = {
            let cond = sampling::text_embeddings(
                &components.tokenizer,
                &components.text_model,
                &components.config.clip,
                &request.prompt,
                &self.device,
            )?;
            if use_guidance {
                let negative = request.negative_prompt.as_deref().unwrap_or("");
                let uncond = sampling::text_embeddings(
                    &components.tokenizer,
                    &components.text_model,
                    &components.config.clip,
                    negative,
                    &self.device,
                )?;
                Tensor::cat(&[uncond, cond], 0)?
            } else {
                cond
            }
        }
        .to_dtype(self.dtype)?;

        // --- Denoising loop ---
        let mut scheduler = components.config.build_scheduler(steps)?;
        let timesteps = scheduler.timesteps().to_vec();
        let latents =
            sampling::initial_latents((1, 4, height / 8, width / 8), request.seed, &self.device)?;
        let mut latents = (latents * scheduler.init_noise_sigma())?.to_dtype(self.dtype)?;

        for (index, &timestep) in timesteps.iter().enumerate() {
            let model_input = if use_guidance {
                Tensor::cat(&[&latents, &latents], 0)?
            } else {
                latents.clone()
            };
            let model_input = scheduler.scale_model_input(model_input, timestep)?;
            let noise_pred =
                components
                    .unet
                    .forward(&model_input, timestep as f64, &text_embeddings)?;
            let noise_pred = if use_guidance {
                let chunks = noise_pred.chunk(2, 0)?;
                let (uncond, cond) = (&chunks[0], &chunks[1]);
                (uncond + ((cond - uncond)? * guidance_scale)?)?
            } else {
                noise_pred
            };
            latents = scheduler.step(&noise_pred, timestep, &latents)?;
            tracing::debug!(step = index + 1, steps, timestep, "denoising step done");
        }

        // --- Decode and convert to u8 RGB ---
        let decoded = components.vae.decode(&(latents / sampling::VAE_SCALE)?)?;
        let decoded = ((decoded.to_dtype(DType::F32)? / 2.)? + 0.5)?.to_device(&Device::Cpu)?;
        let images = (decoded.clamp(0f32, 1f32)? * 255.)?.to_dtype(DType::U8)?;

        (0..images.dim(0)?)
            .map(|idx| tensor_to_image(&images.i(idx)?))
            .collect()
    }
}

pub struct StableDiffusionLoader;

impl Loader for StableDiffusionLoader {
    type Pipeline = StableDiffusionPipeline;

    async fn load(model_id: &str, api: Api, options: LoadOptions) -> Result<Self::Pipeline> {
        let device = select_best_device(options.device_map).context("failed to set up device")?;
        let precision = Precision::for_device(&device, options.force_f32);
        let dtype = precision.dtype();
        let version = StableDiffusionVersion::from_model_id(model_id);
        tracing::info!(model = model_id, ?precision, ?version, "fetching weights");

        let (height, width) = version.default_size();
        let config = version.config(height, width);
        let repo = api.model(model_id.to_string());

        // --- Tokenizer and CLIP text encoder ---
        let tokenizer_file = api
            .model(version::TOKENIZER_REPO.to_string())
            .get("tokenizer.json")
            .await
            .context("failed to get CLIP tokenizer")?;
        let tokenizer = Tokenizer::from_file(tokenizer_file)
            .map_err(anyhow::Error::msg)
            .context("failed to load CLIP tokenizer")?;
        let clip_weights = repo
            .get(&version.text_encoder_file(precision))
            .await
            .context("failed to get text encoder weights")?;
        // The text encoder stays in f32; its output is cast to the pipeline dtype.
        let text_model = sd::build_clip_transformer(&config.clip, clip_weights, &device, DType::F32)
            .context("failed to load text encoder")?;

        // --- UNet ---
        let unet_weights = repo
            .get(&version.unet_file(precision))
            .await
            .context("failed to get unet weights")?;
        let unet = config
            .build_unet(unet_weights, &device, 4, cfg!(feature = "flash-attn"), dtype)
            .context("failed to load unet")?;

        // --- VAE ---
        let vae_weights = repo
            .get(&version.vae_file(precision))
            .await
            .context("failed to get vae weights")?;
        let vae = config
            .build_vae(vae_weights, &device, dtype)
            .context("failed to load vae")?;

        Ok(StableDiffusionPipeline {
            version,
            device,
            dtype,
            components: Mutex::new(Components {
                config,
                tokenizer,
                text_model,
                unet,
                vae,
            }),
        })
    }
}
