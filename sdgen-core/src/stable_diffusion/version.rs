use candle_transformers::models::stable_diffusion::StableDiffusionConfig;

use crate::Precision;

/// Tokenizer shared by the v1.5 and v2.1 text encoders.
pub const TOKENIZER_REPO: &str = "openai/clip-vit-base-patch32";

/// Architecture family the hub weights are read with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StableDiffusionVersion {
    V1_5,
    V2_1,
}

impl StableDiffusionVersion {
    /// Detect the architecture from a hub identifier, falling back to v1.5.
    pub fn from_model_id(model_id: &str) -> Self {
        let id = model_id.to_lowercase();
        if id.contains("2-1") || id.contains("2.1") || id.contains("2_1") {
            Self::V2_1
        } else {
            Self::V1_5
        }
    }

    /// (height, width) the model was trained at.
    pub fn default_size(self) -> (usize, usize) {
        match self {
            Self::V1_5 => (512, 512),
            Self::V2_1 => (768, 768),
        }
    }

    pub fn default_steps(self) -> usize {
        30
    }

    pub fn default_guidance_scale(self) -> f64 {
        7.5
    }

    pub fn config(self, height: usize, width: usize) -> StableDiffusionConfig {
        match self {
            Self::V1_5 => StableDiffusionConfig::v1_5(None, Some(height), Some(width)),
            Self::V2_1 => StableDiffusionConfig::v2_1(None, Some(height), Some(width)),
        }
    }

    pub fn text_encoder_file(self, precision: Precision) -> String {
        format!("text_encoder/model{}", precision.weight_suffix())
    }

    pub fn unet_file(self, precision: Precision) -> String {
        format!("unet/diffusion_pytorch_model{}", precision.weight_suffix())
    }

    pub fn vae_file(self, precision: Precision) -> String {
        format!("vae/diffusion_pytorch_model{}", precision.weight_suffix())
    }
}
