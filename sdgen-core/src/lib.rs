#[cfg(feature = "accelerate")]
extern crate accelerate_src;

#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

pub mod device_map;
pub mod loader;
mod loader_factory;
pub mod state;
mod util;

mod stable_diffusion;

pub use device_map::*;
use image::DynamicImage;
pub use loader::*;
pub use loader_factory::*;
use serde::{Deserialize, Serialize};
pub use stable_diffusion::{StableDiffusionLoader, StableDiffusionPipeline, StableDiffusionVersion};
pub use state::PipelineState;
pub use util::*;

/// Model identifier used when none is configured.
pub const DEFAULT_MODEL_ID: &str = "runwayml/stable-diffusion-v1-5";

/// A text-to-image request. Only `prompt` is required; every other field
/// falls back to the defaults of the loaded model.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub height: Option<usize>,
    #[serde(default)]
    pub steps: Option<usize>,
    #[serde(default)]
    pub guidance_scale: Option<f64>,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Largest accepted image side, in pixels.
pub const MAX_IMAGE_SIDE: usize = 2048;

/// Largest accepted number of denoising steps.
pub const MAX_STEPS: usize = 150;

impl GenerationRequest {
    /// Reject parameters the pipeline cannot run with. Checked before any
    /// model state is touched.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, side) in [("width", self.width), ("height", self.height)] {
            if let Some(side) = side {
                if side == 0 || side % 8 != 0 || side > MAX_IMAGE_SIDE {
                    anyhow::bail!(
                        "{name} {side} must be a non-zero multiple of 8 no larger than {MAX_IMAGE_SIDE}"
                    );
                }
            }
        }
        if let Some(steps) = self.steps {
            if !(1..=MAX_STEPS).contains(&steps) {
                anyhow::bail!("steps {steps} must be between 1 and {MAX_STEPS}");
            }
        }
        if let Some(scale) = self.guidance_scale {
            if !scale.is_finite() {
                anyhow::bail!("guidance_scale must be a finite number");
            }
        }
        Ok(())
    }
}

/// A ready-to-call text-to-image pipeline.
///
/// Implementations may return several images for one request; callers that
/// need a single image take the first.
pub trait ImagePipeline: Send + Sync {
    fn generate(&self, request: GenerationRequest) -> anyhow::Result<Vec<DynamicImage>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_is_the_only_required_field() {
        let request: GenerationRequest =
            serde_json::from_str(r#"{"prompt": "a red cube on a table"}"#).unwrap();
        assert_eq!(
            request,
            GenerationRequest {
                prompt: "a red cube on a table".to_string(),
                ..Default::default()
            }
        );

        assert!(serde_json::from_str::<GenerationRequest>(r#"{"steps": 4}"#).is_err());
    }

    #[test]
    fn optional_fields_are_read_when_present() {
        let request: GenerationRequest = serde_json::from_str(
            r#"{"prompt": "a lighthouse", "width": 640, "steps": 20, "seed": 7, "extra": true}"#,
        )
        .unwrap();
        assert_eq!(request.width, Some(640));
        assert_eq!(request.height, None);
        assert_eq!(request.steps, Some(20));
        assert_eq!(request.seed, Some(7));
    }

    fn with(f: impl FnOnce(&mut GenerationRequest)) -> GenerationRequest {
        let mut request = GenerationRequest {
            prompt: "x".to_string(),
            ..Default::default()
        };
        f(&mut request);
        request
    }

    #[test]
    fn defaults_and_in_range_values_are_accepted() {
        assert!(with(|_| {}).validate().is_ok());
        assert!(with(|r| {
            r.width = Some(768);
            r.height = Some(MAX_IMAGE_SIDE);
            r.steps = Some(MAX_STEPS);
            r.guidance_scale = Some(0.0);
        })
        .validate()
        .is_ok());
        assert!(with(|r| r.steps = Some(1)).validate().is_ok());
    }

    #[test]
    fn zero_or_excessive_steps_are_rejected() {
        let err = with(|r| r.steps = Some(0)).validate().unwrap_err();
        assert_eq!(err.to_string(), "steps 0 must be between 1 and 150");
        assert!(with(|r| r.steps = Some(MAX_STEPS + 1)).validate().is_err());
    }

    #[test]
    fn sizes_must_be_bounded_multiples_of_eight() {
        assert!(with(|r| r.width = Some(500)).validate().is_err());
        assert!(with(|r| r.height = Some(0)).validate().is_err());
        assert!(with(|r| r.width = Some(262_144)).validate().is_err());
        assert!(with(|r| r.height = Some(MAX_IMAGE_SIDE + 8)).validate().is_err());
    }

    #[test]
    fn non_finite_guidance_is_rejected() {
        assert!(with(|r| r.guidance_scale = Some(f64::NAN)).validate().is_err());
        assert!(with(|r| r.guidance_scale = Some(f64::INFINITY)).validate().is_err());
    }
}
