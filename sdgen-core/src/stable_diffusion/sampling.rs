use anyhow::{Context, Error, Result};
use candle_core::{Device, Tensor};
use candle_nn::Module;
use candle_transformers::models::stable_diffusion::clip::{ClipTextTransformer, Config};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use tokenizers::Tokenizer;

const END_OF_TEXT: &str = "<|endoftext|>";

/// Latents are decoded by the VAE after dividing by this factor.
pub const VAE_SCALE: f64 = 0.18215;

/// Tokenize `prompt` into a fixed-length id sequence for the CLIP encoder.
///
/// Sequences are padded with the configured pad token (end-of-text when
/// unset). Over-long prompts are truncated and keep their end-of-text token.
pub fn prompt_tokens(tokenizer: &Tokenizer, config: &Config, prompt: &str) -> Result<Vec<u32>> {
    let vocab = tokenizer.get_vocab(true);
    let eos_id = *vocab
        .get(END_OF_TEXT)
        .context("tokenizer has no end-of-text token")?;
    let pad_id = match &config.pad_with {
        Some(padding) => *vocab
            .get(padding.as_str())
            .with_context(|| format!("tokenizer has no padding token {padding:?}"))?,
        None => eos_id,
    };

    let max_len = config.max_position_embeddings;
    let mut tokens = tokenizer
        .encode(prompt, true)
        .map_err(Error::msg)?
        .get_ids()
        .to_vec();
    if tokens.len() > max_len {
        tracing::warn!(tokens = tokens.len(), max_len, "prompt truncated");
        tokens.truncate(max_len);
        tokens[max_len - 1] = eos_id;
    }
    tokens.resize(max_len, pad_id);
    Ok(tokens)
}

/// Embed a prompt with the CLIP text encoder, shape (1, seq_len, hidden).
pub fn text_embeddings(
    tokenizer: &Tokenizer,
    text_model: &ClipTextTransformer,
    config: &Config,
    prompt: &str,
    device: &Device,
) -> Result<Tensor> {
    let tokens = prompt_tokens(tokenizer, config, prompt)?;
    let tokens = Tensor::new(tokens.as_slice(), device)?.unsqueeze(0)?;
    Ok(text_model.forward(&tokens)?)
}

/// Standard-normal starting latents.
///
/// A seeded request draws the noise on the host so the same seed yields the
/// same latents on every device.
pub fn initial_latents(
    shape: (usize, usize, usize, usize),
    seed: Option<u64>,
    device: &Device,
) -> Result<Tensor> {
    match seed {
        Some(seed) => {
            let (b, c, h, w) = shape;
            let len = b
                .checked_mul(c)
                .and_then(|n| n.checked_mul(h))
                .and_then(|n| n.checked_mul(w))
                .with_context(|| format!("latent shape {shape:?} is too large"))?;
            let mut rng = StdRng::seed_from_u64(seed);
            let noise: Vec<f32> = (0..len)
                .map(|_| rng.sample::<f32, _>(StandardNormal))
                .collect();
            Ok(Tensor::from_vec(noise, shape, &Device::Cpu)?.to_device(device)?)
        }
        None => Ok(Tensor::randn(0f32, 1f32, shape, device)?),
    }
}
