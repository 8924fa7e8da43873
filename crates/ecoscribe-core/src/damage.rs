//! Synthetic damage for restoration testing.
//!
//! Replaces `floor(token_count × mask_ratio)` whitespace-delimited tokens
//! with a placeholder. Positions are sampled uniformly without replacement,
//! so the output always has exactly as many tokens as the input.
//!
//! Tokens are rejoined with single spaces; the original whitespace layout
//! (newlines, runs of spaces) is not preserved.
//!
//! ```rust
//! use ecoscribe_core::damage::simulate_seeded;
//!
//! let damaged = simulate_seeded("one two three four", 0.5, 7).unwrap();
//! assert_eq!(damaged.masked.len(), 2);
//! assert_eq!(damaged.text.split_whitespace().count(), 4);
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::error::{RestoreError, Result};

/// Default placeholder substituted for a masked token.
pub const MASK_TOKEN: &str = "[MASK]";

/// A damaged variant of a source text.
#[derive(Debug, Clone, Serialize)]
pub struct DamagedText {
    pub original: String,
    pub mask_ratio: f64,
    pub placeholder: String,
    /// The damaged string, tokens joined by single spaces.
    pub text: String,
    /// Masked token positions, ascending.
    pub masked: Vec<usize>,
}

impl DamagedText {
    pub fn token_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Masks tokens with a configurable placeholder.
#[derive(Debug, Clone)]
pub struct DamageSimulator {
    placeholder: String,
}

impl Default for DamageSimulator {
    fn default() -> Self {
        Self {
            placeholder: MASK_TOKEN.to_string(),
        }
    }
}

impl DamageSimulator {
    /// A placeholder must be a single non-empty token, otherwise masking
    /// would change the token count.
    pub fn new(placeholder: &str) -> Result<Self> {
        if placeholder.is_empty() || placeholder.chars().any(char::is_whitespace) {
            return Err(RestoreError::InvalidArgument(format!(
                "placeholder must be a single non-empty token, got {:?}",
                placeholder
            )));
        }
        Ok(Self {
            placeholder: placeholder.to_string(),
        })
    }

    pub fn simulate<R: Rng + ?Sized>(
        &self,
        text: &str,
        mask_ratio: f64,
        rng: &mut R,
    ) -> Result<DamagedText> {
        if !(0.0..=1.0).contains(&mask_ratio) {
            return Err(RestoreError::InvalidArgument(format!(
                "mask_ratio must be in [0.0, 1.0], got {}",
                mask_ratio
            )));
        }

        let mut tokens: Vec<&str> = text.split_whitespace().collect();
        let num_masks = (tokens.len() as f64 * mask_ratio).floor() as usize;
        let num_masks = num_masks.min(tokens.len());

        let mut masked = rand::seq::index::sample(rng, tokens.len(), num_masks).into_vec();
        masked.sort_unstable();

        for &i in &masked {
            tokens[i] = self.placeholder.as_str();
        }

        Ok(DamagedText {
            original: text.to_string(),
            mask_ratio,
            placeholder: self.placeholder.clone(),
            text: tokens.join(" "),
            masked,
        })
    }
}

/// Mask with the default placeholder and a reproducible seed.
pub fn simulate_seeded(text: &str, mask_ratio: f64, seed: u64) -> Result<DamagedText> {
    let mut rng = StdRng::seed_from_u64(seed);
    DamageSimulator::default().simulate(text, mask_ratio, &mut rng)
}

/// Mask with the default placeholder and the thread-local RNG.
pub fn simulate_damage(text: &str, mask_ratio: f64) -> Result<DamagedText> {
    DamageSimulator::default().simulate(text, mask_ratio, &mut rand::thread_rng())
}
