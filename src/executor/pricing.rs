//! Static per-model token pricing.
//!
//! Used for two things: estimating the running cost of an in-flight run so
//! the budget ceiling can be enforced mid-stream, and computing the cost of
//! agents (codex) that do not report spend themselves. Rates are USD per
//! one million tokens.

use crate::record::TokenTotals;

/// USD per 1M tokens for one model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    /// Fresh input tokens (cache writes are billed at this rate too).
    pub input: f64,
    /// Cached input tokens (prompt cache reads).
    pub cached_input: f64,
    /// Output tokens.
    pub output: f64,
}

/// Fallback rates applied to unknown model ids.
const DEFAULT_PRICING: ModelPricing = ModelPricing {
    input: 2.00,
    cached_input: 0.50,
    output: 8.00,
};

impl ModelPricing {
    /// Looks up pricing for a model id.
    ///
    /// Matching is by family substring so versioned ids ("claude-sonnet-4-5",
    /// "openai/gpt-5-codex:nitro") resolve without an exhaustive table.
    /// Unknown models fall back to [`DEFAULT_PRICING`].
    pub fn for_model(model: &str) -> Self {
        let id = model.to_lowercase();
        if id.contains("opus") {
            Self {
                input: 15.00,
                cached_input: 1.50,
                output: 75.00,
            }
        } else if id.contains("sonnet") {
            Self {
                input: 3.00,
                cached_input: 0.30,
                output: 15.00,
            }
        } else if id.contains("haiku") {
            Self {
                input: 1.00,
                cached_input: 0.10,
                output: 5.00,
            }
        } else if id.contains("gpt-5-codex") || id.contains("o3") {
            Self {
                input: 2.00,
                cached_input: 0.50,
                output: 8.00,
            }
        } else {
            DEFAULT_PRICING
        }
    }

    /// Estimates the cost of the given token totals in USD.
    pub fn estimate(&self, tokens: &TokenTotals) -> f64 {
        let fresh = (tokens.input + tokens.cache_creation) as f64;
        (fresh * self.input
            + tokens.cache_read as f64 * self.cached_input
            + tokens.output as f64 * self.output)
            / 1_000_000.0
    }
}
