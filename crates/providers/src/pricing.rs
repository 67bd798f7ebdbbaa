//! Static per-model price table ($ per million tokens).
//!
//! The table doubles as the gateway's model allowlist: configuring a model
//! with no pricing entry is rejected and clears prior configuration.

/// Pricing per million tokens for a specific model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    /// Dollars per 1 million input (prompt) tokens.
    pub input_per_1m: f64,
    /// Dollars per 1 million output (completion) tokens.
    pub output_per_1m: f64,
}

impl ModelPricing {
    /// Estimated cost in USD for the given token counts.
    pub fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_per_1m + output_tokens as f64 * self.output_per_1m)
            / 1_000_000.0
    }
}

/// Known models. Keys are prefixes so dated releases resolve to their
/// family entry; longest prefix wins.
const PRICE_TABLE: &[(&str, ModelPricing)] = &[
    // Anthropic
    ("claude-opus-4", ModelPricing { input_per_1m: 15.0, output_per_1m: 75.0 }),
    ("claude-sonnet-4", ModelPricing { input_per_1m: 3.0, output_per_1m: 15.0 }),
    ("claude-3-7-sonnet", ModelPricing { input_per_1m: 3.0, output_per_1m: 15.0 }),
    ("claude-3-5-sonnet", ModelPricing { input_per_1m: 3.0, output_per_1m: 15.0 }),
    ("claude-3-5-haiku", ModelPricing { input_per_1m: 0.8, output_per_1m: 4.0 }),
    ("claude-3-haiku", ModelPricing { input_per_1m: 0.25, output_per_1m: 1.25 }),
    // OpenAI
    ("gpt-4.1-nano", ModelPricing { input_per_1m: 0.1, output_per_1m: 0.4 }),
    ("gpt-4.1-mini", ModelPricing { input_per_1m: 0.4, output_per_1m: 1.6 }),
    ("gpt-4.1", ModelPricing { input_per_1m: 2.0, output_per_1m: 8.0 }),
    ("gpt-4o-mini", ModelPricing { input_per_1m: 0.15, output_per_1m: 0.6 }),
    ("gpt-4o", ModelPricing { input_per_1m: 2.5, output_per_1m: 10.0 }),
    ("o4-mini", ModelPricing { input_per_1m: 1.1, output_per_1m: 4.4 }),
    // Google
    ("gemini-2.5-pro", ModelPricing { input_per_1m: 1.25, output_per_1m: 10.0 }),
    ("gemini-2.5-flash", ModelPricing { input_per_1m: 0.3, output_per_1m: 2.5 }),
    ("gemini-2.0-flash-lite", ModelPricing { input_per_1m: 0.075, output_per_1m: 0.3 }),
    ("gemini-2.0-flash", ModelPricing { input_per_1m: 0.1, output_per_1m: 0.4 }),
    ("gemini-1.5-pro", ModelPricing { input_per_1m: 1.25, output_per_1m: 5.0 }),
    ("gemini-1.5-flash", ModelPricing { input_per_1m: 0.075, output_per_1m: 0.3 }),
];

/// Look up pricing for a model id. Longest matching prefix wins, so
/// `claude-sonnet-4-20250514` resolves to the `claude-sonnet-4` entry.
pub fn pricing_for(model: &str) -> Option<ModelPricing> {
    PRICE_TABLE
        .iter()
        .filter(|(prefix, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, pricing)| *pricing)
}

/// Whether the model appears in the price table.
pub fn known_model(model: &str) -> bool {
    pricing_for(model).is_some()
}
