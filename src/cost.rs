//! Per-call cost reporting from token usage

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rates for one model, in USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn input_rate_per_token(&self) -> f64 {
        self.input_per_million / 1_000_000.0
    }

    pub fn output_rate_per_token(&self) -> f64 {
        self.output_per_million / 1_000_000.0
    }
}

/// Rate table keyed by model identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Rates used for models missing from `models`
    #[serde(default = "default_pricing_model")]
    pub default_model: String,

    #[serde(default = "default_pricing_table")]
    pub models: HashMap<String, ModelPricing>,
}

fn default_pricing_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_pricing_table() -> HashMap<String, ModelPricing> {
    HashMap::from([
        ("gpt-4o-mini".to_string(), ModelPricing::new(0.15, 0.60)),
        ("gpt-4o".to_string(), ModelPricing::new(2.50, 10.00)),
        ("gpt-4-turbo".to_string(), ModelPricing::new(10.00, 30.00)),
    ])
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            default_model: default_pricing_model(),
            models: default_pricing_table(),
        }
    }
}

/// Cost of one call, each figure rounded to 6 decimal places
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

/// Cost calculator over a rate table
#[derive(Debug, Clone, Default)]
pub struct CostCalculator {
    config: PricingConfig,
}

impl CostCalculator {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    /// Rates for `model`, or the default model's rates
    pub fn pricing_for(&self, model: &str) -> Option<ModelPricing> {
        self.config
            .models
            .get(model)
            .or_else(|| self.config.models.get(&self.config.default_model))
            .copied()
    }

    pub fn calculate(&self, input_tokens: usize, output_tokens: usize, model: &str) -> CostBreakdown {
        let Some(pricing) = self.pricing_for(model) else {
            return CostBreakdown::default();
        };

        let input_cost = input_tokens as f64 * pricing.input_rate_per_token();
        let output_cost = output_tokens as f64 * pricing.output_rate_per_token();

        CostBreakdown {
            input_cost: round6(input_cost),
            output_cost: round6(output_cost),
            total_cost: round6(input_cost + output_cost),
        }
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_costs() {
        let calculator = CostCalculator::default();
        let costs = calculator.calculate(1_000_000, 1_000_000, "gpt-4o-mini");
        assert_eq!(costs.input_cost, 0.15);
        assert_eq!(costs.output_cost, 0.6);
        assert_eq!(costs.total_cost, 0.75);
    }

    #[test]
    fn test_rounding_to_six_places() {
        let calculator = CostCalculator::default();
        // 1234 * 0.15e-6 = 0.0001851
        let costs = calculator.calculate(1234, 0, "gpt-4o-mini");
        assert_eq!(costs.input_cost, 0.000185);
        assert_eq!(costs.output_cost, 0.0);
    }

    #[test]
    fn test_unknown_model_uses_default_rates() {
        let calculator = CostCalculator::default();
        let known = calculator.calculate(5000, 700, "gpt-4o-mini");
        let unknown = calculator.calculate(5000, 700, "some-future-model");
        assert_eq!(known, unknown);
    }

    #[test]
    fn test_larger_model_costs_more() {
        let calculator = CostCalculator::default();
        let mini = calculator.calculate(10_000, 1_000, "gpt-4o-mini");
        let full = calculator.calculate(10_000, 1_000, "gpt-4o");
        assert_eq!(full.input_cost, 0.025);
        assert_eq!(full.output_cost, 0.01);
        assert!(full.total_cost > mini.total_cost);
    }

    #[test]
    fn test_empty_table_yields_zero() {
        let calculator = CostCalculator::new(PricingConfig {
            default_model: "none".to_string(),
            models: HashMap::new(),
        });
        assert_eq!(calculator.calculate(10, 10, "gpt-4o"), CostBreakdown::default());
    }
}
