//! Provider ordering strategies.

use crate::provider::ProviderInfo;

/// Orders registered providers into a fallback chain.
///
/// Input arrives in registration order. Implementations must be stable so
/// equal-ranked providers keep that order.
pub trait ProviderSelector: Send + Sync {
    /// Returns provider names in the order they should be tried.
    fn select(&self, providers: &[ProviderInfo]) -> Vec<String>;
}

/// Highest priority first.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrioritySelector;

impl ProviderSelector for PrioritySelector {
    fn select(&self, providers: &[ProviderInfo]) -> Vec<String> {
        let mut ordered: Vec<&ProviderInfo> = providers.iter().collect();
        ordered.sort_by(|left, right| right.priority.cmp(&left.priority));
        ordered.into_iter().map(|info| info.name.clone()).collect()
    }
}

/// Heaviest weight first. Deterministic, no sampling.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedSelector;

impl ProviderSelector for WeightedSelector {
    fn select(&self, providers: &[ProviderInfo]) -> Vec<String> {
        let mut ordered: Vec<&ProviderInfo> = providers.iter().collect();
        ordered.sort_by(|left, right| right.weight.cmp(&left.weight));
        ordered.into_iter().map(|info| info.name.clone()).collect()
    }
}
