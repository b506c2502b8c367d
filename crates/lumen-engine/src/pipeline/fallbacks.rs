use std::collections::BTreeMap;

use lumen_shader::defines::split_define;

/// Strategy for retrying a failed compilation with fewer features.
pub trait FallbackChain {
    fn has_more_fallbacks(&self) -> bool;

    /// Returns a reduced copy of `defines` and advances the chain.
    fn reduce(&mut self, defines: &[String]) -> Vec<String>;
}

/// Defines grouped by rank; each `reduce` drops the lowest remaining rank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectFallbacks {
    ranks: BTreeMap<u32, Vec<String>>,
}

impl EffectFallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes `define` when rank `rank` is reached.
    pub fn add_fallback(&mut self, rank: u32, define: impl Into<String>) -> &mut Self {
        self.ranks.entry(rank).or_default().push(define.into());
        self
    }

    pub fn remaining_ranks(&self) -> usize {
        self.ranks.len()
    }

    pub fn unbind(&mut self) {
        self.ranks.clear();
    }
}

fn define_name(entry: &str) -> Option<String> {
    split_define(entry).map(|(name, _)| name)
}

impl FallbackChain for EffectFallbacks {
    fn has_more_fallbacks(&self) -> bool {
        !self.ranks.is_empty()
    }

    fn reduce(&mut self, defines: &[String]) -> Vec<String> {
        let Some((_, dropped)) = self.ranks.pop_first() else {
            return defines.to_vec();
        };
        let dropped: Vec<String> = dropped.iter().filter_map(|d| define_name(d)).collect();
        defines
            .iter()
            .filter(|d| define_name(d).is_none_or(|name| !dropped.contains(&name)))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn lowest_rank_goes_first() {
        let mut f = EffectFallbacks::new();
        f.add_fallback(1, "SHADOWS").add_fallback(0, "FOG").add_fallback(0, "BUMP");

        let d = list(&["FOG", "BUMP", "SHADOWS", "NUM_LIGHTS 4"]);
        let d = f.reduce(&d);
        assert_eq!(d, list(&["SHADOWS", "NUM_LIGHTS 4"]));
        assert!(f.has_more_fallbacks());

        let d = f.reduce(&d);
        assert_eq!(d, list(&["NUM_LIGHTS 4"]));
        assert!(!f.has_more_fallbacks());
        assert_eq!(f.reduce(&d), d);
    }

    #[test]
    fn matches_by_name_not_value() {
        let mut f = EffectFallbacks::new();
        f.add_fallback(0, "#define LIGHTS");
        assert_eq!(f.reduce(&list(&["LIGHTS 3", "LIGHTS_X"])), list(&["LIGHTS_X"]));
    }
}
