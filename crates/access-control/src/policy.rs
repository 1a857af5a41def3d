use std::time::Duration;

use graceguard_core::config::Config;
use graceguard_core::error::GraceGuardError;
use hosts_store::{normalize_selectors, SelectorMatcher};

/// Effective policy derived from configuration.
#[derive(Debug, Clone)]
pub struct GracePolicy {
    /// Every selector blocked at startup, guarded ones included.
    pub managed_selectors: Vec<String>,
    pub guarded_selectors: Vec<String>,
    pub matcher: SelectorMatcher,
    pub grace_duration: Duration,
    pub max_activations: u32,
    pub window_duration: time::Duration,
}

impl GracePolicy {
    pub fn from_config(config: &Config) -> Result<Self, GraceGuardError> {
        config.validate()?;

        let guarded_selectors = normalize_selectors(&config.grace.guarded_domains);
        let mut all = config.blocklist.domains.clone();
        all.extend(guarded_selectors.iter().cloned());
        let managed_selectors = normalize_selectors(&all);

        let out_of_range =
            |field: &str| GraceGuardError::InvalidConfig(format!("{field} is out of range"));
        let grace_secs = config
            .grace
            .duration_minutes
            .checked_mul(60)
            .ok_or_else(|| out_of_range("grace.duration_minutes"))?;
        let window_duration = i64::try_from(config.grace.window_hours)
            .ok()
            .and_then(|hours| hours.checked_mul(3600))
            .map(time::Duration::seconds)
            .ok_or_else(|| out_of_range("grace.window_hours"))?;

        Ok(Self {
            managed_selectors,
            guarded_selectors,
            matcher: SelectorMatcher::new(&config.grace.match_patterns),
            grace_duration: Duration::from_secs(grace_secs),
            max_activations: config.grace.max_activations,
            window_duration,
        })
    }

    pub fn grace_minutes(&self) -> u64 {
        self.grace_duration.as_secs() / 60
    }

    pub fn window_hours(&self) -> i64 {
        self.window_duration.whole_hours()
    }
}
