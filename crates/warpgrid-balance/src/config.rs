//! Balancer configuration parser.
//!
//! ```toml
//! strategy = "weighted_random"
//!
//! [tag_selector]
//! tag = "region"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::balancer::Balancer;
use crate::error::{BalanceResult, ConfigError};
use crate::round_robin::RoundRobinBalancer;
use crate::tag_selector::{TagFn, TagSelectorBalancer};
use crate::weighted_random::WeightedRandomBalancer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    WeightedRandom,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancerConfig {
    #[serde(default)]
    pub strategy: Strategy,
    pub tag_selector: Option<TagSelectorConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSelectorConfig {
    /// Instance tag to group by.
    pub tag: String,
}

impl BalancerConfig {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: BalancerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.tag_selector {
            Some(ts) if ts.tag.is_empty() => Err(ConfigError::EmptyTag),
            _ => Ok(()),
        }
    }

    /// Assemble the configured balancer.
    ///
    /// `tag_fn` is required when a tag selector is configured and ignored
    /// otherwise.
    pub fn build<R: 'static>(
        &self,
        tag_fn: Option<TagFn<R>>,
    ) -> BalanceResult<Arc<dyn Balancer<R>>> {
        self.validate()?;
        let base: Arc<dyn Balancer<R>> = match self.strategy {
            Strategy::RoundRobin => Arc::new(RoundRobinBalancer::new()),
            Strategy::WeightedRandom => Arc::new(WeightedRandomBalancer::new()),
        };

        let Some(ts) = &self.tag_selector else {
            debug!(balancer = %base.name(), "built balancer");
            return Ok(base);
        };
        let tag_fn = tag_fn.ok_or_else(|| ConfigError::MissingTagFn(ts.tag.clone()))?;
        let balancer = TagSelectorBalancer::new(ts.tag.clone(), tag_fn, base);
        debug!(balancer = %balancer.name(), tag = %ts.tag, "built balancer");
        Ok(Arc::new(balancer))
    }
}
