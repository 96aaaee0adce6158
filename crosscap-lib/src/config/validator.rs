use crate::config::types::MatchConfig;
use crate::error::{CrosscapError, Result};

pub fn validate(config: &MatchConfig) -> Result<()> {
    if !(0.0..=1.0).contains(&config.score_threshold) {
        return Err(CrosscapError::Config(format!(
            "score_threshold must be within [0.0, 1.0], got {}",
            config.score_threshold
        )));
    }
    if config.sampling.rate <= 0.0 || config.sampling.rate > 1.0 {
        return Err(CrosscapError::Config(format!(
            "sampling.rate must be within (0.0, 1.0], got {}",
            config.sampling.rate
        )));
    }
    if config.sampling.threshold == 0 {
        return Err(CrosscapError::Config(
            "sampling.threshold must be positive".into(),
        ));
    }
    Ok(())
}
