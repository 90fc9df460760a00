use std::{fs::File, path::Path};

use serde::Deserialize;

use crate::error::SimError;

/// Sizes of the simulated machine. Every field has a default, so a config file
/// only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub arch_reg_count: u16,
    pub phys_reg_count: u16,
    pub rob_capacity: usize,
    pub issue_queue_capacity: usize,
    pub lsq_capacity: usize,
    pub memory_size: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            arch_reg_count: 24,
            phys_reg_count: 24,
            rob_capacity: 12,
            issue_queue_capacity: 8,
            lsq_capacity: 8,
            memory_size: 4096,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        let sizes = [
            ("arch_reg_count", usize::from(self.arch_reg_count)),
            ("phys_reg_count", usize::from(self.phys_reg_count)),
            ("rob_capacity", self.rob_capacity),
            ("issue_queue_capacity", self.issue_queue_capacity),
            ("lsq_capacity", self.lsq_capacity),
            ("memory_size", self.memory_size),
        ];

        match sizes.iter().find(|(_, size)| *size == 0) {
            Some((name, _)) => Err(SimError::InvalidConfig(format!("{name} must be non-zero"))),
            None => Ok(()),
        }
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<SimConfig, SimError> {
    let file = File::open(path)?;
    let config: SimConfig = serde_yaml::from_reader(file)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml() {
        let config: SimConfig = serde_yaml::from_str("rob_capacity: 4\nphys_reg_count: 30\n")
            .expect("valid yaml");

        assert_eq!(config.rob_capacity, 4);
        assert_eq!(config.phys_reg_count, 30);
        assert_eq!(config.issue_queue_capacity, 8);
        assert_eq!(config.memory_size, 4096);
    }

    #[test]
    fn test_zero_size_rejected() {
        let config = SimConfig {
            lsq_capacity: 0,
            ..Default::default()
        };

        assert!(matches!(config.validate(), Err(SimError::InvalidConfig(_))));
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_shipped_config() {
        let config = load_config("sim.yaml").expect("sim.yaml should load");
        assert_eq!(config, SimConfig::default());
    }
}
