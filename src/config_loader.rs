use std::fs::File;
use std::path::Path;
use std::time::Duration;

use color_eyre::eyre::{Context, Result};
use log::info;

use crate::config::RunConfig;

/// Load and parse a run configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<RunConfig> {
    info!("Loading configuration from: {:?}", config_path);

    // Open the configuration file
    let file = File::open(config_path)
        .with_context(|| format!("Failed to open configuration: {}", config_path.display()))?;

    // Parse the YAML content
    let config: RunConfig = serde_yaml::from_reader(file)
        .with_context(|| format!("Failed to parse configuration: {}", config_path.display()))?;

    // Validate the configuration
    config.validate()?;

    Ok(config)
}

/// CLI arguments that can override YAML settings
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub seed: Option<u64>,
    pub safety_period: Option<Duration>,
    pub attackers: Vec<String>,
}

/// Apply CLI overrides to a run configuration
pub fn apply_overrides(config: &mut RunConfig, overrides: &CliOverrides) -> Result<()> {
    // Apply seed override
    if let Some(seed) = overrides.seed {
        info!("Overriding seed: {} -> {}", config.general.seed, seed);
        config.general.seed = seed;
    }

    // Apply safety period override; the safety factor still scales it
    if let Some(period) = overrides.safety_period {
        info!("Overriding safety period: {:?}", period);
        config.general.safety_period = Some(period);
    }

    // Replace the attacker list wholesale rather than appending
    if !overrides.attackers.is_empty() {
        info!("Overriding attackers: {}", overrides.attackers.join(", "));
        config.attackers = overrides.attackers.clone();
    }

    // Re-validate after applying overrides
    config.validate()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
general:
  algorithm: protectionless
  seed: 1
topology:
  kind: line
  network_size: 6
  distance: 10.0
sink_ids: [0]
source_ids: [5]
"#;

    #[test]
    fn test_load_config() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", YAML).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.general.seed, 1);
        assert_eq!(config.network().unwrap().size(), 6);
    }

    #[test]
    fn test_load_config_rejects_bad_roles() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", YAML.replace("[5]", "[6]")).unwrap();

        assert!(load_config(temp_file.path()).is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", YAML).unwrap();
        let mut config = load_config(temp_file.path()).unwrap();

        let overrides = CliOverrides {
            seed: Some(99),
            safety_period: Some(Duration::from_secs(30)),
            attackers: vec!["BasicReactiveAttacker()".to_string()],
        };
        apply_overrides(&mut config, &overrides).unwrap();

        assert_eq!(config.general.seed, 99);
        assert_eq!(config.general.safety_period, Some(Duration::from_secs(30)));
        assert_eq!(config.attackers, vec!["BasicReactiveAttacker()".to_string()]);

        let bad = CliOverrides {
            attackers: vec!["Nope()".to_string()],
            ..Default::default()
        };
        assert!(apply_overrides(&mut config, &bad).is_err());
    }
}
