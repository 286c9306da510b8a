// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates deploy-pipeline.yml template files.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{ImageRef, ServiceName};

use super::{CONFIG_FILENAME, PipelineConfig};

pub fn init_config(
    dir: &Path,
    service: Option<&str>,
    image: Option<&str>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = PipelineConfig::template()?;

    if let Some(s) = service {
        config.service = ServiceName::new(s).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    if let Some(i) = image {
        config.image = ImageRef::parse(i).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    let yaml = generate_template_yaml(&config);
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(config: &PipelineConfig) -> String {
    format!(
        r#"cluster: {}
service: {}
image: {}
desired_count: {}
timeout_seconds: {}
poll_interval_seconds: {}

# registry:
#   credentials:
#     username: {{ env: REGISTRY_USER }}
#     password: {{ env: REGISTRY_TOKEN }}
#   retry:
#     max_attempts: 3
#     initial_backoff: 2s

# resources:
#   memory: 512m
#   cpus: "0.5"

# env:
#   LOG_LEVEL: info
"#,
        config.cluster,
        config.service,
        config.image,
        config.desired_count,
        config.timeout_seconds,
        config.poll_interval_seconds,
    )
}
