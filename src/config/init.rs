// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates convoy.yml template files.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{ImageRef, ServiceName};

use super::{CONFIG_FILENAME, Config};

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

    let mut config = Config::template()?;

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

fn generate_template_yaml(config: &Config) -> String {
    format!(
        r#"service: {}
image: {}

environments:
  dev:
    desired_count: 1
    cpu: 256
    memory: 512
    network_policy: public
    variables:
      LOG_LEVEL: debug
  staging:
    desired_count: 2
    cpu: 256
    memory: 512
  prod:
    desired_count: 2
    cpu: 512
    memory: 1024
    network_policy: public
    # Production always waits for `convoy approve --env prod`.
    # secrets:
    #   DATABASE_URL: {{ env: PROD_DATABASE_URL }}

triggers:
  develop: dev
  main: staging
  "release/*": prod

promotion:
  order: [dev, staging, prod]
  auto: false

timeouts:
  provision: 10m
  verify: 5m
  approval: 30m

# health:
#   poll_interval: 10s
#   healthy_threshold: 2

# Webhook and health_url endpoints must be plain http:// URLs; https is not supported.
# alerts:
#   webhook: http://alerts.internal/convoy
#   hooks: true
"#,
        config.service,
        config.image.repository(),
    )
}
