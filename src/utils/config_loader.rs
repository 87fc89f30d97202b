use std::path::Path;

use anyhow::{anyhow, Result};

use crate::config::proc_loader::{file_to_callee_config, file_to_config};
use crate::config::service::{CalleeServiceConfig, ServiceConfig};

pub async fn run(config_path: &str) -> Result<ServiceConfig> {
    let path = Path::new(config_path);
    file_to_config(path)
        .await
        .map_err(|e| anyhow!("Invalid config {}: {}", config_path, e))
}

pub async fn run_callee(config_path: &str) -> Result<CalleeServiceConfig> {
    let path = Path::new(config_path);
    file_to_callee_config(path)
        .await
        .map_err(|e| anyhow!("Invalid callee config {}: {}", config_path, e))
}
