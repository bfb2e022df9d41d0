use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub metrics: MetricsExporter,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsExporter {
    #[serde(default)]
    pub enabled: bool,
    pub listen: String,
    #[serde(default = "default_scrape_path")]
    pub scrape_path: String,
}

fn default_scrape_path() -> String {
    "/metrics".to_string()
}
