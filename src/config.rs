use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct EllaSiteConfig {
    pub database_url: String,
    pub template_dir: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Keys the security hash carried between the question preview and confirmation.
    pub secret_key: String,

    pub site: SiteConfig,

    #[serde(default)]
    pub upgrade: UpgradeConfig,
}

#[derive(Debug, Deserialize)]
pub struct SiteConfig {
    pub site_name: String,
    #[serde(default = "default_menu_items")]
    pub menu_items: Vec<(String, String)>,
}

/// Settings for the article to publishable upgrade.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    pub app_label: String,
    pub model: String,
    pub description_column: String,
    pub remap_generic_relations: bool,
    /// Refused at run time: the upgrade fails with `UnsupportedStage`.
    pub remap_placements: bool,
    pub backup_path: Option<String>,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            app_label: "articles".into(),
            model: "article".into(),
            description_column: "perex".into(),
            remap_generic_relations: false,
            remap_placements: false,
            backup_path: None,
        }
    }
}

impl EllaSiteConfig {
    pub fn from_str(data: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(data)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {:?}", path))?;
        Self::from_str(&data).with_context(|| format!("parsing config file {:?}", path))
    }
}

fn default_listen_addr() -> String {
    crate::DEFAULT_LISTEN_ADDR.into()
}

fn default_menu_items() -> Vec<(String, String)> {
    crate::MENU_ITEMS
        .iter()
        .map(|(name, url)| (name.to_string(), url.to_string()))
        .collect()
}
