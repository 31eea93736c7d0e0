use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config;
use crate::data::{DemoStoryService, StoryService};
use crate::station;
use crate::telemetry;
use crate::ui;

pub fn run(demo: bool) -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;

    if let Err(err) = telemetry::init(&cfg.log) {
        eprintln!("warning: logging disabled: {err:#}");
    }
    tracing::info!(
        config = %friendly_path(config::default_path().as_ref()),
        base_url = %cfg.api.base_url,
        demo,
        "starting"
    );

    let (service, source_label): (Arc<dyn StoryService>, String) = if demo {
        let demo_service: Arc<dyn StoryService> = Arc::new(DemoStoryService::new());
        (demo_service, "the built-in demo feed".into())
    } else {
        let user_agent = if cfg.api.user_agent.trim().is_empty() {
            station::ClientConfig::default().user_agent
        } else {
            cfg.api.user_agent.clone()
        };
        let client = station::Client::new(station::ClientConfig {
            base_url: cfg.api.base_url.clone(),
            user_agent,
            timeout: cfg.api.timeout,
            http_client: None,
        })
        .context("create station client")?;
        let http_service: Arc<dyn StoryService> = Arc::new(client);
        (http_service, cfg.api.base_url.clone())
    };

    let options = ui::Options {
        service,
        source_label,
        topics: cfg.ui.topics.clone(),
        default_sort: cfg.ui.default_sort,
        page_size: cfg.api.page_size,
        orphan_policy: cfg.navigation.orphan_policy,
        focus_delay: cfg.navigation.focus_delay,
    };

    let result = ui::Model::new(options).run();
    if let Err(err) = &result {
        tracing::error!(error = %format!("{err:#}"), "terminal session ended with an error");
    }
    result
}

fn friendly_path(path: Option<&PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "(unavailable)".to_string()
    }
}
