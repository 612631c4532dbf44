use anyhow::{bail, Context};
use skyrelay_core::{Config, DeviceSn, WorkspaceId};
use std::env;

/// Process configuration assembled from the environment
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    /// Endpoint of the MQTT bridge accepting `{topic, payload}` publications
    pub bridge_url: String,
    pub core: Config,
    pub workspace_bindings: Vec<(DeviceSn, WorkspaceId)>,
}

impl ServiceConfig {
    pub const DEFAULT_PORT: u16 = 8090;
    pub const DEFAULT_BRIDGE_URL: &'static str = "http://127.0.0.1:8091/publish";

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match lookup("PORT") {
            Some(port) => port.parse().with_context(|| format!("invalid PORT {port:?}"))?,
            None => Self::DEFAULT_PORT,
        };

        let core = match lookup("SKYRELAY_CONFIG") {
            Some(path) => Config::from_file(&path)
                .with_context(|| format!("failed to load config from {path}"))?,
            None => Config::default(),
        };
        core.validate()?;

        let workspace_bindings = match lookup("WORKSPACE_BINDINGS") {
            Some(raw) => parse_bindings(&raw)?,
            None => Vec::new(),
        };

        Ok(ServiceConfig {
            port,
            bridge_url: lookup("BRIDGE_URL").unwrap_or_else(|| Self::DEFAULT_BRIDGE_URL.to_string()),
            core,
            workspace_bindings,
        })
    }
}

/// Parse `sn=workspace` pairs separated by commas
fn parse_bindings(raw: &str) -> anyhow::Result<Vec<(DeviceSn, WorkspaceId)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let Some((sn, workspace)) = pair.split_once('=') else {
                bail!("workspace binding {pair:?} is not sn=workspace");
            };
            let (sn, workspace) = (sn.trim(), workspace.trim());
            if sn.is_empty() || workspace.is_empty() {
                bail!("workspace binding {pair:?} has an empty side");
            }
            Ok((DeviceSn::new(sn), WorkspaceId::new(workspace)))
        })
        .collect()
}
