//! # config: read runtime settings from environment variables
//!
//! | Variable                | Default                 |
//! |-------------------------|-------------------------|
//! | `BIND_ADDR`             | `0.0.0.0:3000`          |
//! | `BACKEND_URL`           | `http://localhost:8000` |
//! | `VIEWS`                 | `vcp,flow,macro`        |
//! | `REFRESH_INTERVAL_SECS` | `300`                   |
//! | `PRICE_INTERVAL_SECS`   | `30`                    |
//! | `PROBE_INTERVAL_SECS`   | `60`                    |
//! | `CHART_BAR_LIMIT`       | `200`                   |
//! | `FETCH_TIMEOUT_SECS`    | unset (no timeout)      |
//! | `VIEW_<NAME>_KEYS`      | `<name>`                |

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::client::DEFAULT_BACKEND_URL;
use crate::view::ViewConfig;

#[derive(Debug, Clone)]
pub struct DeckConfig {
    pub bind_addr:   SocketAddr,
    /// Base URL of the analytics backend.
    pub backend_url: String,
    pub views:       Vec<ViewConfig>,
}

impl DeckConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`DeckConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind_addr: SocketAddr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .context("BIND_ADDR must be a socket address")?;

        let backend_url = lookup("BACKEND_URL").unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

        let refresh_interval = seconds(&lookup, "REFRESH_INTERVAL_SECS", 300)?;
        let price_interval   = seconds(&lookup, "PRICE_INTERVAL_SECS", 30)?;
        let probe_interval   = seconds(&lookup, "PROBE_INTERVAL_SECS", 60)?;

        let chart_bar_limit: usize = lookup("CHART_BAR_LIMIT")
            .unwrap_or_else(|| "200".to_string())
            .parse()
            .context("CHART_BAR_LIMIT must be a number")?;

        let fetch_timeout = match lookup("FETCH_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(
                raw.parse().context("FETCH_TIMEOUT_SECS must be a number")?,
            )),
            None => None,
        };

        let names: Vec<String> = lookup("VIEWS")
            .unwrap_or_else(|| "vcp,flow,macro".to_string())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        if names.is_empty() {
            bail!("VIEWS must name at least one view");
        }

        let views = names
            .into_iter()
            .map(|name| {
                let resource_keys = lookup(&format!("VIEW_{}_KEYS", name.to_uppercase()))
                    .map(|raw| {
                        raw.split(',')
                            .map(|k| k.trim().to_string())
                            .filter(|k| !k.is_empty())
                            .collect::<Vec<_>>()
                    })
                    .filter(|keys| !keys.is_empty())
                    .unwrap_or_else(|| vec![name.clone()]);

                ViewConfig {
                    name,
                    resource_keys,
                    refresh_interval,
                    price_interval,
                    probe_interval,
                    chart_bar_limit,
                    fetch_timeout,
                }
            })
            .collect();

        Ok(Self {
            bind_addr,
            backend_url,
            views,
        })
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
) -> anyhow::Result<Duration> {
    let secs: u64 = match lookup(name) {
        Some(raw) => raw.parse().with_context(|| format!("{name} must be a number"))?,
        None => default,
    };
    if secs == 0 {
        bail!("{name} must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<DeckConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DeckConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr.port(), 3000);
        assert_eq!(cfg.backend_url, "http://localhost:8000");
        assert_eq!(cfg.views.len(), 3);

        let vcp = &cfg.views[0];
        assert_eq!(vcp.name, "vcp");
        assert_eq!(vcp.resource_keys, vec!["vcp".to_string()]);
        assert_eq!(vcp.refresh_interval, Duration::from_secs(300));
        assert_eq!(vcp.price_interval, Duration::from_secs(30));
        assert_eq!(vcp.probe_interval, Duration::from_secs(60));
        assert_eq!(vcp.chart_bar_limit, 200);
        assert_eq!(vcp.fetch_timeout, None);
    }

    #[test]
    fn test_view_key_override() {
        let cfg = config(&[
            ("VIEWS", "Flow, macro"),
            ("VIEW_FLOW_KEYS", "flow_signals, flow_prices"),
            ("FETCH_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(cfg.views[0].name, "flow");
        assert_eq!(cfg.views[0].resource_keys, vec!["flow_signals", "flow_prices"]);
        assert_eq!(cfg.views[1].resource_keys, vec!["macro"]);
        assert_eq!(cfg.views[0].fetch_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(config(&[("PRICE_INTERVAL_SECS", "0")]).is_err());
        assert!(config(&[("CHART_BAR_LIMIT", "lots")]).is_err());
        assert!(config(&[("VIEWS", " , ")]).is_err());
        assert!(config(&[("BIND_ADDR", "nowhere")]).is_err());
    }
}
