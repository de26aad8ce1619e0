//! The "quick access" catalog of self-hosted services shown on the dashboard.

use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use url::Url;

/// A link tile on the dashboard pointing at another self-hosted service.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Getters, TypedBuilder,
)]
#[serde(rename_all = "camelCase")]
#[getset(get = "pub")]
pub struct QuickAccessApp {
    #[builder(setter(into))]
    name: String,
    #[builder(setter(into))]
    url: String,
    /// `config` lowercases keys read from files, hence the alias.
    #[serde(alias = "iconurl")]
    #[builder(setter(into))]
    icon_url: String,
    #[builder(setter(into))]
    description: String,
    /// Tailwind classes used by the frontend for the tile background.
    #[builder(setter(into))]
    color: String,
}

impl QuickAccessApp {
    /// Parses the link target, rejecting anything that is not an absolute URL.
    pub fn parsed_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.url)
    }
}

/// The services a fresh install links to.
pub fn default_apps() -> Vec<QuickAccessApp> {
    vec![
        QuickAccessApp::builder()
            .name("Immich")
            .url("http://localhost:2283")
            .icon_url("https://raw.githubusercontent.com/immich-app/immich/3d35e65f270724c7f3923a2052294670eecff9a8/design/immich-logo.svg")
            .description("Self-hosted photo and video backup solution")
            .color("bg-blue-500 hover:bg-blue-600")
            .build(),
        QuickAccessApp::builder()
            .name("Jellyfin")
            .url("http://localhost:8096")
            .icon_url("https://raw.githubusercontent.com/jellyfin/jellyfin-ux/master/branding/SVG/icon-transparent.svg")
            .description("Free software media system")
            .color("bg-purple-500 hover:bg-purple-600")
            .build(),
        QuickAccessApp::builder()
            .name("Portainer")
            .url("http://localhost:9000")
            .icon_url("https://raw.githubusercontent.com/portainer/portainer/develop/app/assets/ico/favicon.svg")
            .description("Container management platform")
            .color("bg-teal-500 hover:bg-teal-600")
            .build(),
        QuickAccessApp::builder()
            .name("Grafana")
            .url("http://localhost:3000")
            .icon_url("https://raw.githubusercontent.com/grafana/grafana/main/public/img/grafana_icon.svg")
            .description("Analytics and monitoring platform")
            .color("bg-orange-500 hover:bg-orange-600")
            .build(),
        QuickAccessApp::builder()
            .name("Nextcloud")
            .url("http://localhost:8080")
            .icon_url("https://raw.githubusercontent.com/nextcloud/server/master/core/img/logo/logo.svg")
            .description("Self-hosted productivity platform")
            .color("bg-green-500 hover:bg-green-600")
            .build(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_links_parse() {
        let apps = default_apps();
        assert_eq!(apps.len(), 5);
        for app in &apps {
            let url = app.parsed_url().expect("default app url should parse");
            assert_eq!(url.host_str(), Some("localhost"));
        }
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let app = &default_apps()[1];
        let json = serde_json::to_value(app).unwrap();
        assert_eq!(json["name"], "Jellyfin");
        assert_eq!(json["url"], "http://localhost:8096");
        assert!(json.get("iconUrl").is_some());
        assert!(json.get("icon_url").is_none());
    }
}
