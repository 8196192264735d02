//! Shared setup for coordinator integration tests

#![allow(dead_code)]

use tempfile::TempDir;
use tonewiki_refdata::{RefDataConfig, RefreshCoordinator};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const GENRE_PAGE: &str = "\
# Folk music

Genre: Ambient Folk — characteristics: soft, acoustic, introspective; instruments: acoustic guitar, field recordings

## Indie Folk
- Freak Folk: psychedelic, experimental
";

pub const TAG_PAGE: &str = "\
## Structure Tags
- [Verse] — main narrative section; example: [Verse 1]
- [Chorus] — repeated hook
## Vocal Tags
- [Whispered] — soft, breathy delivery
";

pub const TECHNIQUE_PAGE: &str = "\
## Vocal Techniques
- Double Tracking — record the same part twice; use: thickening vocals
## Guitar Techniques
- Palm Muting — damped strings
";

/// Config pointing at a temp storage root with fast retries
pub fn test_config(dir: &TempDir) -> RefDataConfig {
    let mut config = RefDataConfig::default();
    config.local_storage_path = dir.path().to_path_buf();
    config.max_retries = 0;
    config.retry_base_delay_ms = 1;
    config.request_timeout_seconds = 5;
    config.refresh_timeout_seconds = 10;
    config
}

pub async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

pub fn url(server: &MockServer, route: &str) -> String {
    format!("{}{}", server.uri(), route)
}

/// Coordinator with one mocked source per data type
pub async fn coordinator_with_all_sources(dir: &TempDir, server: &MockServer) -> RefreshCoordinator {
    mount_page(server, "/genres", GENRE_PAGE).await;
    mount_page(server, "/tags", TAG_PAGE).await;
    mount_page(server, "/techniques", TECHNIQUE_PAGE).await;

    let mut config = test_config(dir);
    config.sources.genre = vec![url(server, "/genres")];
    config.sources.meta_tag = vec![url(server, "/tags")];
    config.sources.technique = vec![url(server, "/techniques")];
    RefreshCoordinator::initialize(config).await.unwrap()
}
