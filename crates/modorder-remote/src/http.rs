use crate::{ManifestSource, RemoteConfig, RemoteError};
use std::io::Read;

/// Upper bound on a remote manifest body.
const MAX_MANIFEST_BYTES: u64 = 1024 * 1024;

/// HTTP(S) manifest source.
///
/// Every request is bounded by the configured global timeout so a stalled
/// server cannot leave a version check downloading forever.
pub struct HttpSource {
    config: RemoteConfig,
    agent: ureq::Agent,
}

impl HttpSource {
    pub fn new(config: RemoteConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .build();
        let agent = ureq::Agent::new_with_config(agent_config);
        Self { config, agent }
    }

    fn do_get(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        let req = self
            .agent
            .get(url)
            .header("User-Agent", &self.config.user_agent)
            .header("Accept", "application/toml, text/plain, */*");
        let resp = match req.call() {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(404)) => {
                return Err(RemoteError::NotFound(url.to_owned()));
            }
            Err(ureq::Error::StatusCode(code)) => {
                return Err(RemoteError::Http(format!("HTTP {code} for {url}")));
            }
            Err(ureq::Error::Timeout(_)) => {
                return Err(RemoteError::Timeout(url.to_owned()));
            }
            Err(e) => {
                return Err(RemoteError::Http(e.to_string()));
            }
        };

        let code = resp.status().as_u16();
        if code == 404 {
            return Err(RemoteError::NotFound(url.to_owned()));
        }
        if code >= 400 {
            return Err(RemoteError::Http(format!("HTTP {code} for {url}")));
        }

        let mut reader = resp.into_body().into_reader().take(MAX_MANIFEST_BYTES);
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        Ok(body)
    }
}

impl ManifestSource for HttpSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(RemoteError::Config(format!(
                "unsupported manifest URI '{url}', expected http(s)://..."
            )));
        }
        tracing::debug!("GET {url}");
        self.do_get(url)
    }
}
