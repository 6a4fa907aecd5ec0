use std::io::Write;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::domain::PdbId;
use crate::error::KiraError;

/// Remote archive access used by the PDB reader when a file is missing locally.
pub trait RcsbClient: Send + Sync {
    /// Current entry in PDB format.
    fn download_entry(&self, id: &PdbId, destination: &mut dyn Write) -> Result<(), KiraError>;
    /// Biological assembly file `<id>.pdb<index>`.
    fn download_assembly(
        &self,
        id: &PdbId,
        index: u32,
        destination: &mut dyn Write,
    ) -> Result<(), KiraError>;
    /// Entry from the obsolete archive.
    fn download_obsolete(&self, id: &PdbId, destination: &mut dyn Write)
    -> Result<(), KiraError>;
    /// Entries that superseded an obsolete `id`, newest first.
    fn replaced_by(&self, id: &PdbId) -> Result<Vec<PdbId>, KiraError>;
    fn fetch_url(&self, url: &str) -> Result<Vec<u8>, KiraError>;
}

#[derive(Clone)]
pub struct RcsbHttpClient {
    client: Client,
}

impl RcsbHttpClient {
    pub fn new() -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-sc/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::RcsbHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| KiraError::RcsbHttp(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn entry_url(id: &PdbId) -> String {
        format!("https://files.rcsb.org/download/{}.pdb.gz", id.as_str())
    }

    pub fn assembly_url(id: &PdbId, index: u32) -> String {
        format!(
            "https://files.rcsb.org/download/{}.pdb{}.gz",
            id.as_str(),
            index
        )
    }

    pub fn obsolete_url(id: &PdbId) -> String {
        format!(
            "https://files.wwpdb.org/pub/pdb/data/structures/obsolete/pdb/{}/pdb{}.ent.gz",
            id.middle(),
            id.load_key()
        )
    }

    fn removed_url(id: &PdbId) -> String {
        format!(
            "https://data.rcsb.org/rest/v1/holdings/removed/{}",
            id.as_str()
        )
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, KiraError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "RCSB request failed".to_string());
        Err(KiraError::RcsbStatus { status, message })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, KiraError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::debug!(status, attempt, "retrying RCSB request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::debug!(error = %err, attempt, "retrying RCSB request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(KiraError::RcsbHttp(err.to_string()));
                }
            }
        }
    }

    fn download(&self, url: &str, destination: &mut dyn Write) -> Result<(), KiraError> {
        tracing::info!(url, "downloading structure file");
        let response = self.send_with_retries(|| self.client.get(url))?;
        let mut response = Self::handle_status(response)?;
        std::io::copy(&mut response, destination)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

impl RcsbClient for RcsbHttpClient {
    fn download_entry(&self, id: &PdbId, destination: &mut dyn Write) -> Result<(), KiraError> {
        self.download(&Self::entry_url(id), destination)
    }

    fn download_assembly(
        &self,
        id: &PdbId,
        index: u32,
        destination: &mut dyn Write,
    ) -> Result<(), KiraError> {
        self.download(&Self::assembly_url(id, index), destination)
    }

    fn download_obsolete(
        &self,
        id: &PdbId,
        destination: &mut dyn Write,
    ) -> Result<(), KiraError> {
        self.download(&Self::obsolete_url(id), destination)
    }

    fn replaced_by(&self, id: &PdbId) -> Result<Vec<PdbId>, KiraError> {
        let url = Self::removed_url(id);
        let response = self.send_with_retries(|| self.client.get(&url))?;
        let response = Self::handle_status(response)?;
        let raw_json: Value = response
            .json()
            .map_err(|err| KiraError::RcsbHttp(err.to_string()))?;
        Ok(extract_replacements(&raw_json))
    }

    fn fetch_url(&self, url: &str) -> Result<Vec<u8>, KiraError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        let response = Self::handle_status(response)?;
        let bytes = response
            .bytes()
            .map_err(|err| KiraError::RcsbHttp(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Reads `rcsb_repository_holdings_removed.id_codes_replaced_by`, newest entry first.
pub fn extract_replacements(raw_json: &Value) -> Vec<PdbId> {
    let mut ids: Vec<PdbId> = raw_json
        .get("rcsb_repository_holdings_removed")
        .and_then(|value| value.get("id_codes_replaced_by"))
        .and_then(|value| value.as_array())
        .map(|array| {
            array
                .iter()
                .filter_map(|value| value.as_str())
                .filter_map(|value| value.parse().ok())
                .collect()
        })
        .unwrap_or_default();
    ids.reverse();
    ids
}

pub fn is_not_found(err: &KiraError) -> bool {
    matches!(err, KiraError::RcsbStatus { status: 404, .. })
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn urls_follow_archive_layout() {
        let id: PdbId = "1hhb".parse().unwrap();
        assert_eq!(
            RcsbHttpClient::entry_url(&id),
            "https://files.rcsb.org/download/1HHB.pdb.gz"
        );
        assert_eq!(
            RcsbHttpClient::assembly_url(&id, 2),
            "https://files.rcsb.org/download/1HHB.pdb2.gz"
        );
        assert!(RcsbHttpClient::obsolete_url(&id).ends_with("/obsolete/pdb/hh/pdb1hhb.ent.gz"));
    }

    #[test]
    fn replacements_newest_first() {
        let raw = json!({
            "rcsb_repository_holdings_removed": {
                "id_codes_replaced_by": ["2HHB", "3HHB"]
            }
        });
        let ids = extract_replacements(&raw);
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].as_str(), "3HHB");
        assert!(extract_replacements(&json!({})).is_empty());
    }
}
