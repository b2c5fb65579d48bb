//! SRU catalog client
//!
//! Looks identifiers up in a library catalog over SRU `searchRetrieve`,
//! asking for MARCXML. Catalogs are addressed by name; each name maps to a
//! configured base URL.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::models::{CatalogIdentifier, CatalogRecord};
use crate::workflow::{CatalogError, CatalogLookup};

const USER_AGENT: &str = concat!("bkh-harvester/", env!("CARGO_PKG_VERSION"));
const SRU_VERSION: &str = "1.2";

/// Catalog lookup over SRU
pub struct SruCatalogClient {
    http_client: reqwest::Client,
    endpoints: BTreeMap<String, String>,
}

impl SruCatalogClient {
    pub fn new(endpoints: BTreeMap<String, String>) -> Result<Self, CatalogError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoints,
        })
    }
}

#[async_trait]
impl CatalogLookup for SruCatalogClient {
    async fn lookup(
        &self,
        identifier: &CatalogIdentifier,
        catalog_name: &str,
    ) -> Result<CatalogRecord, CatalogError> {
        let base_url = self
            .endpoints
            .get(catalog_name)
            .ok_or_else(|| CatalogError::NotConfigured(catalog_name.to_string()))?;

        let query = format!("{}={}", identifier.search_field, identifier.search_value);
        tracing::debug!(catalog = catalog_name, url = %base_url, query = %query, "Querying catalog");

        let response = self
            .http_client
            .get(base_url)
            .query(&[
                ("version", SRU_VERSION),
                ("operation", "searchRetrieve"),
                ("recordSchema", "marcxml"),
                ("maximumRecords", "1"),
                ("query", query.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Network(format!("HTTP {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let record = parse_search_response(&body, catalog_name, identifier)?;
        tracing::info!(
            catalog = catalog_name,
            identifier = %identifier.search_value,
            title = record.title.as_deref().unwrap_or("Unknown"),
            "Retrieved catalog record"
        );
        Ok(record)
    }
}

/// Turn an SRU `searchRetrieveResponse` into the first MARC record it carries
pub fn parse_search_response(
    body: &str,
    catalog_name: &str,
    identifier: &CatalogIdentifier,
) -> Result<CatalogRecord, CatalogError> {
    let doc = roxmltree::Document::parse(body).map_err(|e| CatalogError::Parse(e.to_string()))?;

    let no_match = || CatalogError::NoMatch {
        field: identifier.search_field.clone(),
        value: identifier.search_value.clone(),
    };

    let count = doc
        .descendants()
        .find(|n| n.tag_name().name() == "numberOfRecords")
        .and_then(|n| n.text())
        .map(|t| t.trim().parse::<u64>())
        .transpose()
        .map_err(|e| CatalogError::Parse(format!("numberOfRecords: {}", e)))?
        .unwrap_or(0);
    if count == 0 {
        return Err(no_match());
    }

    let marc = doc
        .descendants()
        .filter(|n| n.tag_name().name() == "recordData")
        .find_map(|data| data.children().find(|c| c.tag_name().name() == "record"))
        .ok_or_else(no_match)?;

    let title = marc
        .children()
        .filter(|n| n.tag_name().name() == "datafield" && n.attribute("tag") == Some("245"))
        .flat_map(|f| f.children())
        .find(|s| s.tag_name().name() == "subfield" && s.attribute("code") == Some("a"))
        .and_then(|s| s.text())
        .map(|t| t.trim().trim_end_matches(&['/', ':', ';', ' '][..]).to_string())
        .filter(|t| !t.is_empty());

    Ok(CatalogRecord {
        catalog_name: catalog_name.to_string(),
        identifier: identifier.clone(),
        title,
        marc_xml: body[marc.range()].to_string(),
    })
}
