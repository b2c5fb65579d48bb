//! Catalog lookup answering from a fixed table

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use bkh_harvester::models::{CatalogIdentifier, CatalogRecord};
use bkh_harvester::workflow::{CatalogError, CatalogLookup};

pub struct FakeCatalog {
    catalog_name: String,
    /// search value → title
    hits: BTreeMap<String, String>,
    queried: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub fn new(catalog_name: &str, hits: &[(&str, &str)]) -> Self {
        Self {
            catalog_name: catalog_name.to_string(),
            hits: hits
                .iter()
                .map(|(v, t)| (v.to_string(), t.to_string()))
                .collect(),
            queried: Mutex::new(Vec::new()),
        }
    }

    pub fn queried(&self) -> Vec<String> {
        self.queried.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogLookup for FakeCatalog {
    async fn lookup(
        &self,
        identifier: &CatalogIdentifier,
        catalog_name: &str,
    ) -> Result<CatalogRecord, CatalogError> {
        self.queried
            .lock()
            .unwrap()
            .push(identifier.search_value.clone());

        if catalog_name != self.catalog_name {
            return Err(CatalogError::NotConfigured(catalog_name.to_string()));
        }

        match self.hits.get(&identifier.search_value) {
            Some(title) => Ok(CatalogRecord {
                catalog_name: catalog_name.to_string(),
                identifier: identifier.clone(),
                title: Some(title.clone()),
                marc_xml: format!("<record><title>{}</title></record>", title),
            }),
            None => Err(CatalogError::NoMatch {
                field: identifier.search_field.clone(),
                value: identifier.search_value.clone(),
            }),
        }
    }
}
