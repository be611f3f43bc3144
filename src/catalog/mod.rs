//! Catalog crawling module
//!
//! This module walks the gazette catalog: it lists the folders of the
//! catalog root, asks each folder for its monthly date buckets, turns every
//! bucket into a date window and ingests the content of each window.
//!
//! ## Key Components
//!
//! - `Orchestrator`: drives the crawl as a queue of requests and a dispatcher
//!   of their responses
//! - `PageFetcher`: transport seam, with `HttpFetcher` and `RateLimitedFetcher`
//! - `DateBucket` / `DateWindow`: monthly units of a folder listing
//! - `RunReport` / `CrawlEvent`: accounting and progress of a run

mod config;
pub mod error;
mod fetcher;
mod orchestrator;
mod report;
pub mod wire;
mod window;

pub use config::{BucketSampling, CrawlConfig, CrawlConfigBuilder};
pub use error::{CrawlError, FetchError};
pub use fetcher::{FetchResponse, HttpFetcher, PageFetcher, PageRequest, RateLimitedFetcher};
pub use orchestrator::Orchestrator;
pub use report::{CrawlEvent, CrawlFailure, CrawlStage, FolderTally, RunReport, RunTotals, WindowStatus};
pub use window::{DateBucket, DateWindow, MAX_BUCKET_YEAR};

use serde::Serialize;

/// A folder of the catalog and the collection its documents go to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderDescriptor {
    /// Numeric id taken from the `cole<N>` element id
    pub folder_id: String,

    /// Name shown in the catalog tree
    pub display_name: String,

    /// Storage collection for the folder's documents
    pub collection: String,
}

impl FolderDescriptor {
    /// Describe a folder, resolving its collection from `config`
    pub fn resolve(config: &CrawlConfig, folder_id: &str, display_name: &str) -> Self {
        Self {
            folder_id: folder_id.to_string(),
            display_name: display_name.to_string(),
            collection: config.collection_for(folder_id, display_name),
        }
    }
}

/// Fetch the catalog root and describe its folders
pub async fn discover_folders<F: PageFetcher>(
    config: &CrawlConfig,
    fetcher: &F,
) -> Result<Vec<FolderDescriptor>, CrawlError> {
    let url = config.catalog_url()?.to_string();
    let response = fetcher
        .fetch(&PageRequest::get(url.clone()))
        .await
        .map_err(|source| CrawlError::Fetch {
            url: url.clone(),
            source,
        })?;
    parse_root(config, &url, &response)
}

/// Check a root response and describe the folders it lists
pub(crate) fn parse_root(
    config: &CrawlConfig,
    url: &str,
    response: &FetchResponse,
) -> Result<Vec<FolderDescriptor>, CrawlError> {
    if !response.is_success() {
        return Err(CrawlError::BadResponse {
            url: url.to_string(),
            status: response.status,
            body: response.body.clone(),
        });
    }
    if response.body.trim().is_empty() {
        return Err(CrawlError::EmptyResponse {
            url: url.to_string(),
            status: response.status,
        });
    }

    Ok(wire::parse_folder_tree(&response.body)?
        .into_iter()
        .map(|(folder_id, display_name)| FolderDescriptor::resolve(config, &folder_id, &display_name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFetcher;

    #[tokio::test]
    async fn test_discover_folders() {
        let config = CrawlConfig::builder()
            .origin("http://catalog.test")
            .collection_override("12", "normas")
            .build();
        let fetcher = ScriptedFetcher::new().route(
            "GET http://catalog.test/consultas/coleccion/",
            FetchResponse::new(
                200,
                r#"<div id="contentarbol"><ul>
                     <li id="cole7">Decretos Ejecutivos</li>
                     <li id="cole12">Normas Jurídicas</li>
                   </ul></div>"#,
            ),
        );

        let folders = discover_folders(&config, &fetcher).await.unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].folder_id, "7");
        assert_eq!(folders[0].collection, "decretos_ejecutivos");
        assert_eq!(folders[1].collection, "normas");
    }

    #[tokio::test]
    async fn test_discover_folders_bad_root() {
        let config = CrawlConfig::builder().origin("http://catalog.test").build();
        let fetcher = ScriptedFetcher::new().route(
            "GET http://catalog.test/consultas/coleccion/",
            FetchResponse::new(502, "Bad Gateway"),
        );

        let result = discover_folders(&config, &fetcher).await;
        assert!(matches!(result, Err(CrawlError::BadResponse { status: 502, .. })));
    }
}
