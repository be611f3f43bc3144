//! Catalog wire format: outbound form requests and listing decoding

use std::collections::HashSet;

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::warn;

use crate::catalog::error::CrawlError;
use crate::catalog::fetcher::{FetchResponse, PageRequest};
use crate::catalog::window::DateWindow;

/// Folder entries of the catalog tree
const FOLDER_SELECTOR: &str = "#contentarbol ul li[id]";

/// Prefix of folder element ids, followed by the folder id
pub const FOLDER_ID_PREFIX: &str = "cole";

/// Query type of a folder's date bucket listing
pub const FOLDER_QUERY: &str = "initgetRdds";

/// Query type of a window's content listing
pub const CONTENT_QUERY: &str = "getRdds";

/// Extract `(folder_id, display_name)` pairs from the catalog root page
///
/// Folder ids are taken from `cole<N>` element ids. The display name is the
/// first non-blank text of the element with whitespace collapsed.
pub fn parse_folder_tree(html: &str) -> Result<Vec<(String, String)>, CrawlError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(FOLDER_SELECTOR)
        .map_err(|e| CrawlError::HtmlParse(format!("Invalid folder selector: {:?}", e)))?;

    let mut seen = HashSet::new();
    let mut folders = Vec::new();
    for element in document.select(&selector) {
        let Some(element_id) = element.value().id() else {
            continue;
        };
        let Some(folder_id) = element_id.strip_prefix(FOLDER_ID_PREFIX) else {
            continue;
        };
        if folder_id.is_empty() || !seen.insert(folder_id.to_string()) {
            continue;
        }

        let display_name = element
            .text()
            .map(str::trim)
            .find(|text| !text.is_empty())
            .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_else(|| {
                warn!(folder_id, "Folder without a display name");
                folder_id.to_string()
            });

        folders.push((folder_id.to_string(), display_name));
    }

    Ok(folders)
}

/// Request for the date buckets of a folder
pub fn folder_request(request_url: &str, folder_id: &str) -> PageRequest {
    PageRequest::post_form(
        request_url,
        vec![
            ("hddQueryType".to_string(), FOLDER_QUERY.to_string()),
            ("cole".to_string(), folder_id.to_string()),
        ],
    )
}

/// Request for the content of a folder within a date window
pub fn content_request(request_url: &str, folder_id: &str, window: &DateWindow) -> PageRequest {
    let (from, to) = window.as_params();
    let fields = [
        ("hddQueryType", CONTENT_QUERY.to_string()),
        ("cole", folder_id.to_string()),
        ("slcCollection", folder_id.to_string()),
        ("slcMedio", String::new()),
        ("txtNumPublish", String::new()),
        ("txtTitlePublish", String::new()),
        ("txtDatePublishFrom", from),
        ("txtDatePublishTo", to),
        ("hddPageSize", String::new()),
        ("hddCurrentPage", String::new()),
        ("txtfilter", String::new()),
    ];

    PageRequest::post_form(
        request_url,
        fields
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    )
}

/// Check a listing response and return the entries of its `rdds` array
///
/// A `null` array is an empty listing; a body without the key is malformed.
pub fn decode_listing(url: &str, response: &FetchResponse) -> Result<Vec<Value>, CrawlError> {
    if !response.is_success() {
        return Err(CrawlError::BadResponse {
            url: url.to_string(),
            status: response.status,
            body: response.body.clone(),
        });
    }

    let body = response.body.trim_start_matches('\u{feff}').trim();
    if body.is_empty() {
        return Err(CrawlError::EmptyResponse {
            url: url.to_string(),
            status: response.status,
        });
    }

    let envelope: Value = serde_json::from_str(body).map_err(|e| CrawlError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    match envelope.get("rdds") {
        Some(Value::Array(entries)) => Ok(entries.clone()),
        Some(Value::Null) => Ok(Vec::new()),
        Some(other) => Err(CrawlError::Decode {
            url: url.to_string(),
            message: format!("'rdds' is not an array: {}", other),
        }),
        None => Err(CrawlError::Decode {
            url: url.to_string(),
            message: "missing 'rdds'".to_string(),
        }),
    }
}
