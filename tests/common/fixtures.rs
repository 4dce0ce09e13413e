//! Mocked listings and their JSON bodies

use serde::Deserialize;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{API_KEY, LISTING};

/// Element type served by the mocked listing
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mod {
    pub id: usize,
    pub display_name: String,
}

/// The element at `index`
pub fn mod_json(index: usize) -> Value {
    json!({"id": index, "displayName": format!("mod-{index}")})
}

/// A page body holding elements `index..index + count`
pub fn page_body(index: usize, page_size: usize, count: usize, total: Option<usize>) -> Value {
    let data: Vec<Value> = (index..index + count).map(mod_json).collect();
    let mut pagination = json!({"index": index, "pageSize": page_size, "resultCount": count});
    if let Some(total) = total {
        pagination["totalCount"] = json!(total);
    }
    json!({"data": data, "pagination": pagination})
}

/// Matches the request for the page at `index`
pub fn page_request(index: usize, page_size: usize) -> wiremock::MockBuilder {
    Mock::given(method("GET"))
        .and(path(LISTING))
        .and(query_param("index", index.to_string()))
        .and(query_param("pageSize", page_size.to_string()))
        .and(header("x-api-key", API_KEY))
}

/// Serves a listing of `len` elements, expecting each page exactly once
pub async fn mount_listing(server: &MockServer, len: usize, page_size: usize) {
    let mut index = 0;
    loop {
        let count = len.saturating_sub(index).min(page_size);
        page_request(index, page_size)
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(index, page_size, count, Some(len))))
            .expect(1)
            .mount(server)
            .await;

        index += page_size;
        if index >= len {
            break;
        }
    }
}
