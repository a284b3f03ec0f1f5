//! Ad and account lookups.
//!
//! These feed `initialize_session` with brief data; they are plain JSON GETs
//! against the catalog base URL.

use anyhow::{Context, bail};
use canvas_types::{AdDetail, CreativeSummary};

use crate::{Result, read_capped_error_body};

fn join(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

async fn get_json<T: serde::de::DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<T> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = read_capped_error_body(response).await;
        bail!("API error {status}: {body}");
    }

    response
        .json::<T>()
        .await
        .with_context(|| format!("invalid response body from {url}"))
}

pub async fn fetch_ad_detail(
    client: &reqwest::Client,
    base_url: &str,
    ad_id: &str,
) -> Result<AdDetail> {
    get_json(client, &join(base_url, &format!("ads/{ad_id}"))).await
}

pub async fn fetch_account_creatives(
    client: &reqwest::Client,
    base_url: &str,
    account_id: &str,
) -> Result<Vec<CreativeSummary>> {
    get_json(
        client,
        &join(base_url, &format!("accounts/{account_id}/creatives")),
    )
    .await
}
