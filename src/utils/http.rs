// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::{Client, Method};

use crate::error::{AppError, Result};
use crate::models::{FetchMethod, PollConfig};

/// Create a configured asynchronous HTTP client.
///
/// Every request carries the configured timeout so a slow source cannot
/// stall the pass.
pub fn create_client(config: &PollConfig) -> Result<Client> {
    let client = Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

impl From<FetchMethod> for Method {
    fn from(method: FetchMethod) -> Self {
        match method {
            FetchMethod::Get => Method::GET,
            FetchMethod::Post => Method::POST,
        }
    }
}

/// Fetch a URL and return the body text. Non-success statuses are fetch
/// errors.
pub async fn fetch_text(client: &Client, method: FetchMethod, url: &str) -> Result<String> {
    let response = client.request(method.into(), url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::fetch(url, format!("HTTP {status}")));
    }
    Ok(response.text().await?)
}
