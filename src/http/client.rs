//! reqwest clients for the calls between processes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::catalog::{Book, BookSource};
use crate::error::ServiceError;
use crate::gateway::{Backend, BackendResponse};
use crate::order::{count_field, CatalogClient};
use crate::registry::Endpoint;

fn build_client(timeout: Duration) -> Result<Client, ServiceError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ServiceError::Internal(format!("http client: {}", e)))
}

/// `{endpoint}/{path}/{segment}` with `segment` percent-encoded.
fn url_with_segment(endpoint: &Endpoint, path: &str, segment: &str) -> Result<Url, ServiceError> {
    let mut url = Url::parse(&endpoint.url(path))
        .map_err(|e| ServiceError::Internal(format!("bad endpoint {}: {}", endpoint, e)))?;
    url.path_segments_mut()
        .map_err(|_| ServiceError::Internal(format!("endpoint {} cannot take a path", endpoint)))?
        .push(segment);
    Ok(url)
}

fn parse_url(endpoint: &Endpoint, path: &str) -> Result<Url, ServiceError> {
    Url::parse(&endpoint.url(path))
        .map_err(|e| ServiceError::Internal(format!("bad endpoint {}: {}", endpoint, e)))
}

/// Send a request and capture the reply. Only transport failures are `Err`.
async fn exchange(client: &Client, method: Method, url: Url) -> Result<BackendResponse, ServiceError> {
    let response = client
        .request(method, url.clone())
        .send()
        .await
        .map_err(|e| ServiceError::BackendUnavailable(format!("{}: {}", url, e)))?;
    let status = response.status().as_u16();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ServiceError::BackendUnavailable(format!("{}: {}", url, e)))?;
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| json!({ "error": String::from_utf8_lossy(&bytes) }));
    Ok(BackendResponse { status, body })
}

/// The gateway's view of catalog and order processes over HTTP.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
}

impl HttpBackend {
    pub fn new(timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn search(&self, endpoint: &Endpoint, term: &str) -> Result<BackendResponse, ServiceError> {
        let url = url_with_segment(endpoint, "books/search", term)?;
        exchange(&self.client, Method::GET, url).await
    }

    async fn info(&self, endpoint: &Endpoint, id: u64) -> Result<BackendResponse, ServiceError> {
        let url = parse_url(endpoint, &format!("books/{}", id))?;
        exchange(&self.client, Method::GET, url).await
    }

    async fn purchase(&self, endpoint: &Endpoint, id: u64) -> Result<BackendResponse, ServiceError> {
        let url = parse_url(endpoint, &format!("purchase/{}", id))?;
        exchange(&self.client, Method::POST, url).await
    }
}

/// The gateway's public routes, for command-line use.
///
/// Error statuses are not errors here: the reply is handed back as is so
/// the caller can show the gateway's own body.
pub struct GatewayClient {
    client: Client,
    gateway: Endpoint,
}

impl GatewayClient {
    pub fn new(gateway: Endpoint, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(timeout)?,
            gateway,
        })
    }

    pub async fn search(&self, term: &str) -> Result<BackendResponse, ServiceError> {
        let url = url_with_segment(&self.gateway, "search", term)?;
        exchange(&self.client, Method::GET, url).await
    }

    pub async fn info(&self, id: u64) -> Result<BackendResponse, ServiceError> {
        let url = parse_url(&self.gateway, &format!("info/{}", id))?;
        exchange(&self.client, Method::GET, url).await
    }

    pub async fn purchase(&self, id: u64) -> Result<BackendResponse, ServiceError> {
        let url = parse_url(&self.gateway, &format!("purchase/{}", id))?;
        exchange(&self.client, Method::POST, url).await
    }
}

/// An order service's catalog instance over HTTP.
pub struct HttpCatalogClient {
    client: Client,
    endpoint: Endpoint,
}

impl HttpCatalogClient {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint,
        })
    }

    async fn call(&self, method: Method, path: String) -> Result<Value, ServiceError> {
        let url = parse_url(&self.endpoint, &path)?;
        exchange(&self.client, method, url).await?.into_result()
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn availability(&self, id: u64) -> Result<u32, ServiceError> {
        let reply = self
            .call(Method::GET, format!("books/{}/stock/availability", id))
            .await?;
        count_field(&reply, "left")
    }

    async fn decrease(&self, id: u64) -> Result<Value, ServiceError> {
        self.call(Method::PUT, format!("books/{}/count/decrease", id))
            .await
    }

    async fn increase(&self, id: u64) -> Result<u32, ServiceError> {
        let reply = self
            .call(Method::PUT, format!("books/{}/count/increase", id))
            .await?;
        count_field(&reply, "count")
    }

    async fn book(&self, id: u64) -> Result<Value, ServiceError> {
        self.call(Method::GET, format!("books/{}", id)).await
    }
}

/// The catalog primary's book list, fetched for a replica bootstrap.
pub struct HttpBookSource {
    client: Client,
    primary: Endpoint,
}

impl HttpBookSource {
    pub fn new(primary: Endpoint, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(timeout)?,
            primary,
        })
    }
}

#[derive(Deserialize)]
struct BookList {
    books: Vec<Book>,
}

#[async_trait]
impl BookSource for HttpBookSource {
    async fn fetch_books(&self) -> Result<Vec<Book>, ServiceError> {
        let url = parse_url(&self.primary, "books")?;
        let body = exchange(&self.client, Method::GET, url).await?.into_result()?;
        let list: BookList = serde_json::from_value(body)?;
        Ok(list.books)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_terms_are_percent_encoded() {
        let url = url_with_segment(&Endpoint::new("http://127.0.0.1:4000"), "books/search", "war & peace/2")
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:4000/books/search/war%20&%20peace%2F2");
    }
}
