//! `reqwest`-backed [`Transport`].

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use tokio::time::timeout;

use crate::collector::{CollectorError, Headers, Transport, TransportError};

/// HTTP transport with one verifying and one non-verifying client.
///
/// Deadlines are applied per request, so one transport serves the provider
/// and the forwarding endpoint with their own timeouts.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    insecure_client: Client,
}

impl HttpTransport {
    /// Build both clients.
    ///
    /// # Errors
    /// Returns `CollectorError::Config` if a client cannot be built.
    pub fn new() -> Result<Self, CollectorError> {
        let client = Client::builder()
            .build()
            .map_err(|e| CollectorError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let insecure_client = Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| CollectorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            insecure_client,
        })
    }

    fn client(&self, verify_tls: bool) -> &Client {
        if verify_tls {
            &self.client
        } else {
            &self.insecure_client
        }
    }
}

fn with_headers(mut request: RequestBuilder, headers: &Headers) -> RequestBuilder {
    for (key, value) in headers {
        request = request.header(key.as_str(), value.as_str());
    }
    request
}

fn request_error(url: &str, e: reqwest::Error) -> TransportError {
    TransportError::Request {
        url: url.to_string(),
        message: e.to_string(),
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        headers: &Headers,
        deadline: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let request = with_headers(self.client.get(url), headers);

        let exchange = async {
            let response = request.send().await.map_err(|e| request_error(url, e))?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            let body = response.bytes().await.map_err(|e| request_error(url, e))?;
            Ok(body.to_vec())
        };

        match timeout(deadline, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                url: url.to_string(),
                timeout: deadline,
            }),
        }
    }

    async fn post(
        &self,
        url: &str,
        headers: &Headers,
        body: Vec<u8>,
        deadline: Duration,
        verify_tls: bool,
    ) -> Result<u16, TransportError> {
        let request = with_headers(self.client(verify_tls).post(url), headers).body(body);

        let result = timeout(deadline, request.send()).await;
        match result {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() {
                    Ok(status.as_u16())
                } else {
                    Err(TransportError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    })
                }
            }
            Ok(Err(e)) => Err(request_error(url, e)),
            Err(_) => Err(TransportError::Timeout {
                url: url.to_string(),
                timeout: deadline,
            }),
        }
    }
}
