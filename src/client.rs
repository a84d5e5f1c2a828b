use log::debug;
use reqwest::blocking::{self, Response};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use std::io::BufReader;

use crate::{
    config::StoreConfig,
    error::{Error, Result},
};

/// A blocking client for the store's GraphQL Admin API.
pub struct Client {
    http: blocking::Client,
    endpoint: String,
    api_key: String,
    password: String,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

impl Client {
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        Self::with_base_url(
            &config.base_url(),
            &config.api_version,
            &config.api_key,
            &config.password,
        )
    }

    #[must_use]
    pub fn with_base_url(base_url: &str, api_version: &str, api_key: &str, password: &str) -> Self {
        Self {
            http: blocking::Client::new(),
            endpoint: format!("{base_url}/admin/api/{api_version}/graphql.json"),
            api_key: api_key.to_string(),
            password: password.to_string(),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Runs a GraphQL query or mutation and decodes its `data`.
    ///
    /// # Errors
    ///
    /// Returns errors if:
    /// * The request cannot be sent, or the response status is not a success
    /// * The response carries GraphQL errors
    /// * The response has no `data`, or it does not decode as `T`
    pub fn query<T: DeserializeOwned>(&self, document: &str, variables: Value) -> Result<T> {
        debug!("POST {}", self.endpoint);
        let resp = self
            .http
            .post(&self.endpoint)
            .basic_auth(&self.api_key, Some(&self.password))
            .json(&json!({ "query": document, "variables": variables }))
            .send()?;
        let resp: GraphQlResponse<T> = check_status(resp)?.json()?;
        if !resp.errors.is_empty() {
            return Err(Error::GraphQl(
                resp.errors.into_iter().map(|e| e.message).collect(),
            ));
        }
        resp.data.ok_or(Error::NoData)
    }

    /// Fetches a file, such as a bulk operation's results, from `url`.
    ///
    /// Result URLs are pre-signed, so no credentials are sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is not a success.
    pub fn download(&self, url: &str) -> Result<BufReader<Response>> {
        debug!("GET {url}");
        let resp = check_status(self.http.get(url).send()?)?;
        Ok(BufReader::new(resp))
    }
}

fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    Err(Error::Status {
        status: status.as_u16(),
        body: resp.text().unwrap_or_default(),
    })
}
