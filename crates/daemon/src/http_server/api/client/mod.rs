//! Typed client for the control API
//!
//! Every endpoint module pairs its request type with an [`ApiRequest`]
//! implementation, so callers go through [`ApiClient::call`] instead of
//! building URLs by hand.

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

mod client;
mod error;

pub use client::ApiClient;
pub use error::ApiError;

pub trait ApiRequest {
    type Response: DeserializeOwned;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError>;
}
