//! Minimal client for a Nova-compatible compute API.
//!
//! Implements [`ComputeService`] over the three endpoints a bake needs:
//! `POST /servers`, `GET /servers/{id}`, and `DELETE /servers/{id}` (or the
//! `forceDelete` action). Authentication is a pre-issued token; obtaining
//! it is the operator's concern.

mod error;
mod wire;

use std::sync::LazyLock;
use std::time::Duration;

pub use error::NovaComputeError;

use crate::compute::{
    ComputeFuture, ComputeService, InstanceHandle, STATE_BUILD, STATE_DELETED, ServerSpec,
};
use crate::config::BuilderConfig;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const AUTH_HEADER: &str = "X-Auth-Token";

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Compute service talking to a Nova-compatible HTTP API.
#[derive(Clone, Debug)]
pub struct NovaCompute {
    endpoint: String,
    token: String,
}

impl NovaCompute {
    /// Constructs a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`NovaComputeError::Config`] when the endpoint or token is
    /// empty.
    pub fn new(config: &BuilderConfig) -> Result<Self, NovaComputeError> {
        let endpoint = config.compute_endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(NovaComputeError::Config(String::from(
                "compute endpoint must not be empty",
            )));
        }
        if config.auth_token.trim().is_empty() {
            return Err(NovaComputeError::Config(String::from(
                "auth token must not be empty",
            )));
        }
        Ok(Self {
            endpoint: endpoint.to_owned(),
            token: config.auth_token.trim().to_owned(),
        })
    }

    fn servers_url(&self) -> String {
        format!("{}/servers", self.endpoint)
    }

    fn server_url(&self, id: &str) -> String {
        format!("{}/servers/{id}", self.endpoint)
    }

    fn action_url(&self, id: &str) -> String {
        format!("{}/servers/{id}/action", self.endpoint)
    }

    async fn create_server(&self, spec: &ServerSpec) -> Result<InstanceHandle, NovaComputeError> {
        spec.validate()?;
        let payload = wire::CreateServerBody::from(spec);

        let response = HTTP_CLIENT
            .post(self.servers_url())
            .header(AUTH_HEADER, &self.token)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }

        let parsed: wire::ServerEnvelope =
            serde_json::from_slice(&body).map_err(|err| NovaComputeError::Decode {
                message: err.to_string(),
            })?;
        Ok(InstanceHandle {
            id: parsed.server.id,
            state: parsed.server.status.unwrap_or_else(|| STATE_BUILD.to_owned()),
        })
    }

    async fn fetch_state(&self, handle: &InstanceHandle) -> Result<String, NovaComputeError> {
        let response = HTTP_CLIENT
            .get(self.server_url(&handle.id))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;
        // A purged instance answers 404; report it as DELETED so waits
        // converge.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(STATE_DELETED.to_owned());
        }
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }

        let parsed: wire::ServerEnvelope =
            serde_json::from_slice(&body).map_err(|err| NovaComputeError::Decode {
                message: err.to_string(),
            })?;
        parsed.server.status.ok_or_else(|| NovaComputeError::Decode {
            message: String::from("server document missing status"),
        })
    }

    async fn delete_server(
        &self,
        handle: &InstanceHandle,
        forced: bool,
    ) -> Result<(), NovaComputeError> {
        let response = if forced {
            HTTP_CLIENT
                .post(self.action_url(&handle.id))
                .header(AUTH_HEADER, &self.token)
                .json(&wire::ForceDeleteBody::default())
                .send()
                .await?
        } else {
            HTTP_CLIENT
                .delete(self.server_url(&handle.id))
                .header(AUTH_HEADER, &self.token)
                .send()
                .await?
        };
        // Deleting an instance the provider already purged is a success.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await?;
            return Err(api_error(status.as_u16(), &body));
        }
        Ok(())
    }
}

fn api_error(status: u16, body: &[u8]) -> NovaComputeError {
    NovaComputeError::Api {
        status,
        message: String::from_utf8_lossy(body).into_owned(),
    }
}

impl ComputeService for NovaCompute {
    type Error = NovaComputeError;

    fn create<'a>(
        &'a self,
        spec: &'a ServerSpec,
    ) -> ComputeFuture<'a, InstanceHandle, Self::Error> {
        Box::pin(async move { self.create_server(spec).await })
    }

    fn refresh_state<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> ComputeFuture<'a, String, Self::Error> {
        Box::pin(async move { self.fetch_state(handle).await })
    }

    fn delete<'a>(
        &'a self,
        handle: &'a InstanceHandle,
        forced: bool,
    ) -> ComputeFuture<'a, (), Self::Error> {
        Box::pin(async move { self.delete_server(handle, forced).await })
    }
}
