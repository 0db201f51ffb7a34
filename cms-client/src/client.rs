use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::check_status;
use crate::types::{LoginRequest, LoginResponse};

const USER_AGENT: &str = concat!("cms-client/", env!("CARGO_PKG_VERSION"));

/// Paths of the CMS endpoints, relative to the service URL.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Local login, exchanging identifier and password for a token.
    pub auth: String,
    /// Multipart file upload.
    pub upload: String,
    /// Patient collection.
    pub patients: String,
    /// Treatment record collection.
    pub treatments: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth: "/api/auth/local".to_owned(),
            upload: "/api/upload".to_owned(),
            patients: "/api/patients".to_owned(),
            treatments: "/api/treatments".to_owned(),
        }
    }
}

#[derive(Debug)]
struct ClientBuilderInner {
    service_url: Url,
    endpoints: Endpoints,
    reqwest_builder: reqwest::ClientBuilder,
}

/// Builder to create a [`Client`].
#[must_use]
#[derive(Debug)]
pub struct ClientBuilder(crate::Result<ClientBuilderInner>);

impl ClientBuilder {
    /// Creates a new [`ClientBuilder`], configured with the given `service_url`.
    pub fn new(service_url: impl reqwest::IntoUrl) -> Self {
        let service_url = match service_url.into_url() {
            Ok(url) => url,
            Err(err) => return Self(Err(err.into())),
        };

        // Uploads of several megabytes against a loaded CMS can take a while, so only the
        // connect phase gets a tight default.
        let reqwest_builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent(USER_AGENT);

        Self(Ok(ClientBuilderInner {
            service_url,
            endpoints: Endpoints::default(),
            reqwest_builder,
        }))
    }

    /// Overrides the endpoint paths.
    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        if let Ok(ref mut inner) = self.0 {
            inner.endpoints = endpoints;
        }
        self
    }

    /// Sets the total timeout of each request.
    ///
    /// Without a timeout, a hung request occupies its caller until the connection breaks.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.configure_reqwest(|builder| builder.timeout(timeout))
    }

    /// Calls the closure with the underlying [`reqwest::ClientBuilder`].
    pub fn configure_reqwest<F>(self, closure: F) -> Self
    where
        F: FnOnce(reqwest::ClientBuilder) -> reqwest::ClientBuilder,
    {
        let Ok(inner) = self.0 else { return self };
        Self(Ok(ClientBuilderInner {
            service_url: inner.service_url,
            endpoints: inner.endpoints,
            reqwest_builder: closure(inner.reqwest_builder),
        }))
    }

    /// Returns a [`Client`] that uses this [`ClientBuilder`] configuration.
    ///
    /// # Errors
    ///
    /// This method fails if:
    /// - the given `service_url` is invalid or cannot be a base URL
    /// - the [`reqwest::Client`] fails to build. Refer to [`reqwest::ClientBuilder::build`] for
    ///   more information on when this can happen.
    pub fn build(self) -> crate::Result<Client> {
        let inner = self.0?;
        if inner.service_url.cannot_be_a_base() {
            return Err(crate::Error::InvalidUrl {
                message: format!("`{}` cannot be used as a base URL", inner.service_url),
            });
        }

        Ok(Client {
            inner: Arc::new(ClientInner {
                reqwest: inner.reqwest_builder.build()?,
                service_url: inner.service_url,
                endpoints: inner.endpoints,
            }),
        })
    }
}

#[derive(Debug)]
pub(crate) struct ClientInner {
    pub(crate) reqwest: reqwest::Client,
    service_url: Url,
    pub(crate) endpoints: Endpoints,
}

impl ClientInner {
    /// Resolves an endpoint path against the service URL.
    pub(crate) fn url(&self, path: &str) -> Url {
        let mut url = self.service_url.clone();
        let base = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{base}/{}", path.trim_start_matches('/')));
        url
    }
}

/// A client for the CMS. Use [`Client::builder`] to configure and construct this.
///
/// The client itself is unauthenticated. Use [`Client::login`] to obtain a [`Credential`] and
/// then [`Client::session`] to perform authenticated requests. Cloning is cheap, all clones share
/// one connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Convenience function to create a [`ClientBuilder`].
    pub fn builder(service_url: impl reqwest::IntoUrl) -> ClientBuilder {
        ClientBuilder::new(service_url)
    }

    /// Exchanges an identifier and password for a bearer [`Credential`].
    pub async fn login(&self, identifier: &str, password: &str) -> crate::Result<Credential> {
        let url = self.inner.url(&self.inner.endpoints.auth);
        let response = self
            .inner
            .reqwest
            .post(url)
            .json(&LoginRequest {
                identifier,
                password,
            })
            .send()
            .await?;

        let LoginResponse { jwt } = check_status(response).await?.json().await?;
        if jwt.is_empty() {
            return Err(crate::Error::EmptyToken);
        }

        Ok(Credential(jwt.into()))
    }

    /// Binds a credential to this client for authenticated requests.
    pub fn session(&self, credential: Credential) -> Session {
        Session {
            client: self.inner.clone(),
            credential,
        }
    }
}

/// An opaque bearer token.
///
/// Cloning shares the underlying string. The token is redacted from debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    /// Wraps an existing token, for example one issued out of band.
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([redacted])")
    }
}

/// An authenticated handle to the CMS.
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) client: Arc<ClientInner>,
    credential: Credential,
}

impl Session {
    /// The credential presented on every request of this session.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub(crate) fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let url = self.client.url(path);
        self.client
            .reqwest
            .post(url)
            .bearer_auth(self.credential.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_endpoint_paths() {
        let client = Client::builder("http://localhost:1337/").build().unwrap();
        let url = client.inner.url("/api/upload");
        assert_eq!(url.as_str(), "http://localhost:1337/api/upload");

        let client = Client::builder("http://localhost:1337/cms").build().unwrap();
        let url = client.inner.url("api/upload");
        assert_eq!(url.as_str(), "http://localhost:1337/cms/api/upload");
    }

    #[test]
    fn rejects_invalid_urls() {
        assert!(Client::builder("not a url").build().is_err());
        assert!(Client::builder("mailto:someone@example.com").build().is_err());
    }

    #[test]
    fn redacts_credentials() {
        let credential = Credential::new("secret-token");
        assert_eq!(format!("{credential:?}"), "Credential([redacted])");
        assert_eq!(credential.token(), "secret-token");
    }
}
