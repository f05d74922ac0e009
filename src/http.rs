//! Plain HTTP network source. Fetches a URL and hands back the body as a
//! `String`, which the cache stores raw.

use std::time::Duration;

use ureq::Agent;

use crate::error::{AddContext, CacheError};
use crate::network::NetworkSource;
use crate::request::PlainRequestMetadata;
use crate::time::Seconds;
use crate::Result;
use crate::log_debug;

const DEFAULT_TIMEOUT: Seconds = Seconds::new(30);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

#[derive(Clone, Debug, Builder)]
pub struct HttpSource {
    #[builder(setter(into))]
    url: String,
    #[builder(default)]
    method: Method,
    #[builder(setter(into, strip_option), default)]
    body: Option<String>,
    #[builder(default)]
    headers: Vec<(String, String)>,
    #[builder(default = "DEFAULT_TIMEOUT")]
    timeout: Seconds,
}

impl HttpSource {
    pub fn builder() -> HttpSourceBuilder {
        HttpSourceBuilder::default()
    }

    pub fn get<T: Into<String>>(url: T) -> Self {
        HttpSource {
            url: url.into(),
            method: Method::Get,
            body: None,
            headers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request identity of this call for the given response type name.
    pub fn request_metadata<T: Into<String>>(&self, response_type: T) -> PlainRequestMetadata {
        let plain = PlainRequestMetadata::new(response_type, self.url.as_str());
        match &self.body {
            Some(body) => plain.with_body(body.as_str()),
            None => plain,
        }
    }

    fn agent(&self, connectivity_timeout: Option<Seconds>) -> Agent {
        Agent::config_builder()
            .timeout_global(Some(self.timeout.to_duration()))
            .timeout_connect(connectivity_timeout.map(|timeout| {
                timeout.to_duration().max(Duration::from_millis(1))
            }))
            .build()
            .into()
    }

    fn call(&self, agent: &Agent) -> std::result::Result<String, ureq::Error> {
        let mut response = match self.method {
            Method::Get => {
                let request = self
                    .headers
                    .iter()
                    .fold(agent.get(&self.url), |req, (key, value)| req.header(key, value));
                request.call()?
            }
            Method::Post => {
                let request = self
                    .headers
                    .iter()
                    .fold(agent.post(&self.url), |req, (key, value)| req.header(key, value));
                request.send(self.body.as_deref().unwrap_or_default())?
            }
        };
        response.body_mut().read_to_string()
    }
}

impl NetworkSource<String> for HttpSource {
    fn fetch(&mut self, connectivity_timeout: Option<Seconds>) -> Result<String> {
        log_debug!("{} {}", self.method.as_str(), self.url);
        let agent = self.agent(connectivity_timeout);
        match self.call(&agent) {
            Ok(body) => Ok(body),
            Err(ureq::Error::StatusCode(code)) => Err(CacheError::NetworkError(format!(
                "{} {} returned status {}",
                self.method.as_str(),
                self.url,
                code
            ))
            .into()),
            Err(err) => Err(err).err_context(format!("{} {}", self.method.as_str(), self.url)),
        }
    }
}
