use crate::fetch::client::HttpClient;
use async_trait::async_trait;

/// An [`HttpClient`] wrapper that appends an API key as a URL query parameter,
/// for producers that authenticate with e.g. `?api_key=...`.
pub struct UrlParam<C> {
    inner: C,
    param_name: String,
    key: String,
}

impl<C> UrlParam<C> {
    pub fn new(inner: C, param_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            inner,
            param_name: param_name.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for UrlParam<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.url_mut()
            .query_pairs_mut()
            .append_pair(&self.param_name, &self.key);
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Option<String>>);

    #[async_trait]
    impl HttpClient for Recorder {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            *self.0.lock().unwrap() = Some(req.url().to_string());
            Ok(axum::http::Response::new("").into())
        }
    }

    #[tokio::test]
    async fn test_key_is_appended_to_query() {
        let client = UrlParam::new(Recorder::default(), "api_key", "s3cr3t");
        let req = reqwest::Request::new(
            reqwest::Method::GET,
            "https://example.com/vp.pb?format=pb".parse().unwrap(),
        );

        client.execute(req).await.unwrap();

        let url = client.inner.0.lock().unwrap().clone().unwrap();
        assert_eq!(url, "https://example.com/vp.pb?format=pb&api_key=s3cr3t");
    }
}
