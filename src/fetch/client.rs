use async_trait::async_trait;
use reqwest::{Request, Response};

/// Sends one feed request. Auth wrappers decorate an inner client, so the
/// puller only ever sees this trait.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// Lets the client chosen from config at runtime drive a [`crate::pull::Puller`].
#[async_trait]
impl HttpClient for Box<dyn HttpClient> {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        (**self).execute(req).await
    }
}
