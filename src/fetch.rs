use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;

/// Sent with remote image fetches; some hosts refuse unknown agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_11_3) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/48.0.2564.109 Safari/537.36";

#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub status: u16,
    pub body: Bytes,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<FetchedFile>;
}

pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<FetchedFile> {
        let res = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await
            .with_context(|| format!("fetch {}", url))?;
        let status = res.status().as_u16();
        let body = res.bytes().await.context("read fetched body")?;
        Ok(FetchedFile { status, body })
    }
}

/// Last path segment of a url, without its query string.
pub fn file_name_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(file_name_from_url("https://x.com/a/b/cat.gif"), "cat.gif");
        assert_eq!(file_name_from_url("https://x.com/a/cat.gif?size=big"), "cat.gif");
        assert_eq!(file_name_from_url("cat.gif"), "cat.gif");
    }
}
