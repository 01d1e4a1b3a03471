use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rand::{seq::SliceRandom, Rng};

use crate::models::MicroBreakContent;

/// Read-only source of micro-break content.
#[async_trait]
pub trait ContentLibrary: Send + Sync {
    async fn list(&self) -> Result<Vec<MicroBreakContent>>;
}

/// Uniform pick, or the built-in item when the library is empty.
pub fn select_content<R: Rng + ?Sized>(
    library: &[MicroBreakContent],
    rng: &mut R,
) -> MicroBreakContent {
    library
        .choose(rng)
        .cloned()
        .unwrap_or_else(MicroBreakContent::fallback)
}

/// Content shipped in the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticLibrary {
    items: Vec<MicroBreakContent>,
}

impl StaticLibrary {
    pub fn new(items: Vec<MicroBreakContent>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl ContentLibrary for StaticLibrary {
    async fn list(&self) -> Result<Vec<MicroBreakContent>> {
        Ok(self.items.clone())
    }
}

/// `GET {base}/microbreaks`.
pub struct HttpContentLibrary {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpContentLibrary {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("content HTTP client init failed: {e}"))?;

        Ok(Self {
            client,
            url: format!("{}/microbreaks", base_url.trim_end_matches('/')),
            token,
        })
    }
}

#[async_trait]
impl ContentLibrary for HttpContentLibrary {
    async fn list(&self) -> Result<Vec<MicroBreakContent>> {
        let mut request = self.client.get(&self.url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        request
            .send()
            .await
            .with_context(|| format!("GET {} failed", self.url))?
            .error_for_status()
            .with_context(|| format!("GET {} returned an error status", self.url))?
            .json::<Vec<MicroBreakContent>>()
            .await
            .context("invalid micro-break payload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashSet;

    fn item(id: &str) -> MicroBreakContent {
        MicroBreakContent {
            id: id.into(),
            title: format!("Break {id}"),
            youtube_url: format!("https://youtu.be/{id}"),
            booster_text: "Nice work!".into(),
        }
    }

    #[test]
    fn empty_library_uses_fallback() {
        let mut rng = StdRng::seed_from_u64(7);
        let picked = select_content(&[], &mut rng);

        assert_eq!(picked, MicroBreakContent::fallback());
        assert!(picked.youtube_url.is_empty());
    }

    #[test]
    fn picks_cover_the_library() {
        let library = vec![item("a"), item("b"), item("c")];
        let mut rng = StdRng::seed_from_u64(42);

        let seen: HashSet<String> = (0..200)
            .map(|_| select_content(&library, &mut rng).id)
            .collect();

        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn static_library_lists_items() {
        let library = StaticLibrary::new(vec![item("a")]);
        assert_eq!(library.list().await.unwrap(), vec![item("a")]);
    }
}
