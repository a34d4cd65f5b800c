//! Social preview image proxy.
//!
//! Fetch the page HTML, pick the best declared preview image and download
//! it. Every failure along the way means "no social image"; nothing here
//! is surfaced to the caller as an error.

use std::time::Duration;

use reqwest::{Method, Url};

use super::{ACCEPT_HTML, ACCEPT_IMAGE, FetchClient, FetchError, FetchedImage, content_type_of, read_capped};
use crate::meta::{ImageCandidate, find_social_image};
use capcache_core::Deadline;
use capcache_core::config::Timeouts;

/// A downloaded social preview image and the tag it came from.
#[derive(Debug, Clone)]
pub struct SocialImage {
    pub image: FetchedImage,
    pub candidate: ImageCandidate,
}

impl SocialImage {
    /// `scheme://host[:port]` of the image URL.
    pub fn origin(&self) -> String {
        self.candidate.url.origin().ascii_serialization()
    }
}

/// Find and download the page's social preview image within the request
/// deadline.
pub async fn fetch_social_image(
    client: &FetchClient, page: &Url, deadline: &Deadline, timeouts: &Timeouts,
) -> Option<SocialImage> {
    let html_budget = deadline.budget(timeouts.og_html());
    let html = match client.fetch_html(page, html_budget).await {
        Ok(html) => html,
        Err(e) => {
            tracing::debug!(url = %page, error = %e, "social meta: html unavailable");
            return None;
        }
    };

    let Some(candidate) = find_social_image(&html, page) else {
        tracing::debug!(url = %page, "social meta: no candidates");
        return None;
    };

    let image_budget = deadline.budget(timeouts.og_image());
    match client.fetch_image(&candidate.url, ACCEPT_IMAGE, image_budget).await {
        Ok(image) => {
            tracing::debug!(
                url = %page,
                image = %candidate.url,
                source = candidate.source.as_str(),
                weight = candidate.weight,
                "social meta: image selected"
            );
            Some(SocialImage { image, candidate })
        }
        Err(e) => {
            tracing::debug!(url = %page, image = %candidate.url, error = %e, "social meta: image unavailable");
            None
        }
    }
}

impl FetchClient {
    /// GET a page as HTML. Only `text/html` and `application/xhtml+xml`
    /// responses are accepted; the status code is not checked, since error
    /// pages often still carry the site's meta tags.
    pub async fn fetch_html(&self, url: &Url, budget: Duration) -> Result<String, FetchError> {
        tokio::time::timeout(budget, self.get_html(url, budget)).await.map_err(|_| FetchError::Timeout)?
    }

    async fn get_html(&self, url: &Url, budget: Duration) -> Result<String, FetchError> {
        let response = self.request(Method::GET, url, ACCEPT_HTML, budget).send().await?;
        let content_type = content_type_of(&response);
        if !(content_type.contains("text/html") || content_type.contains("application/xhtml+xml")) {
            return Err(FetchError::UnexpectedContentType(content_type));
        }
        let body = read_capped(response, self.config().max_bytes).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
