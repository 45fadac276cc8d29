//! Subreddit listings and image downloads.
//!
//! Listings come from the public `.json` endpoints and are reduced to
//! [`Post`]s; [`RedditClient`] fetches them and saves media over blocking HTTP.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Listing orders queried for every subreddit.
pub const LISTING_KINDS: &[&str] = &["top", "hot", "new", "rising", "controversial"];

/// Image extensions the grid composite can use.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// The subset of a listing post the pipeline keeps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Post {
    pub id: String,
    pub subreddit: String,
    pub title: String,
    pub ups: i64,
    pub downs: i64,
    pub upvote_ratio: f64,
    pub permalink: String,
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListingData {
    children: Vec<ListingChild>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListingChild {
    data: Post,
}

pub fn listing_url(subreddit: &str, kind: &str, limit: usize) -> String {
    format!("https://www.reddit.com/r/{}/{}.json?limit={}", subreddit, kind, limit)
}

/// Posts of a listing response, in listing order.
pub fn parse_listing(json: &str) -> Result<Vec<Post>> {
    let listing: Listing = serde_json::from_str(json).context("parsing listing json")?;
    Ok(listing.data.children.into_iter().map(|c| c.data).collect())
}

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

pub fn is_image_url(url: &str) -> bool {
    strip_query(url)
        .rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// File name a download of `url` is saved under.
pub fn file_name_for(url: &str) -> Option<&str> {
    strip_query(url).rsplit('/').next().filter(|name| !name.is_empty())
}

/// Streams `reader` into a new file at `path`. A partial file is removed
/// when the copy fails.
fn save_to(mut reader: impl Read, path: &Path) -> Result<u64> {
    let mut file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    match io::copy(&mut reader, &mut file) {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            drop(file);
            let _ = fs::remove_file(path);
            Err(anyhow!(e).context(format!("writing {}", path.display())))
        }
    }
}

/// Blocking client for listings and media downloads.
pub struct RedditClient {
    agent: ureq::Agent,
    user_agent: String,
}

impl RedditClient {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            user_agent: user_agent.into(),
        }
    }

    pub fn fetch_posts(&self, subreddit: &str, kind: &str, limit: usize) -> Result<Vec<Post>> {
        let url = listing_url(subreddit, kind, limit);
        info!(%url, "fetching posts");
        let body = self
            .agent
            .get(&url)
            .set("User-Agent", &self.user_agent)
            .call()
            .with_context(|| format!("requesting {}", url))?
            .into_string()
            .with_context(|| format!("reading {}", url))?;
        parse_listing(&body)
    }

    /// Downloads `url` into `dir`, named after the last path segment.
    pub fn download(&self, url: &str, dir: &Path) -> Result<PathBuf> {
        let name = file_name_for(url).ok_or_else(|| anyhow!("no file name in {}", url))?;
        let response = match self.agent.get(url).set("User-Agent", &self.user_agent).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(anyhow!("failed to download {}: HTTP {}", url, code)),
            Err(e) => return Err(anyhow!(e).context(format!("requesting {}", url))),
        };
        if response.status() != 200 {
            return Err(anyhow!("failed to download {}: HTTP {}", url, response.status()));
        }

        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(name);
        let bytes = save_to(response.into_reader(), &path)?;
        debug!(%url, bytes, path = %path.display(), "downloaded");
        Ok(path)
    }
}
