use crate::dom::FetchedFile;
use crate::error::{Result, TakeoutError};
use base64::Engine;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Direct fetch of a download URL, outside the page
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchedFile>;
}

/// Supplies the `Cookie` header for a request
pub trait CookieSource: Send + Sync {
    fn cookie_header(&self, url: &Url) -> Result<Option<String>>;
}

/// Decode a `data:` URL (base64 or percent-encoded)
pub fn decode_data_url(url: &str) -> Result<FetchedFile> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| TakeoutError::InvalidArgument("not a data URL".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| TakeoutError::InvalidArgument("data URL has no payload".to_string()))?;

    let is_base64 = meta.ends_with(";base64");
    let mime = meta.trim_end_matches(";base64");
    let mime = (!mime.is_empty()).then(|| mime.to_string());

    let bytes = if is_base64 {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| TakeoutError::InvalidArgument(format!("bad base64 in data URL: {}", e)))?
    } else {
        urlencoding::decode_binary(payload.as_bytes()).into_owned()
    };
    Ok(FetchedFile { mime, bytes })
}

/// Build a base64 `data:` URL
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// HTTP(S) fetcher backed by `reqwest`'s blocking client.
///
/// Requests run on a short-lived thread so the fetcher can be called from
/// inside an async runtime.
pub struct HttpFetcher {
    timeout: Duration,
    user_agent: String,
    cookies: Option<Box<dyn CookieSource>>,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            user_agent: format!("notebook-takeout/{}", env!("CARGO_PKG_VERSION")),
            cookies: None,
        }
    }

    /// Builder method: set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder method: attach cookies from `source` to every request
    pub fn with_cookies(mut self, source: impl CookieSource + 'static) -> Self {
        self.cookies = Some(Box::new(source));
        self
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedFile> {
        if url.starts_with("data:") {
            return decode_data_url(url);
        }

        let parsed = Url::parse(url).map_err(|e| TakeoutError::InvalidArgument(format!("{}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TakeoutError::Fetch(format!("cannot fetch {} directly", parsed.scheme())));
        }

        let cookie = match &self.cookies {
            Some(source) => source.cookie_header(&parsed)?,
            None => None,
        };
        let timeout = self.timeout;
        let user_agent = self.user_agent.clone();

        log::debug!("Fetching {}", parsed);
        let handle = std::thread::spawn(move || -> Result<FetchedFile> {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .user_agent(user_agent)
                .build()
                .map_err(|e| TakeoutError::Fetch(format!("HTTP client: {}", e)))?;

            let mut request = client.get(parsed.clone());
            if let Some(cookie) = cookie {
                request = request.header(reqwest::header::COOKIE, cookie);
            }

            let response = request
                .send()
                .map_err(|e| TakeoutError::Fetch(format!("{}: {}", parsed, e)))?;
            let status = response.status();
            if !status.is_success() {
                return Err(TakeoutError::Fetch(format!("HTTP {} for {}", status, parsed)));
            }

            let mime = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let bytes = response
                .bytes()
                .map_err(|e| TakeoutError::Fetch(format!("reading {}: {}", parsed, e)))?;
            Ok(FetchedFile {
                mime,
                bytes: bytes.to_vec(),
            })
        });

        handle
            .join()
            .map_err(|_| TakeoutError::Fetch("fetch thread panicked".to_string()))?
    }
}

/// Fetcher answering from a fixed table of URLs; records every request
#[derive(Default)]
pub struct StaticFetcher {
    files: HashMap<String, FetchedFile>,
    requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: serve `bytes` for `url`
    pub fn serve(mut self, url: &str, mime: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.files.insert(
            url.to_string(),
            FetchedFile {
                mime: Some(mime.to_string()),
                bytes: bytes.into(),
            },
        );
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedFile> {
        self.requests.lock().push(url.to_string());
        if url.starts_with("data:") {
            return decode_data_url(url);
        }
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| TakeoutError::Fetch(format!("HTTP 404 for {}", url)))
    }
}
