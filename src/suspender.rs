/// Recovering the real URL from tabs rewritten by tab-suspender extensions
///
/// Suspenders (The Great Suspender, The Marvellous Suspender, Auto Tab Discard, ...)
/// replace a tab's page with one of their own packaged pages and carry the original
/// address in a `uri` parameter, e.g.
/// `chrome-extension://<id>/suspended.html#ttl=Title&pos=0&uri=https://example.com`.
use std::sync::LazyLock;

use regex::Regex;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::NormalizeError;

const SUSPENDED_PAGE_MARKER: &str = "suspended.html#";

static PACKAGED_SUSPENDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:chrome|moz)-extension://[^/]*/.*suspended").expect("suspender pattern is valid")
});

/// Return the URL a suspended tab stands for, or `url` itself.
///
/// Never fails: anything that cannot be unwrapped is treated as an ordinary URL.
pub fn normalize_url(url: &str) -> String {
    match unwrap_suspended(url) {
        Ok(real) => real,
        Err(NormalizeError::NotSuspended) => url.to_string(),
        Err(err) => {
            log::debug!("Keeping URL as-is ({}): {}", err, url);
            url.to_string()
        }
    }
}

/// Extract the wrapped URL from a suspender page address.
///
/// The `uri` value is percent-decoded exactly once. An empty value is an error.
pub fn unwrap_suspended(url: &str) -> Result<String, NormalizeError> {
    let mut outcome = Err(NormalizeError::NotSuspended);

    if url.contains(SUSPENDED_PAGE_MARKER) {
        // Only the text between the first and second '#' holds the parameters
        let fragment = url.split('#').nth(1).unwrap_or_default();
        outcome = uri_param(fragment);
        if outcome.is_ok() {
            return outcome;
        }
    }

    if PACKAGED_SUSPENDER.is_match(url) {
        outcome = packaged_uri(url);
    }

    outcome
}

/// Look up `uri` in an `a=b&c=d` parameter string.
///
/// `+` reads as a space. The value must decode to valid UTF-8; nothing is
/// substituted for bad bytes.
fn uri_param(params: &str) -> Result<String, NormalizeError> {
    let raw = params
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(key, _)| *key == "uri")
        .map(|(_, value)| value)
        .ok_or(NormalizeError::MissingUri)?;

    if raw.is_empty() {
        return Err(NormalizeError::EmptyUri);
    }

    let spaced = raw.replace('+', " ");
    let value = percent_decode_str(&spaced)
        .decode_utf8()
        .map_err(|e| NormalizeError::MalformedUri(e.to_string()))?;
    Ok(value.into_owned())
}

/// Suspender pages that carry `uri` in the query string, or failing that the fragment
fn packaged_uri(url: &str) -> Result<String, NormalizeError> {
    let parsed = Url::parse(url).map_err(|e| NormalizeError::MalformedUrl(e.to_string()))?;

    if let Some(Ok(real)) = parsed.query().map(uri_param) {
        return Ok(real);
    }

    parsed
        .fragment()
        .map(uri_param)
        .unwrap_or(Err(NormalizeError::MissingUri))
}
