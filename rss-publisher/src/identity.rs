use crate::types::{EntryIdentifier, FeedEntry};
use interfaces::IdentitySource;
use sha2::{Digest, Sha256};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("entry '{title}' has no link, no guid and no title+timestamp to identify it by")]
    Unidentifiable { title: String },
}

/// Derive the dedup key for an entry.
///
/// Order of preference: normalised link, feed guid, then a hash over title
/// and timestamp. The hash fallback is weak (equal title and timestamp with
/// different bodies collide) and is tagged `ContentHash` so callers can flag it.
pub fn identify(entry: &FeedEntry) -> std::result::Result<EntryIdentifier, IdentityError> {
    if let Some(link) = entry.link.as_deref().and_then(normalize_link) {
        return Ok(EntryIdentifier::new(link, IdentitySource::Link));
    }

    if let Some(guid) = entry.guid.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
        return Ok(EntryIdentifier::new(guid, IdentitySource::Guid));
    }

    let title = entry.title.trim();
    match entry.published {
        Some(published) if !title.is_empty() => {
            let mut hasher = Sha256::new();
            hasher.update(title.as_bytes());
            hasher.update(b"\n");
            hasher.update(published.to_rfc3339().as_bytes());
            let digest = hex::encode(hasher.finalize());
            Ok(EntryIdentifier::new(format!("sha256:{}", digest), IdentitySource::ContentHash))
        }
        _ => Err(IdentityError::Unidentifiable {
            title: entry.title.clone(),
        }),
    }
}

/// Lower-case scheme and host, drop the fragment and any trailing slash.
///
/// Links that are not absolute URLs are kept verbatim (trimmed).
pub fn normalize_link(link: &str) -> Option<String> {
    let trimmed = link.trim();
    if trimmed.is_empty() {
        return None;
    }

    let url = match Url::parse(trimmed) {
        Ok(url) if url.has_host() => url,
        _ => return Some(trimmed.to_string()),
    };

    let mut normalized = format!("{}://", url.scheme());
    if let Some(host) = url.host_str() {
        normalized.push_str(&host.to_lowercase());
    }
    if let Some(port) = url.port() {
        normalized.push(':');
        normalized.push_str(&port.to_string());
    }
    normalized.push_str(url.path().trim_end_matches('/'));
    if let Some(query) = url.query() {
        normalized.push('?');
        normalized.push_str(query);
    }

    Some(normalized)
}
