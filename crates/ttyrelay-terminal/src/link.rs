use tracing::info;
use url::Url;

/// Stand-in target for links that do not parse as absolute URIs.
pub const INVALID_LINK: &str = "http:invalid-URI-syntax-in-link";

/// Opens links the user activated in the renderer.
pub trait LinkOpener: Send + Sync {
    fn open(&self, uri: &str) -> anyhow::Result<()>;
}

/// Only records the request.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLinkOpener;

impl LinkOpener for LogLinkOpener {
    fn open(&self, uri: &str) -> anyhow::Result<()> {
        info!(uri, "link requested");
        Ok(())
    }
}

/// The link to open for an `ALINK` target: itself if it is a valid absolute
/// URI, otherwise [`INVALID_LINK`].
pub fn checked_link(href: &str) -> &str {
    match Url::parse(href) {
        Ok(_) => href,
        Err(_) => INVALID_LINK,
    }
}
