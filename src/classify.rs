use url::Url;

/// How an upstream response body is handled: rewritten as text or streamed
/// through byte for byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Html,
    Css,
    Hls,
    Passthrough,
}

impl Classification {
    /// Decide from the upstream content type. When the upstream sends none,
    /// fall back to guessing from the target path extension.
    pub fn from_content_type(content_type: Option<&str>, target: &Url) -> Self {
        match content_type {
            Some(ct) => Self::from_mime(ct),
            None => mime_guess::from_path(target.path())
                .first_raw()
                .map(Self::from_mime)
                .unwrap_or(Self::Passthrough),
        }
    }

    fn from_mime(content_type: &str) -> Self {
        let ct = content_type.to_ascii_lowercase();
        if ct.contains("text/html") {
            Self::Html
        } else if ct.contains("text/css") {
            Self::Css
        } else if ct.contains("javascript") {
            // Text substitution over scripts is unsafe; the injected runtime
            // patch intercepts script-driven requests instead.
            Self::Passthrough
        } else if ct.contains("mpegurl") {
            Self::Hls
        } else {
            Self::Passthrough
        }
    }

    pub fn is_rewrite(self) -> bool {
        !matches!(self, Self::Passthrough)
    }
}
