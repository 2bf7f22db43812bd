use std::cell::{Cell, RefCell};

use lol_html::errors::RewritingError;
use lol_html::html_content::{ContentType, Element};
use lol_html::{element, text, HtmlRewriter, Settings};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::patch::CLIENT_PATCH;
use crate::translate::RewriteContext;

// Quotes stay optional here; the captured value is unquoted in code because
// the regex engine has no backreferences.
static CSS_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"url\(([^)]*)\)").unwrap());

/// Rewrite an HTML document: translate every URL-bearing attribute, strip
/// subresource-integrity hashes and CSP meta tags, rewrite inline CSS, and
/// inject the runtime patch at the top of the head.
pub fn rewrite_html(html: &str, ctx: &RewriteContext) -> Result<Vec<u8>, RewritingError> {
    let mut output = Vec::with_capacity(html.len() + CLIENT_PATCH.len());
    let injected = Cell::new(false);
    let style_buffer = RefCell::new(String::new());

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                // The patch must run before any of the page's own scripts.
                element!("head", |el| {
                    if !injected.get() {
                        injected.set(true);
                        el.prepend(CLIENT_PATCH, ContentType::Html);
                    }
                    Ok(())
                }),
                // Proxied bytes no longer match any subresource hash.
                element!("*[integrity]", |el| {
                    el.remove_attribute("integrity");
                    Ok(())
                }),
                element!("meta[http-equiv]", |el| {
                    let equiv = el.get_attribute("http-equiv").unwrap_or_default();
                    if equiv.eq_ignore_ascii_case("content-security-policy")
                        || equiv.eq_ignore_ascii_case("content-security-policy-report-only")
                    {
                        el.remove();
                    }
                    Ok(())
                }),
                element!("*[href]", |el| {
                    rewrite_attribute(el, "href", ctx);
                    Ok(())
                }),
                element!("*[src]", |el| {
                    rewrite_attribute(el, "src", ctx);
                    Ok(())
                }),
                element!("form[action]", |el| {
                    rewrite_attribute(el, "action", ctx);
                    Ok(())
                }),
                element!("*[poster]", |el| {
                    rewrite_attribute(el, "poster", ctx);
                    Ok(())
                }),
                element!("*[data-src]", |el| {
                    rewrite_attribute(el, "data-src", ctx);
                    Ok(())
                }),
                element!("*[srcset]", |el| {
                    if let Some(srcset) = el.get_attribute("srcset") {
                        let _ = el.set_attribute("srcset", &rewrite_srcset(&srcset, ctx));
                    }
                    Ok(())
                }),
                element!("*[style]", |el| {
                    if let Some(style) = el.get_attribute("style") {
                        if style.contains("url(") {
                            let _ = el.set_attribute("style", &rewrite_css(&style, ctx));
                        }
                    }
                    Ok(())
                }),
                // Style text arrives in chunks; buffer until the node ends.
                text!("style", |chunk| {
                    let mut buffer = style_buffer.borrow_mut();
                    buffer.push_str(chunk.as_str());
                    if chunk.last_in_text_node() {
                        chunk.replace(&rewrite_css(buffer.as_str(), ctx), ContentType::Html);
                        buffer.clear();
                    } else {
                        chunk.remove();
                    }
                    Ok(())
                }),
            ],
            ..Settings::default()
        },
        |chunk: &[u8]| output.extend_from_slice(chunk),
    );

    rewriter.write(html.as_bytes())?;
    rewriter.end()?;

    if !injected.get() {
        // No head in the document: fall back to putting the patch first.
        let mut with_patch = Vec::with_capacity(output.len() + CLIENT_PATCH.len());
        with_patch.extend_from_slice(CLIENT_PATCH.as_bytes());
        with_patch.extend_from_slice(&output);
        return Ok(with_patch);
    }
    Ok(output)
}

fn rewrite_attribute(el: &mut Element, attribute: &str, ctx: &RewriteContext) {
    if let Some(value) = el.get_attribute(attribute) {
        if let Some(proxied) = ctx.rewrite(&value) {
            // set_attribute only fails on an invalid attribute name, and the
            // name came from the document itself.
            let _ = el.set_attribute(attribute, &proxied);
        }
    }
}

/// Rewrite every `url(...)` token in a stylesheet or style attribute,
/// preserving the original quoting.
pub fn rewrite_css(css: &str, ctx: &RewriteContext) -> String {
    CSS_URL
        .replace_all(css, |caps: &regex::Captures| {
            let inner = caps[1].trim();
            let (quote, raw) = match inner.chars().next() {
                Some('\'') => ("'", inner.trim_matches('\'')),
                Some('"') => ("\"", inner.trim_matches('"')),
                _ => ("", inner),
            };
            match ctx.rewrite(raw) {
                Some(proxied) => format!("url({quote}{proxied}{quote})"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Rewrite a srcset list: each comma-separated entry is a URL followed by an
/// optional width or density descriptor that must survive unchanged.
pub fn rewrite_srcset(srcset: &str, ctx: &RewriteContext) -> String {
    srcset
        .split(',')
        .map(|entry| {
            let entry = entry.trim();
            let mut parts = entry.splitn(2, char::is_whitespace);
            let candidate = parts.next().unwrap_or("");
            let descriptor = parts.next().map(str::trim).unwrap_or("");
            let rewritten = ctx
                .rewrite(candidate)
                .unwrap_or_else(|| candidate.to_string());
            if descriptor.is_empty() {
                rewritten
            } else {
                format!("{rewritten} {descriptor}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rewrite an HLS playlist. Non-empty lines not starting with `#` are
/// segment or sub-playlist URLs. Tag lines pass through untouched, including
/// the ones that embed URIs in their attributes (#EXT-X-KEY and friends).
pub fn rewrite_hls(manifest: &str, ctx: &RewriteContext) -> String {
    let mut out = manifest
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                line.to_string()
            } else {
                ctx.rewrite(trimmed).unwrap_or_else(|| line.to_string())
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    if manifest.ends_with('\n') {
        out.push('\n');
    }
    out
}
