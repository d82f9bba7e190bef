//! HTML link-listing indexes.
//!
//! An index is an HTTP-served HTML page whose anchor tags double as a flat
//! registry: `<name>.whack-source` links point at source tarballs and
//! `<name>_<os>_<arch>_<libc>_<paramsHash>.whack-package` links point at
//! prebuilt artifacts.

use tracing::debug;
use url::Url;
use whack_platform::Platform;

use crate::consts::{PACKAGE_SUFFIX, SOURCE_SUFFIX};
use crate::http::HttpClient;
use crate::{Result, WhackError};

/// One anchor from an index page: the declared link text and the resolved
/// absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
  pub name: String,
  pub url: String,
}

impl IndexEntry {
  /// Final path segment of the resolved URL.
  fn url_filename(&self) -> &str {
    self.url.trim_end_matches('/').rsplit('/').next().unwrap_or("")
  }

  /// Matching tries the link text first, then the URL's final segment.
  fn matches(&self, target: &str) -> bool {
    self.name == target || self.url_filename() == target
  }

  /// The filename whose grammar decides what kind of entry this is.
  fn artifact_filename(&self) -> &str {
    if self.name.ends_with(SOURCE_SUFFIX) || self.name.ends_with(PACKAGE_SUFFIX) {
      &self.name
    } else {
      self.url_filename()
    }
  }
}

/// A fetched-and-parsed package index.
pub struct Index {
  entries: Vec<IndexEntry>,
}

impl Index {
  /// Fetch the link listing at `url` and parse it.
  pub fn fetch(http: &HttpClient, url: &str) -> Result<Self> {
    let html = http.get_text(url)?;
    Self::parse(url, &html)
  }

  /// Parse an HTML link listing, resolving every href against `base_url`
  /// (absolute, domain-relative and relative hrefs all work).
  pub fn parse(base_url: &str, html: &str) -> Result<Self> {
    let base = Url::parse(base_url).map_err(|e| WhackError::Download {
      url: base_url.to_string(),
      message: format!("invalid index URL: {e}"),
    })?;

    let mut entries = Vec::new();
    for (text, href) in anchors(html) {
      match base.join(&href) {
        Ok(resolved) => entries.push(IndexEntry {
          name: text,
          url: resolved.to_string(),
        }),
        Err(_) => debug!(href = %href, "ignoring unresolvable link"),
      }
    }
    Ok(Self { entries })
  }

  /// Find the source entry published as `<name>.whack-source`.
  pub fn find_package_source_by_name(&self, name: &str) -> Option<&IndexEntry> {
    let target = format!("{}{}", name, SOURCE_SUFFIX);
    self.entries.iter().find(|entry| entry.matches(&target))
  }

  /// Find a prebuilt package with the given params hash that the requesting
  /// platform can use.
  pub fn find_package(&self, params_hash: &str, platform: &Platform) -> Option<&IndexEntry> {
    self.entries.iter().find(|entry| {
      match parse_package_filename(entry.artifact_filename()) {
        Some((entry_platform, entry_hash)) => {
          entry_hash == params_hash && platform.can_use(&entry_platform)
        }
        None => false,
      }
    })
  }
}

/// Decompose `<name…>_<os>_<arch>_<libc>_<paramsHash>.whack-package`.
///
/// Filenames without the suffix, or with fewer than the four trailing
/// tokens, are ignored.
fn parse_package_filename(filename: &str) -> Option<(Platform, &str)> {
  let stem = filename.strip_suffix(PACKAGE_SUFFIX)?;
  let tokens: Vec<&str> = stem.split('_').collect();
  if tokens.len() < 4 {
    return None;
  }
  let trailing = &tokens[tokens.len() - 4..];
  let platform = Platform::load_list(&trailing[..3])?;
  Some((platform, trailing[3]))
}

/// Extract `(link text, href)` pairs from the anchor tags of an HTML page.
///
/// Index pages are flat link listings; this scanner handles exactly that
/// shape: `<a>` tags with an href attribute and plain text between the tags.
fn anchors(html: &str) -> Vec<(String, String)> {
  // ASCII lowering keeps byte offsets aligned with the original text.
  let lower = html.to_ascii_lowercase();
  let mut links = Vec::new();
  let mut at = 0;

  while let Some(offset) = lower[at..].find("<a") {
    let open = at + offset;
    // Require a real anchor tag, not <abbr> etc.
    match lower.as_bytes().get(open + 2) {
      Some(b' ' | b'\t' | b'\n' | b'\r' | b'>') => {}
      _ => {
        at = open + 2;
        continue;
      }
    }
    let Some(tag_offset) = lower[open..].find('>') else {
      break;
    };
    let tag_end = open + tag_offset;
    let tag = &html[open..tag_end];
    at = tag_end + 1;

    let Some(href) = attribute(tag, "href") else {
      continue;
    };
    let text_end = match lower[at..].find("</a") {
      Some(close) => at + close,
      None => html.len(),
    };
    let text = html[at..text_end].trim().to_string();
    at = text_end;

    links.push((text, href));
  }

  links
}

/// Pull a (possibly quoted) attribute value out of a tag.
fn attribute(tag: &str, name: &str) -> Option<String> {
  let lower = tag.to_ascii_lowercase();
  let at = lower.find(&format!("{name}="))? + name.len() + 1;
  let rest = &tag[at..];
  match rest.chars().next()? {
    quote @ ('"' | '\'') => {
      let value = &rest[1..];
      let end = value.find(quote)?;
      Some(value[..end].to_string())
    }
    _ => {
      let end = rest
        .find(|c: char| c.is_whitespace() || c == '>')
        .unwrap_or(rest.len());
      Some(rest[..end].to_string())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const BASE: &str = "https://pkgs.example.com/whack/index.html";

  #[test]
  fn hrefs_resolve_against_the_index_base() {
    let html = r#"
      <html><body>
        <a href="nginx.whack-source">nginx.whack-source</a>
        <a href="/absolute/zlib.whack-source">zlib.whack-source</a>
        <a href="https://mirror.example.org/curl.whack-source">curl.whack-source</a>
      </body></html>
    "#;
    let index = Index::parse(BASE, html).unwrap();

    assert_eq!(
      index.find_package_source_by_name("nginx").unwrap().url,
      "https://pkgs.example.com/whack/nginx.whack-source"
    );
    assert_eq!(
      index.find_package_source_by_name("zlib").unwrap().url,
      "https://pkgs.example.com/absolute/zlib.whack-source"
    );
    assert_eq!(
      index.find_package_source_by_name("curl").unwrap().url,
      "https://mirror.example.org/curl.whack-source"
    );
  }

  #[test]
  fn source_match_falls_back_to_url_filename() {
    let html = r#"<a href="downloads/nginx.whack-source">nginx source</a>"#;
    let index = Index::parse(BASE, html).unwrap();
    assert!(index.find_package_source_by_name("nginx").is_some());
    assert!(index.find_package_source_by_name("zlib").is_none());
  }

  #[test]
  fn package_match_requires_hash_and_compatible_platform() {
    let html = r#"<a href="foo_linux_x86-64_glibc-2.12_ab12.whack-package">foo_linux_x86-64_glibc-2.12_ab12.whack-package</a>"#;
    let index = Index::parse(BASE, html).unwrap();

    let newer = Platform::new("linux", "x86-64", "glibc-2.13");
    let older = Platform::new("linux", "x86-64", "glibc-2.11");

    assert!(index.find_package("ab12", &newer).is_some());
    assert!(index.find_package("ab12", &older).is_none());
    assert!(index.find_package("cd34", &newer).is_none());
  }

  #[test]
  fn glibc_2_14_also_uses_a_2_12_package() {
    let html = r#"<a href="foo_linux_x86-64_glibc-2.12_ab12.whack-package">foo_linux_x86-64_glibc-2.12_ab12.whack-package</a>"#;
    let index = Index::parse(BASE, html).unwrap();
    let host = Platform::new("linux", "x86-64", "glibc-2.14");
    assert!(index.find_package("ab12", &host).is_some());
  }

  #[test]
  fn package_names_with_param_slugs_still_decompose() {
    let html = r#"<a href="nginx_1.2_linux_x86-64_glibc-2.12_ab12.whack-package">nginx 1.2</a>"#;
    let index = Index::parse(BASE, html).unwrap();
    let host = Platform::new("linux", "x86-64", "glibc-2.12");
    assert!(index.find_package("ab12", &host).is_some());
  }

  #[test]
  fn short_package_filenames_are_ignored() {
    let html = r#"<a href="odd_ab12.whack-package">odd_ab12.whack-package</a>"#;
    let index = Index::parse(BASE, html).unwrap();
    let host = Platform::new("linux", "x86-64", "glibc-2.12");
    assert!(index.find_package("ab12", &host).is_none());
  }

  #[test]
  fn anchors_handle_attributes_and_casing() {
    let html = r#"<A CLASS="link" HREF='pkg.whack-source'>pkg.whack-source</A>"#;
    let index = Index::parse(BASE, html).unwrap();
    assert!(index.find_package_source_by_name("pkg").is_some());
  }

  #[test]
  fn non_anchor_tags_are_skipped() {
    let html = r#"<abbr href="nope.whack-source">x</abbr><a href="yes.whack-source">yes.whack-source</a>"#;
    let index = Index::parse(BASE, html).unwrap();
    assert!(index.find_package_source_by_name("nope").is_none());
    assert!(index.find_package_source_by_name("yes").is_some());
  }
}
