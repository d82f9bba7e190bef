//! Underscore slug assembly for package and artifact names.

use std::collections::BTreeMap;

/// Join the non-empty tokens with underscores.
pub fn join(parts: &[&str]) -> String {
  parts
    .iter()
    .filter(|part| !part.is_empty())
    .copied()
    .collect::<Vec<_>>()
    .join("_")
}

/// Expand `{key}` placeholders in a param-slug template.
///
/// Keys without a matching effective parameter expand to the empty string;
/// the slug is cosmetic, the params hash carries the identity.
pub fn expand_template(template: &str, params: &BTreeMap<String, String>) -> String {
  let mut out = String::new();
  let mut rest = template;
  while let Some(start) = rest.find('{') {
    out.push_str(&rest[..start]);
    match rest[start..].find('}') {
      Some(offset) => {
        let key = &rest[start + 1..start + offset];
        if let Some(value) = params.get(key) {
          out.push_str(value);
        }
        rest = &rest[start + offset + 1..];
      }
      None => {
        // Unterminated placeholder: keep the literal text.
        out.push_str(&rest[start..]);
        rest = "";
      }
    }
  }
  out.push_str(rest);
  out
}
