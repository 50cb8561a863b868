//! Comma-separated AT parameter lists.
//!
//! `1,"TCP","host,with,commas",80` → `1`, `"TCP"`, `"host,with,commas"`, `80`.
//! Commas inside double quotes do not split. Fields keep their quotes;
//! use [`unquote`] when the bare text is wanted.

use core::str::FromStr;

/// Iterator over the raw fields of a parameter list.
pub struct Fields<'a> {
    rest: Option<&'a str>,
}

impl<'a> Fields<'a> {
    pub fn new(params: &'a str) -> Self {
        Self { rest: Some(params) }
    }

    /// Everything not yet returned, starting at the next field.
    pub fn remainder(&self) -> Option<&'a str> {
        self.rest
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let rest = self.rest?;
        let mut in_quotes = false;
        for (i, c) in rest.char_indices() {
            match c {
                '"' => in_quotes = !in_quotes,
                ',' if !in_quotes => {
                    self.rest = Some(&rest[i + 1..]);
                    return Some(rest[..i].trim());
                }
                _ => {}
            }
        }
        self.rest = None;
        Some(rest.trim())
    }
}

/// Split `params` into fields.
pub fn split(params: &str) -> Fields<'_> {
    Fields::new(params)
}

/// Strip one pair of surrounding double quotes, if present.
pub fn unquote(field: &str) -> &str {
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .unwrap_or(field)
}

/// Parse a numeric field, tolerating surrounding quotes.
pub fn num<T: FromStr>(field: &str) -> Option<T> {
    unquote(field.trim()).parse().ok()
}

/// `+CME ERROR: <n>` / `+CMS ERROR: <n>` anywhere in the line.
/// Verbose (text) error reports map to `u16::MAX`.
pub fn cme_code(line: &str) -> Option<u16> {
    let at = line
        .find("+CME ERROR:")
        .or_else(|| line.find("+CMS ERROR:"))?;
    let code = line[at + "+CME ERROR:".len()..].trim();
    Some(num(code).unwrap_or(u16::MAX))
}
