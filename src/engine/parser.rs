//! Line parser for hosts-style and plain domain lists.

/// Extracts the domain from a single list line.
///
/// `0.0.0.0 ads.example.com` yields the second field, `ads.example.com`
/// yields itself. Blank lines and `#` comments yield nothing. The token is
/// not validated as a domain name.
pub fn parse_line(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut fields = line.split_whitespace();
    let first = fields.next()?;
    Some(fields.next().unwrap_or(first))
}

/// Lazily yields the domains of a whole list file, in file order.
pub fn parse_domains(text: &str) -> impl Iterator<Item = &str> + '_ {
    text.lines().filter_map(parse_line)
}
