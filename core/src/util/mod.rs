use regex_syntax::hir::Hir;

/// Wrap a user supplied pattern so matching requires the *whole* string to match,
/// mirroring AQL's `=~` semantics (a partial match is not enough).
pub fn regex_full_match(pattern: &str) -> String {
    let mut full_match_pattern = String::with_capacity(pattern.len() + 6);
    full_match_pattern.push_str(r"\A(");
    full_match_pattern.push_str(pattern);
    full_match_pattern.push_str(r")\z");
    full_match_pattern
}

/// The longest length of a literal prefix we are willing to derive from a regular
/// expression when narrowing an index scan. Keeps estimation cheap for patterns
/// with many alternatives.
const MAX_REGEX_PREFIX_LEN: usize = 10;

/// Derive a `[min, max]` string range that is guaranteed to contain every string
/// matched by `pattern`. Used to narrow both [`crate::stringstorage::StringStorage::find_regex`]
/// and annotation value histograms to a prefix range instead of a full scan.
///
/// Returns `None` if `pattern` fails to compile; the caller should treat this the
/// same way as "no matches", never as a hard error.
pub fn regex_match_range(pattern: &str) -> Option<(String, String)> {
    let full_pattern = regex_full_match(pattern);
    let hir = regex_syntax::Parser::new().parse(&full_pattern).ok()?;

    let prefix = literal_prefix(&hir);
    let mut prefix: String = prefix.chars().take(MAX_REGEX_PREFIX_LEN).collect();
    if prefix.is_empty() {
        return None;
    }
    let mut upper = prefix.clone();
    // bump the last character so that `upper` sorts after every string with this prefix
    if let Some(last) = upper.pop() {
        if let Some(next) = std::char::from_u32(last as u32 + 1) {
            upper.push(next);
        } else {
            upper.push(last);
            upper.push(std::char::MAX);
        }
    } else {
        upper.push(std::char::MAX);
    }
    prefix.push(std::char::from_u32(0).unwrap_or('\0'));
    Some((prefix, upper))
}

/// Extract the longest guaranteed-literal prefix from a parsed regex, descending
/// into concatenations only. Anything else (alternation, repetition, classes) ends
/// the prefix.
fn literal_prefix(hir: &Hir) -> String {
    use regex_syntax::hir::HirKind;

    let mut result = String::new();
    collect_prefix(hir, &mut result);
    result
}

fn collect_prefix(hir: &Hir, out: &mut String) -> bool {
    use regex_syntax::hir::HirKind;
    match hir.kind() {
        HirKind::Literal(regex_syntax::hir::Literal::Unicode(c)) => {
            out.push(*c);
            true
        }
        HirKind::Concat(parts) => {
            for p in parts {
                if !collect_prefix(p, out) {
                    return false;
                }
            }
            true
        }
        HirKind::Group(g) => collect_prefix(&g.hir, out),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_match_wraps_pattern() {
        assert_eq!(regex_full_match("abc"), r"\A(abc)\z");
    }

    #[test]
    fn prefix_of_literal_concat() {
        let (lower, upper) = regex_match_range("Bilh.*").unwrap();
        assert!(lower.starts_with("Bilh"));
        assert!(upper > lower);
    }

    #[test]
    fn invalid_pattern_has_no_range() {
        assert!(regex_match_range("(unterminated").is_none());
    }
}
