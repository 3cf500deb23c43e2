//! File name derivation shared by the driver, the sinks and the snapshotter.
//!
//! Every derived name is bounded by [`MAX_PATH_LEN`] bytes.

use crate::error::{SiftError, SiftResult};
use std::path::Path;

/// Names must stay strictly below this many bytes
pub const MAX_PATH_LEN: usize = 1024;

fn bounded(name: String) -> SiftResult<String> {
    if name.len() >= MAX_PATH_LEN {
        return Err(SiftError::PathOverflow(format!(
            "{}... ({} bytes)",
            name.chars().take(32).collect::<String>(),
            name.len()
        )));
    }
    Ok(name)
}

/// Final path component with one extension stripped.
///
/// Names that are not valid UTF-8 are rejected rather than rewritten.
pub fn base_name(path: &Path) -> SiftResult<String> {
    let stem = match path.file_stem() {
        Some(stem) => stem.to_str().ok_or_else(|| not_unicode(path))?,
        None => "",
    };
    bounded(stem.to_string())
}

/// `path` as UTF-8 text, as written into derived names and the meta file
pub fn path_text(path: &Path) -> SiftResult<&str> {
    path.to_str().ok_or_else(|| not_unicode(path))
}

fn not_unicode(path: &Path) -> SiftError {
    SiftError::Config(format!("'{}' is not a valid UTF-8 file name", path.display()))
}

/// `base` followed by `suffix`
pub fn sibling_name(base: &str, suffix: &str) -> SiftResult<String> {
    bounded(format!("{}{}", base, suffix))
}

/// Replace every `%` of `pattern` with `base`; `\` makes the next character literal.
pub fn expand_pattern(pattern: &str, base: &str) -> SiftResult<String> {
    let mut out = String::with_capacity(pattern.len() + base.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(base),
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            _ => out.push(c),
        }
        if out.len() >= MAX_PATH_LEN {
            break;
        }
    }
    bounded(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::PathBuf;

    #[test]
    fn test_base_name_strips_directory_and_one_extension() {
        assert_eq!(base_name(Path::new("data/img.pgm")).unwrap(), "img");
        assert_eq!(base_name(Path::new("/tmp/a.b.pgm")).unwrap(), "a.b");
        assert_eq!(base_name(Path::new("plain")).unwrap(), "plain");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_unicode_names_are_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new(OsStr::from_bytes(b"dir/im\xffg.pgm"));
        assert!(matches!(base_name(path), Err(SiftError::Config(_))));
        assert!(matches!(path_text(path), Err(SiftError::Config(_))));
        assert_eq!(path_text(Path::new("dir/img.pgm")).unwrap(), "dir/img.pgm");
    }

    #[test]
    fn test_base_name_overflow() {
        let long = PathBuf::from(format!("{}.pgm", "x".repeat(MAX_PATH_LEN)));
        assert!(matches!(base_name(&long), Err(SiftError::PathOverflow(_))));
    }

    #[test]
    fn test_expand_pattern() {
        assert_eq!(expand_pattern("%.frame", "img").unwrap(), "img.frame");
        assert_eq!(expand_pattern("out/%-%.d", "a").unwrap(), "out/a-a.d");
        assert_eq!(expand_pattern("fixed.txt", "img").unwrap(), "fixed.txt");
    }

    #[test]
    fn test_expand_pattern_escapes() {
        assert_eq!(expand_pattern("100\\%_%", "img").unwrap(), "100%_img");
        assert_eq!(expand_pattern("a\\\\b", "img").unwrap(), "a\\b");
        assert_eq!(expand_pattern("trailing\\", "img").unwrap(), "trailing");
    }

    #[test]
    fn test_expand_pattern_overflow() {
        let base = "b".repeat(600);
        assert!(expand_pattern("%", &base).is_ok());
        assert!(matches!(expand_pattern("%%", &base), Err(SiftError::PathOverflow(_))));
    }

    #[test]
    fn test_sibling_name() {
        assert_eq!(sibling_name("img", "_00_001").unwrap(), "img_00_001");
        assert!(sibling_name(&"n".repeat(1020), "_00_001").is_err());
    }

    proptest! {
        #[test]
        fn prop_pattern_without_specials_is_literal(p in "[a-zA-Z0-9_./-]{0,64}", base in "[a-z]{1,16}") {
            prop_assert_eq!(expand_pattern(&p, &base).unwrap(), p);
        }

        #[test]
        fn prop_each_percent_becomes_base(n in 0usize..8, base in "[a-z]{1,16}") {
            let pattern = "%".repeat(n);
            prop_assert_eq!(expand_pattern(&pattern, &base).unwrap(), base.repeat(n));
        }
    }
}
