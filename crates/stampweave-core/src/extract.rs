//! Serialization options carried by the marker attribute

use serde::Serialize;
use stampweave_ir::{AttrArg, CustomAttribute};

/// Effective options of one flagged property
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SerializeOptions {
    /// Format used for both directions of the conversion
    pub format: String,
    /// Keep persisting the original property next to its shadow
    pub keep_original: bool,
}

/// Read options from marker constructor arguments
///
/// Starts from `default_format` and `keep_original = false`; a string
/// argument sets the format and a boolean sets `keep_original`, in whatever
/// order they appear. Later arguments of the same kind win. The format is
/// taken as-is.
#[must_use]
pub fn extract_options(marker: &CustomAttribute, default_format: &str) -> SerializeOptions {
    let mut options = SerializeOptions {
        format: default_format.to_string(),
        keep_original: false,
    };
    for arg in &marker.args {
        match arg {
            AttrArg::String(format) => options.format.clone_from(format),
            AttrArg::Boolean(keep) => options.keep_original = *keep,
            AttrArg::Int32(_) => {}
        }
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampweave_test_utils::marker;

    const DEFAULT: &str = "yyyy-MM-dd HH:mm:ss zzzz";

    #[test]
    fn no_arguments_use_defaults() {
        let options = extract_options(&marker(&[]), DEFAULT);
        assert_eq!(options.format, DEFAULT);
        assert!(!options.keep_original);
    }

    #[test]
    fn arguments_override_by_kind() {
        let both = marker(&[AttrArg::String("yyyy-MM-dd, HH:mm:ss".into()), AttrArg::Boolean(true)]);
        let options = extract_options(&both, DEFAULT);
        assert_eq!(options.format, "yyyy-MM-dd, HH:mm:ss");
        assert!(options.keep_original);

        let keep_only = extract_options(&marker(&[AttrArg::Boolean(true)]), DEFAULT);
        assert_eq!(keep_only.format, DEFAULT);
        assert!(keep_only.keep_original);
    }

    #[test]
    fn order_does_not_matter() {
        let reversed = marker(&[AttrArg::Boolean(true), AttrArg::String("HH:mm".into())]);
        let options = extract_options(&reversed, DEFAULT);
        assert_eq!(options.format, "HH:mm");
        assert!(options.keep_original);
    }

    #[test]
    fn format_is_not_validated() {
        let odd = extract_options(&marker(&[AttrArg::String(String::new())]), DEFAULT);
        assert_eq!(odd.format, "");
    }
}
