//! Splitting a source file into its preface and body segments.

use core::ops::Range;

/// The token which separates the preface of a file from its body.
pub const PREFACE_MARKER: &str = ";;;";

/// The segments of a single source file as byte ranges into its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segments {
    /// The preface, present only if the file contains a preface marker.
    pub preface: Option<Range<usize>>,
    /// The body of the file.
    pub body: Range<usize>,
}

/// Split `source` at the first [`PREFACE_MARKER`] token.
///
/// Markers inside of string literals or line comments are ignored, and a
/// marker only counts when it isn't part of a longer run of semicolons.
pub fn segment(source: &str) -> Segments {
    match find_marker(source) {
        Some(at) => Segments {
            preface: Some(0..at),
            body: at + PREFACE_MARKER.len()..source.len(),
        },
        None => Segments {
            preface: None,
            body: 0..source.len(),
        },
    }
}

fn find_marker(source: &str) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut n = 0;

    while n < bytes.len() {
        match bytes[n] {
            b'"' => {
                n += 1;

                while n < bytes.len() && bytes[n] != b'"' {
                    if bytes[n] == b'\\' {
                        n += 1;
                    }

                    n += 1;
                }

                n += 1;
            }
            b'/' if bytes.get(n + 1) == Some(&b'/') => {
                while n < bytes.len() && bytes[n] != b'\n' {
                    n += 1;
                }
            }
            b';' => {
                let start = n;

                while n < bytes.len() && bytes[n] == b';' {
                    n += 1;
                }

                if n - start == PREFACE_MARKER.len() {
                    return Some(start);
                }
            }
            _ => {
                n += 1;
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::{segment, Segments};

    #[test]
    fn body_only() {
        let source = "export a = 1;";
        assert_eq!(
            segment(source),
            Segments {
                preface: None,
                body: 0..source.len(),
            }
        );
    }

    #[test]
    fn preface_and_body() {
        let source = "export shared = 1;\n;;;\nexport a = 2;\n";
        let segments = segment(source);

        let preface = segments.preface.clone().expect("preface");
        assert_eq!(&source[preface], "export shared = 1;\n");
        assert_eq!(&source[segments.body], "\nexport a = 2;\n");
    }

    #[test]
    fn ignores_strings_and_comments() {
        let source = "let a = \";;;\";\n// ;;;\nexport b = a;";
        assert_eq!(segment(source).preface, None);

        let source = "let a = 1;;;;\n";
        assert_eq!(segment(source).preface, None);
    }
}
