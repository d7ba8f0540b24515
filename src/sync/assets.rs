//! Asset post-processing applied to text files before upload.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssetError {
    #[error("unterminated comment in `{path}` at byte {offset}")]
    UnterminatedComment { path: String, offset: usize },
    #[error("asset `{path}` could not be processed: {reason}")]
    Malformed { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedAsset {
    pub content: String,
}

/// Transforms asset sources before they are mirrored.
///
/// Failures never abort a sync; the original content is uploaded instead.
pub trait AssetProcessor: Send + Sync {
    fn process_asset(
        &self,
        content: &str,
        relative_path: &str,
    ) -> Result<ProcessedAsset, AssetError>;
}

/// Whether a file goes through the asset processor: CSS/JS under an
/// `assets/` folder, or any Liquid file.
pub fn is_processable_asset(relative_path: &str) -> bool {
    let in_assets = relative_path.starts_with("assets/") || relative_path.contains("/assets/");
    let script_or_style = [".css", ".css.liquid", ".js", ".js.liquid"]
        .iter()
        .any(|suffix| relative_path.ends_with(suffix));

    (in_assets && script_or_style) || relative_path.ends_with(".liquid")
}

/// Line-ending and whitespace normalization, plus comment stripping for CSS.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardAssetProcessor;

impl StandardAssetProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl AssetProcessor for StandardAssetProcessor {
    fn process_asset(
        &self,
        content: &str,
        relative_path: &str,
    ) -> Result<ProcessedAsset, AssetError> {
        let is_css = relative_path.ends_with(".css") || relative_path.ends_with(".css.liquid");
        let source = if is_css {
            strip_css_comments(content, relative_path)?
        } else {
            content.to_string()
        };

        Ok(ProcessedAsset {
            content: normalize_whitespace(&source),
        })
    }
}

fn strip_css_comments(content: &str, path: &str) -> Result<String, AssetError> {
    let mut output = String::with_capacity(content.len());
    let mut rest = content;
    let mut consumed = 0;

    while let Some(start) = rest.find("/*") {
        output.push_str(&rest[..start]);
        let body = &rest[start + 2..];
        let Some(end) = body.find("*/") else {
            return Err(AssetError::UnterminatedComment {
                path: path.to_string(),
                offset: consumed + start,
            });
        };
        let advance = start + 2 + end + 2;
        consumed += advance;
        rest = &rest[advance..];
    }
    output.push_str(rest);
    Ok(output)
}

/// CRLF to LF, trailing whitespace trimmed per line, a single final newline
/// kept when the source had one.
fn normalize_whitespace(content: &str) -> String {
    let unified = content.replace("\r\n", "\n");
    let had_final_newline = unified.ends_with('\n');

    let mut lines: Vec<&str> = unified.lines().map(str::trim_end).collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }

    let mut output = lines.join("\n");
    if had_final_newline && !output.is_empty() {
        output.push('\n');
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processable_assets() {
        assert!(is_processable_asset("assets/theme.css"));
        assert!(is_processable_asset("assets/theme.js.liquid"));
        assert!(is_processable_asset("nested/assets/app.js"));
        assert!(is_processable_asset("sections/header.liquid"));
        assert!(!is_processable_asset("templates/product.json"));
        assert!(!is_processable_asset("styles/theme.css"));
        assert!(!is_processable_asset("assets/logo.png"));
    }

    #[test]
    fn css_comments_are_stripped() {
        let processed = StandardAssetProcessor
            .process_asset("/* header */\nbody { color: red; }  \r\n", "assets/theme.css")
            .unwrap();
        assert_eq!(processed.content, "\nbody { color: red; }\n");
    }

    #[test]
    fn unterminated_comment_is_an_error() {
        let err = StandardAssetProcessor
            .process_asset("a {}\n/* open", "assets/theme.css")
            .unwrap_err();
        assert_eq!(
            err,
            AssetError::UnterminatedComment {
                path: "assets/theme.css".into(),
                offset: 5
            }
        );
    }

    #[test]
    fn liquid_keeps_comment_like_text() {
        let source = "{% comment %}/* not css */{% endcomment %}\n";
        let processed = StandardAssetProcessor
            .process_asset(source, "snippets/card.liquid")
            .unwrap();
        assert_eq!(processed.content, source);
    }

    #[test]
    fn trailing_blank_lines_collapse() {
        assert_eq!(normalize_whitespace("a\n\n\n"), "a\n");
        assert_eq!(normalize_whitespace("a"), "a");
    }
}
