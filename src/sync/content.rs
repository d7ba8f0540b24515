//! Content-type detection for mirrored files.

use std::path::Path;

use mime_guess::mime;

/// Theme source formats the general MIME table does not know.
fn template_content_type(extension: &str) -> Option<&'static str> {
    match extension {
        "liquid" => Some("application/liquid"),
        "scss" => Some("text/scss"),
        "sass" => Some("text/sass"),
        "md" => Some("text/markdown"),
        _ => None,
    }
}

/// MIME type of a file, from its extension.
pub fn content_type(path: &str) -> String {
    let extension = Path::new(path)
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase);

    if let Some(known) = extension.as_deref().and_then(template_content_type) {
        return known.to_string();
    }

    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Whether a file of this type must be uploaded as opaque bytes.
pub fn is_binary_content_type(content_type: &str) -> bool {
    let Ok(parsed) = content_type.parse::<mime::Mime>() else {
        return true;
    };

    let top = parsed.type_();
    if top == mime::IMAGE || top == mime::VIDEO || top == mime::AUDIO || top == mime::FONT {
        return true;
    }

    let subtype = parsed.subtype();
    top == mime::APPLICATION
        && (subtype == mime::OCTET_STREAM
            || subtype == mime::PDF
            || subtype == "zip"
            || subtype.as_str().starts_with("vnd."))
}

/// Whether a file path denotes binary content.
pub fn is_binary_path(path: &str) -> bool {
    is_binary_content_type(&content_type(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_sources_are_text() {
        assert_eq!(content_type("layout/theme.liquid"), "application/liquid");
        assert_eq!(content_type("assets/theme.css.liquid"), "application/liquid");
        assert_eq!(content_type("assets/theme.css"), "text/css");
        assert_eq!(content_type("templates/product.json"), "application/json");
        assert!(!is_binary_path("layout/theme.liquid"));
        assert!(!is_binary_path("assets/theme.css"));
        assert!(!is_binary_path("templates/product.json"));
        assert!(!is_binary_path("assets/theme.js"));
    }

    #[test]
    fn media_and_unknown_are_binary() {
        assert!(is_binary_path("assets/logo.png"));
        assert!(is_binary_path("assets/font.woff2"));
        assert!(is_binary_path("assets/promo.mp4"));
        assert!(is_binary_path("assets/manual.pdf"));
        assert!(is_binary_path("assets/bundle.zip"));
        assert!(is_binary_path("assets/blob.unknownext"));
        assert!(is_binary_path("assets/legacy.eot"));
    }

    #[test]
    fn extension_lookup_is_case_insensitive() {
        assert_eq!(content_type("snippets/CARD.LIQUID"), "application/liquid");
    }
}
