use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use keeper_core::{FailureKind, FetchError};

/// How far into the document a `<meta charset>` declaration is looked for.
const META_SNIFF_LIMIT: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHtml {
    pub html: String,
    pub encoding_label: String,
}

/// Decode raw page bytes into UTF-8.
///
/// Order: BOM, `Content-Type` charset, `<meta charset>` in the first KiB,
/// then chardetng detection. Malformed sequences are replaced rather than
/// rejected; only a document that decodes to nothing is an error.
pub fn decode_html(bytes: &[u8], content_type: Option<&str>) -> Result<DecodedHtml, FetchError> {
    let encoding = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or_else(|| content_type.and_then(charset_param).and_then(label_to_encoding))
        .or_else(|| sniff_meta_charset(bytes).and_then(label_to_encoding))
        .unwrap_or_else(|| {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            detector.guess(None, true)
        });

    let (text, used, _had_errors) = encoding.decode(bytes);
    if text.trim().is_empty() {
        return Err(FetchError::new(
            FailureKind::UnsupportedContent {
                content_type: content_type.unwrap_or("unknown").to_string(),
            },
            format!("document is empty after decoding as {}", used.name()),
        ));
    }
    Ok(DecodedHtml {
        html: text.into_owned(),
        encoding_label: used.name().to_string(),
    })
}

/// Decode a text subresource (stylesheet, script) leniently, defaulting to UTF-8.
pub fn decode_text(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or_else(|| content_type.and_then(charset_param).and_then(label_to_encoding))
        .unwrap_or(UTF_8);
    encoding.decode(bytes).0.into_owned()
}

fn label_to_encoding(label: String) -> Option<&'static Encoding> {
    Encoding::for_label(label.as_bytes())
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim_matches([' ', '"', '\''].as_ref()).to_string())
        })
        .next()
}

/// Finds `charset=...` inside a `<meta` tag near the start of the document.
fn sniff_meta_charset(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(META_SNIFF_LIMIT)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let mut rest = head.as_str();
    while let Some(start) = rest.find("<meta") {
        let tag = &rest[start..];
        let end = tag.find('>').unwrap_or(tag.len());
        let tag = &tag[..end];
        if let Some(pos) = tag.find("charset=") {
            let value = tag[pos + "charset=".len()..]
                .trim_start_matches(['"', '\''])
                .split(|c: char| c == '"' || c == '\'' || c == ';' || c == '/' || c.is_whitespace())
                .next()
                .unwrap_or_default();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
        rest = &rest[start + end.max(1)..];
    }
    None
}
