use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped when a file name is placed in a URL path segment.
/// Covers the HTML-significant ones too, so the URL can go into markup as-is.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// One tile in the gallery grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryImage {
    pub name: String,
    pub url: String,
}

impl GalleryImage {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let url = format!("/{}", utf8_percent_encode(&name, PATH_SEGMENT));
        Self { name, url }
    }
}
