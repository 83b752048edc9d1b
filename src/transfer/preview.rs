//! Preview classification for fetched files

use std::path::Path;

use serde::Serialize;

/// What kind of viewer a fetched file calls for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    Image,
    Text,
    Pdf,
    Html,
    /// Recognised but not previewable inline
    Office,
    /// Top-level MIME type guessed from the extension (`audio`, `video`, ...)
    Other(String),
    Unknown,
}

impl PreviewKind {
    pub fn for_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "tiff" | "webp" => Self::Image,
            // html is shown as source; only .htm goes to the html viewer
            "txt" | "log" | "csv" | "md" | "py" | "js" | "html" | "css" | "json" | "xml"
            | "ini" | "cfg" => Self::Text,
            "pdf" => Self::Pdf,
            "htm" => Self::Html,
            "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" => Self::Office,
            _ => match mime_guess::from_path(path).first() {
                Some(mime) => Self::Other(mime.type_().as_str().to_string()),
                None => Self::Unknown,
            },
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Image => "image",
            Self::Text => "text",
            Self::Pdf => "pdf",
            Self::Html => "html",
            Self::Office => "office",
            Self::Other(kind) => kind,
            Self::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(PreviewKind::for_path(Path::new("a/photo.JPG")), PreviewKind::Image);
        assert_eq!(PreviewKind::for_path(Path::new("notes.md")), PreviewKind::Text);
        assert_eq!(PreviewKind::for_path(Path::new("page.html")), PreviewKind::Text);
        assert_eq!(PreviewKind::for_path(Path::new("page.htm")), PreviewKind::Html);
        assert_eq!(PreviewKind::for_path(Path::new("q3.xlsx")), PreviewKind::Office);
        assert_eq!(PreviewKind::for_path(Path::new("r.pdf")), PreviewKind::Pdf);
    }

    #[test]
    fn test_mime_fallback() {
        assert_eq!(
            PreviewKind::for_path(Path::new("song.mp3")),
            PreviewKind::Other("audio".to_string())
        );
        assert_eq!(PreviewKind::for_path(Path::new("blob")), PreviewKind::Unknown);
        assert_eq!(PreviewKind::for_path(Path::new("clip.mp4")).as_str(), "video");
    }
}
