use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use std::{
    fmt,
    io::{self, Cursor, Read, Seek, SeekFrom},
    path::Path,
    sync::Arc,
};

/// Number of leading bytes inspected when resolving the encoding and when
/// sniffers peek at text content.
pub const SNIFF_LEN: usize = 8 * 1024;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Resolved text encoding of an upload, or the `binary` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEncoding {
    Binary,
    Text(&'static Encoding),
}

impl FileEncoding {
    /// Resolve an encoding label (`"binary"`, `"utf-8"`, `"latin1"`, ...).
    pub fn from_label(label: &str) -> Option<Self> {
        if label.trim().eq_ignore_ascii_case("binary") {
            return Some(FileEncoding::Binary);
        }
        Encoding::for_label(label.trim().as_bytes()).map(FileEncoding::Text)
    }

    /// Inspect the content: a byte order mark wins, then NUL bytes or stray
    /// control characters mean binary, valid UTF-8 means `utf-8`, anything
    /// else is decoded as Windows-1252.
    pub fn detect(bytes: &[u8]) -> Self {
        if let Some((enc, _)) = Encoding::for_bom(bytes) {
            return FileEncoding::Text(enc);
        }
        let head = &bytes[..bytes.len().min(SNIFF_LEN)];
        if head.contains(&0) {
            return FileEncoding::Binary;
        }
        if std::str::from_utf8(bytes).is_ok() {
            return FileEncoding::Text(UTF_8);
        }
        let has_controls = head
            .iter()
            .any(|&b| (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c)) || b == 0x7f);
        if has_controls {
            FileEncoding::Binary
        } else {
            FileEncoding::Text(WINDOWS_1252)
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, FileEncoding::Binary)
    }

    /// Lower-cased codec name, or `binary`.
    pub fn name(&self) -> String {
        match self {
            FileEncoding::Binary => "binary".to_string(),
            FileEncoding::Text(enc) => enc.name().to_lowercase(),
        }
    }
}

impl fmt::Display for FileEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An uploaded file: immutable bytes plus the declared name and content type.
///
/// Readers consume it through `Read + Seek`; the registry rewinds it after
/// every sniff so each reader sees the original content from the start.
#[derive(Debug, Clone)]
pub struct RawFile {
    name: String,
    content_type: String,
    mime_type: String,
    encoding: FileEncoding,
    cursor: Cursor<Arc<[u8]>>,
}

impl RawFile {
    pub fn new(
        content: impl Into<Vec<u8>>,
        name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        let bytes: Arc<[u8]> = Arc::from(content.into());
        let encoding = FileEncoding::detect(&bytes);
        let mime_type = if bytes.starts_with(ZIP_MAGIC) {
            "application/zip"
        } else if encoding.is_binary() {
            "application/octet-stream"
        } else {
            "text/plain"
        };

        Self {
            name: name.into(),
            content_type: content_type.into(),
            mime_type: mime_type.to_string(),
            encoding,
            cursor: Cursor::new(bytes),
        }
    }

    /// Override the detected encoding, e.g. when the caller already knows it.
    pub fn with_encoding(mut self, encoding: FileEncoding) -> Self {
        if !self.is_zip() {
            self.mime_type = if encoding.is_binary() {
                "application/octet-stream".to_string()
            } else {
                "text/plain".to_string()
            };
        }
        self.encoding = encoding;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn encoding(&self) -> FileEncoding {
        self.encoding
    }

    /// The whole content, independent of the cursor position.
    pub fn bytes(&self) -> &[u8] {
        self.cursor.get_ref()
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    /// Lower-cased file suffix without the dot (`""` when there is none).
    pub fn extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default()
    }

    pub fn is_zip(&self) -> bool {
        self.bytes().starts_with(ZIP_MAGIC)
    }

    /// Read up to `n` bytes from the start of the file, leaving the cursor
    /// where it was.
    pub fn peek(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let pos = self.cursor.position();
        self.cursor.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::with_capacity(n.min(self.len()));
        (&mut self.cursor).take(n as u64).read_to_end(&mut buf)?;
        self.cursor.seek(SeekFrom::Start(pos))?;
        Ok(buf)
    }

    /// Decoded leading text (at most [`SNIFF_LEN`] bytes); `None` for binary
    /// files.
    pub fn head_text(&mut self) -> Option<String> {
        let enc = match self.encoding {
            FileEncoding::Binary => return None,
            FileEncoding::Text(enc) => enc,
        };
        let head = self.peek(SNIFF_LEN).ok()?;
        let (text, _, _) = enc.decode(&head);
        Some(text.into_owned())
    }

    /// The whole content decoded with the resolved encoding; `None` for
    /// binary files.
    pub fn text(&self) -> Option<String> {
        match self.encoding {
            FileEncoding::Binary => None,
            FileEncoding::Text(enc) => {
                let (text, _, _) = enc.decode(self.bytes());
                Some(text.into_owned())
            }
        }
    }
}

impl Read for RawFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for RawFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_text_and_binary() {
        assert_eq!(FileEncoding::detect(b"a\tb\n1\t2\n"), FileEncoding::Text(UTF_8));
        assert_eq!(
            FileEncoding::detect(&[b'T', 0xe9, b'm', b'p', b'\n']),
            FileEncoding::Text(WINDOWS_1252)
        );
        assert_eq!(FileEncoding::detect(b"PK\x03\x04\x00\x00"), FileEncoding::Binary);
        assert_eq!(FileEncoding::detect(&[0xff, 0x01, 0x02]), FileEncoding::Binary);
    }

    #[test]
    fn peek_leaves_cursor_in_place() -> io::Result<()> {
        let mut file = RawFile::new(b"hello world".to_vec(), "a.txt", "text/plain");
        let mut first = [0u8; 6];
        file.read_exact(&mut first)?;

        assert_eq!(file.peek(5)?, b"hello");

        let mut rest = String::new();
        file.read_to_string(&mut rest)?;
        assert_eq!(rest, "world");
        Ok(())
    }

    #[test]
    fn resolves_mime_and_extension() {
        let file = RawFile::new(b"x".to_vec(), "Data.DTA", "application/octet-stream");
        assert_eq!(file.extension(), "dta");
        assert_eq!(file.mime_type(), "text/plain");
        assert_eq!(file.encoding().name(), "utf-8");

        let zip = RawFile::new(b"PK\x03\x04\x00rest".to_vec(), "a.brml", "");
        assert_eq!(zip.mime_type(), "application/zip");
        assert!(zip.encoding().is_binary());
    }

    #[test]
    fn decodes_windows_1252() {
        let file = RawFile::new(vec![b'2', b'5', 0xb0, b'C'], "t.txt", "text/plain");
        assert_eq!(file.text().as_deref(), Some("25°C"));
    }

    #[test]
    fn byte_order_mark_selects_encoding() {
        let mut bytes = vec![0xff, 0xfe];
        for unit in "1\t2\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let file = RawFile::new(bytes, "t.txt", "text/plain");
        assert_eq!(file.encoding(), FileEncoding::Text(encoding_rs::UTF_16LE));
        assert_eq!(file.mime_type(), "text/plain");
        assert_eq!(file.text().as_deref(), Some("1\t2\n"));

        let file = RawFile::new(b"\xef\xbb\xbfa;b\n".to_vec(), "t.csv", "text/csv");
        assert_eq!(file.encoding().name(), "utf-8");
        assert_eq!(file.text().as_deref(), Some("a;b\n"));
    }

    #[test]
    fn declared_encoding_overrides_detection() {
        let file = RawFile::new(vec![b'2', b'5', 0x01, 0xb0], "t.txt", "text/plain");
        assert!(file.encoding().is_binary());
        assert_eq!(file.mime_type(), "application/octet-stream");

        let file = file.with_encoding(FileEncoding::Text(WINDOWS_1252));
        assert_eq!(file.mime_type(), "text/plain");
        assert_eq!(file.text().as_deref(), Some("25\u{1}°"));

        let zip = RawFile::new(b"PK\x03\x04rest".to_vec(), "a.xlsx", "")
            .with_encoding(FileEncoding::Text(UTF_8));
        assert_eq!(zip.mime_type(), "application/zip");
    }

    #[test]
    fn label_lookup() {
        assert_eq!(FileEncoding::from_label("binary"), Some(FileEncoding::Binary));
        assert_eq!(FileEncoding::from_label("UTF-8"), Some(FileEncoding::Text(UTF_8)));
        assert_eq!(FileEncoding::from_label("no-such-codec"), None);
    }
}
