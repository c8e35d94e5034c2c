//! Content sniffing for uploaded files.
//! Uploads are classified by their leading bytes; the declared filename and
//! extension are never consulted.

use std::io::{self, ErrorKind, Read, Seek, SeekFrom};

/// Number of leading bytes inspected.
pub const SNIFF_LEN: usize = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Pdf,
    Png,
    Jpeg,
    Gif,
    Zip,
    Text,
    Unknown,
}

impl MediaKind {
    pub fn mime(&self) -> &'static str {
        match self {
            MediaKind::Pdf => "application/pdf",
            MediaKind::Png => "image/png",
            MediaKind::Jpeg => "image/jpeg",
            MediaKind::Gif => "image/gif",
            MediaKind::Zip => "application/zip",
            MediaKind::Text => "text/plain; charset=utf-8",
            MediaKind::Unknown => "application/octet-stream",
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, MediaKind::Pdf)
    }
}

const SIGNATURES: &[(&[u8], MediaKind)] = &[
    (b"%PDF-", MediaKind::Pdf),
    (b"\x89PNG\r\n\x1a\n", MediaKind::Png),
    (b"\xff\xd8\xff", MediaKind::Jpeg),
    (b"GIF87a", MediaKind::Gif),
    (b"GIF89a", MediaKind::Gif),
    (b"PK\x03\x04", MediaKind::Zip),
];

/// Classify an in-memory prefix.
pub fn sniff(prefix: &[u8]) -> MediaKind {
    let prefix = &prefix[..prefix.len().min(SNIFF_LEN)];
    for (sig, kind) in SIGNATURES {
        if prefix.starts_with(sig) {
            return *kind;
        }
    }
    if !prefix.is_empty() && !prefix.iter().any(|b| is_binary_byte(*b)) {
        return MediaKind::Text;
    }
    MediaKind::Unknown
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

/// Read at most [`SNIFF_LEN`] bytes from `reader`, rewind it to the start and
/// classify what was read.
///
/// An empty stream is reported as `UnexpectedEof` so callers can tell a
/// truncated upload apart from one that is simply not a PDF.
pub fn classify<R: Read + Seek>(reader: &mut R) -> io::Result<MediaKind> {
    let mut buf = [0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < SNIFF_LEN {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    reader.seek(SeekFrom::Start(0))?;
    if filled == 0 {
        return Err(io::Error::new(ErrorKind::UnexpectedEof, "empty stream"));
    }
    Ok(sniff(&buf[..filled]))
}
