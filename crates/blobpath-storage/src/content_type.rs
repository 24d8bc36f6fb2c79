//! Content type resolution for uploads.

use std::path::Path;

use blobpath_models::ContentSettings;

/// Decides the content type and encoding of a local file about to be uploaded.
pub trait ContentTypeResolver: Send + Sync {
    fn resolve(&self, local: &Path) -> ContentSettings;
}

impl<F> ContentTypeResolver for F
where
    F: Fn(&Path) -> ContentSettings + Send + Sync,
{
    fn resolve(&self, local: &Path) -> ContentSettings {
        self(local)
    }
}

/// Never sets content headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContentType;

impl ContentTypeResolver for NoContentType {
    fn resolve(&self, _local: &Path) -> ContentSettings {
        ContentSettings::default()
    }
}

/// Guesses from the file name.
///
/// A trailing compression suffix is reported as the content encoding and the
/// type is guessed from what remains, so `logs.tar.gz` resolves to
/// `application/x-tar` with encoding `gzip`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuessContentType;

/// Compression suffixes and the encoding they denote.
const ENCODING_SUFFIXES: &[(&str, &str)] = &[
    ("gz", "gzip"),
    ("Z", "compress"),
    ("bz2", "bzip2"),
    ("xz", "xz"),
    ("br", "br"),
];

/// Shorthand extensions that stand for a double suffix.
const SUFFIX_ALIASES: &[(&str, &str)] = &[
    ("tgz", "tar.gz"),
    ("taz", "tar.gz"),
    ("tz", "tar.gz"),
    ("tbz2", "tar.bz2"),
    ("txz", "tar.xz"),
];

impl ContentTypeResolver for GuessContentType {
    fn resolve(&self, local: &Path) -> ContentSettings {
        let Some(name) = local.file_name().and_then(|n| n.to_str()) else {
            return ContentSettings::default();
        };

        let mut name = name.to_string();
        if let Some((stem, ext)) = name.rsplit_once('.') {
            if let Some((_, expanded)) = SUFFIX_ALIASES
                .iter()
                .find(|(alias, _)| ext.eq_ignore_ascii_case(alias))
            {
                name = format!("{}.{}", stem, expanded);
            }
        }

        let mut encoding = None;
        if let Some((stem, ext)) = name.rsplit_once('.') {
            if let Some((_, enc)) = ENCODING_SUFFIXES.iter().find(|(suffix, _)| *suffix == ext) {
                encoding = Some(enc.to_string());
                name = stem.to_string();
            }
        }

        let content_type = if name.contains('.') {
            mime_guess::from_path(&name).first().map(|m| m.to_string())
        } else {
            None
        };

        ContentSettings::new(content_type, encoding)
    }
}
