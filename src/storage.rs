use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::error::Error;
use crate::model::{GeneratedDocument, PageSize};

const DEFAULT_SUBDIR: &str = "pdfs";
const FALLBACK_STEM: &str = "poster";

/// Where generated posters land and how they are addressed publicly.
#[derive(Clone, Debug)]
pub struct DocumentStore {
    root: PathBuf,
    base_url: String,
    subdir: String,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            subdir: DEFAULT_SUBDIR.to_string(),
        }
    }

    pub fn directory(&self) -> PathBuf {
        self.root.join(&self.subdir)
    }

    pub fn store(
        &self,
        title: &str,
        page_size: PageSize,
        bytes: &[u8],
    ) -> Result<GeneratedDocument, Error> {
        self.store_at(title, page_size, bytes, chrono::Local::now().naive_local())
    }

    /// Write `bytes` under a fresh, unique name. The file only appears under
    /// its final name once completely written.
    pub fn store_at(
        &self,
        title: &str,
        page_size: PageSize,
        bytes: &[u8],
        timestamp: NaiveDateTime,
    ) -> Result<GeneratedDocument, Error> {
        let dir = self.directory();
        fs::create_dir_all(&dir)?;

        let stem = format!(
            "{}_{}_{}",
            sanitize_file_name(title),
            page_size.as_str(),
            timestamp.format("%d-%m-%Y_%H-%M-%S"),
        );

        let part = write_part(&dir, &stem, bytes)?;
        let published = publish(&dir, &stem, &part);
        let _ = fs::remove_file(&part);
        let (file_name, path) = published?;

        log::info!("Stored {} ({} bytes)", path.display(), bytes.len());
        Ok(GeneratedDocument {
            url: format!("{}/{}/{}", self.base_url, self.subdir, file_name),
            path,
            file_name,
        })
    }
}

fn numbered(stem: &str, n: u32, ext: &str) -> String {
    if n == 1 {
        format!("{stem}.{ext}")
    } else {
        format!("{stem}-{n}.{ext}")
    }
}

/// Write the whole document under a fresh `.part` name.
fn write_part(dir: &Path, stem: &str, bytes: &[u8]) -> Result<PathBuf, Error> {
    for n in 1u32.. {
        let part = dir.join(numbered(stem, n, "part"));
        let mut f = match OpenOptions::new().write(true).create_new(true).open(&part) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        };
        let written = f.write_all(bytes).and_then(|_| f.sync_all());
        drop(f);
        if let Err(e) = written {
            let _ = fs::remove_file(&part);
            return Err(e.into());
        }
        return Ok(part);
    }
    Err(Error::Render("no free file name".into()))
}

/// Link the finished file to the first free `{stem}.pdf`, `{stem}-2.pdf`, ...
/// Linking never replaces an existing file, so concurrent exports with the
/// same stem each get their own name.
fn publish(dir: &Path, stem: &str, part: &Path) -> Result<(String, PathBuf), Error> {
    for n in 1u32.. {
        let file_name = numbered(stem, n, "pdf");
        let path = dir.join(&file_name);
        match fs::hard_link(part, &path) {
            Ok(()) => return Ok((file_name, path)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::Render("no free file name".into()))
}

/// File-system safe stem: accents stripped, whitespace collapsed to `-`,
/// anything else outside `[A-Za-z0-9_-]` dropped.
pub fn sanitize_file_name(title: &str) -> String {
    let mut out = String::new();
    let mut pending_dash = false;
    for ch in title.nfd().filter(|c| !is_combining_mark(*c)) {
        if ch.is_whitespace() {
            pending_dash = !out.is_empty();
            continue;
        }
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            if pending_dash {
                out.push('-');
                pending_dash = false;
            }
            out.push(ch);
        }
    }
    if out.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        out
    }
}
