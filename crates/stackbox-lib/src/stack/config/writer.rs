use anyhow::{bail, Context, Result};
use std::path::Path;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// How a generated text artifact is encoded on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// UTF-8 without a byte-order mark.
    Utf8,
    /// 7-bit ASCII only; anything else is an error.
    Ascii,
}

/// Encode `contents`, dropping any leading BOM a template carried.
pub fn encode_text(contents: &str, encoding: TextEncoding) -> Result<Vec<u8>> {
    let text = contents.trim_start_matches('\u{feff}');
    if encoding == TextEncoding::Ascii {
        if let Some((offset, c)) = text.char_indices().find(|(_, c)| !c.is_ascii()) {
            bail!("non-ASCII character {c:?} at byte {offset}");
        }
    }
    let bytes = text.as_bytes().to_vec();
    debug_assert!(!bytes.starts_with(UTF8_BOM));
    Ok(bytes)
}

/// Write a text artifact, creating parent directories as needed.
pub async fn write_text(path: &Path, contents: &str, encoding: TextEncoding) -> Result<()> {
    let bytes = encode_text(contents, encoding)
        .with_context(|| format!("cannot encode {}", path.display()))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

/// True when the file starts with the UTF-8 byte-order mark.
pub fn has_bom(bytes: &[u8]) -> bool {
    bytes.starts_with(UTF8_BOM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_template_bom() {
        let bytes = encode_text("\u{feff}[mysqld]\nport=3307\n", TextEncoding::Utf8).unwrap();
        assert!(!has_bom(&bytes));
        assert!(bytes.starts_with(b"[mysqld]"));
    }

    #[test]
    fn ascii_mode_rejects_non_ascii() {
        assert!(encode_text("SELECT 1;", TextEncoding::Ascii).is_ok());
        let err = encode_text("-- café", TextEncoding::Ascii).unwrap_err();
        assert!(err.to_string().contains("non-ASCII"));
        assert!(encode_text("APP_NAME=café", TextEncoding::Utf8).is_ok());
    }
}
