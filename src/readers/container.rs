//! Helpers shared by the zip+XML container readers.

use anyhow::{anyhow, bail, Context, Result};
use roxmltree::Node;
use std::io::{Read, Seek};
use zip::ZipArchive;

/// Largest uncompressed entry a container reader will load.
const MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

/// Pre-allocation cap; the declared entry size comes from the archive and
/// is not trusted beyond this.
const PREALLOC_BYTES: u64 = 1024 * 1024;

/// Read a whole archive entry as UTF-8 text, without a byte order mark.
pub(crate) fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String> {
    read_entry_limited(archive, name, MAX_ENTRY_BYTES)
}

fn read_entry_limited<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    limit: u64,
) -> Result<String> {
    let entry = archive
        .by_name(name)
        .with_context(|| format!("archive has no entry {}", name))?;
    let mut buf = Vec::with_capacity(entry.size().min(PREALLOC_BYTES).min(limit) as usize);
    entry
        .take(limit + 1)
        .read_to_end(&mut buf)
        .with_context(|| format!("failed to read {} into memory", name))?;
    if buf.len() as u64 > limit {
        bail!("{} is larger than {} bytes", name, limit);
    }
    let text = String::from_utf8(buf).map_err(|e| anyhow!("{} is not UTF-8: {}", name, e))?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Direct child elements with the given local name.
pub(crate) fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |child| child.has_tag_name(tag))
}
