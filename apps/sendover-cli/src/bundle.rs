//! Zip bundling for multi-file offers.

use std::collections::HashSet;
use std::io::{Cursor, Write};

use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

use sendover_transfer::{Bundler, FileSource, MemoryFile, TransferError};

/// Packs every offered file into one in-memory zip archive.
#[derive(Debug, Default)]
pub struct ZipBundler;

impl Bundler for ZipBundler {
    fn bundle(
        &mut self,
        files: Vec<Box<dyn FileSource>>,
        name: &str,
    ) -> Result<Box<dyn FileSource>, TransferError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut used = HashSet::new();

        for mut file in files {
            let entry = unique_entry_name(file.name(), &mut used);
            let mut data = vec![0u8; file.size() as usize];
            file.read_at(0, &mut data)?;

            zip.start_file(entry.as_str(), options).map_err(zip_error)?;
            zip.write_all(&data)?;
            tracing::debug!(%entry, bytes = data.len(), "bundled file");
        }

        let bytes = zip.finish().map_err(zip_error)?.into_inner();
        Ok(Box::new(MemoryFile::new(name, "application/zip", bytes)))
    }
}

fn zip_error(e: zip::result::ZipError) -> TransferError {
    TransferError::Bundle(e.to_string())
}

/// `report.pdf`, `report (2).pdf`, `report (3).pdf`, ...
fn unique_entry_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    let mut n = 2;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
