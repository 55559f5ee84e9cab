//! Shared fixtures for application tests.

use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Write a zip archive with the given `(member, contents)` pairs.
/// Members ending in `/` become directory entries.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = File::create(path).unwrap();
    fill_zip(ZipWriter::new(file), entries);
}

/// Same as [`write_zip`] but in memory, for serving over HTTP.
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    fill_zip(ZipWriter::new(Cursor::new(Vec::new())), entries).into_inner()
}

fn fill_zip<W: Write + std::io::Seek>(mut zip: ZipWriter<W>, entries: &[(&str, &str)]) -> W {
    let options = SimpleFileOptions::default();
    for (name, contents) in entries {
        if let Some(dir) = name.strip_suffix('/') {
            zip.add_directory(dir, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
    }
    zip.finish().unwrap()
}
