//! 写入目录与 ZIP 打包

use super::DatasetFile;
use crate::error::DatasetError;
use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

/// 校验相对路径：不能是绝对路径，不能包含 `..`
fn checked_relative(path: &str) -> Result<&Path, DatasetError> {
    let p = Path::new(path);
    let valid = !path.is_empty()
        && p.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if valid {
        Ok(p)
    } else {
        Err(DatasetError::InvalidPath(path.to_string()))
    }
}

/// 所有上级目录，例如 `a/b/c.txt` → `a/`、`a/b/`
fn parent_dirs(path: &str) -> impl Iterator<Item = String> + '_ {
    path.match_indices('/').map(|(i, _)| path[..=i].to_string())
}

/// 打包为 ZIP（含目录条目），返回压缩包内容
pub fn to_zip(files: &[DatasetFile]) -> Result<Vec<u8>, DatasetError> {
    for f in files {
        checked_relative(&f.path)?;
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    let dirs: BTreeSet<String> = files.iter().flat_map(|f| parent_dirs(&f.path)).collect();
    for dir in dirs {
        zip.add_directory(dir, options)?;
    }
    for f in files {
        zip.start_file(f.path.as_str(), options)?;
        zip.write_all(&f.bytes)?;
    }

    let bytes = zip.finish()?.into_inner();
    info!("Packed {} files into {} byte archive", files.len(), bytes.len());
    Ok(bytes)
}

/// 写入目录，自动创建上级目录
pub fn write_to_dir(files: &[DatasetFile], root: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let mut written = Vec::with_capacity(files.len());
    for f in files {
        let target = root.join(checked_relative(&f.path)?);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &f.bytes)?;
        debug!("Wrote {}", target.display());
        written.push(target);
    }
    info!("Wrote {} files to {}", written.len(), root.display());
    Ok(written)
}
