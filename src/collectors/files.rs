use crate::format::{bytes_to_mib, percent_of};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const TRACKED_EXTENSIONS: [&str; 13] = [
    ".txt", ".py", ".pdf", ".jpg", ".jpeg", ".png", ".docx", ".xls", ".doc", ".zip", ".rar",
    ".mp3", ".mp4",
];

/// Shown instead of real buckets when nothing tracked was found.
const DEMO_DATASET: [(&str, u64, f64); 4] = [
    (".txt", 10, 0.5),
    (".py", 5, 0.2),
    (".pdf", 3, 1.5),
    (".jpg", 2, 0.8),
];
pub const DEMO_TOTAL_FILES: u64 = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtensionBucket {
    pub file_count: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionStat {
    pub extension: &'static str,
    pub count: u64,
    pub size_mib: f64,
    pub percent: f64,
}

impl ExtensionStat {
    /// Field prefix used in the flat record: `.txt` -> `txt`.
    pub fn key(&self) -> &'static str {
        self.extension.trim_start_matches('.')
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileBreakdown {
    pub analyzed_folder: PathBuf,
    pub total_scanned: u64,
    pub total_files: u64,
    pub demo_values: bool,
    pub extensions: Vec<ExtensionStat>,
}

#[derive(Debug, Default)]
struct WalkTally {
    scanned: u64,
    buckets: [ExtensionBucket; TRACKED_EXTENSIONS.len()],
    errors: u64,
}

pub fn classify_files(root: &Path, fallback: &Path) -> FileBreakdown {
    let dir = if root.is_dir() {
        root.to_path_buf()
    } else {
        warn!(
            dir = %root.display(),
            fallback = %fallback.display(),
            "каталог не найден или не является каталогом, анализируется запасной"
        );
        fallback.to_path_buf()
    };
    let analyzed_folder = std::path::absolute(&dir).unwrap_or_else(|_| dir.clone());
    info!(dir = %analyzed_folder.display(), "сканирование файлов");

    let tally = walk(&dir);
    info!(
        scanned = tally.scanned,
        errors = tally.errors,
        "сканирование файлов завершено"
    );

    summarize(analyzed_folder, tally)
}

fn walk(dir: &Path) -> WalkTally {
    let mut tally = WalkTally::default();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tally.errors += 1;
                warn!(error = %err, "ошибка при обходе каталога, поддерево пропущено");
                continue;
            }
        };
        // Directory links are not descended into; file links count as
        // the file they point at.
        let link_target = if entry.path_is_symlink() {
            match fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => Some(meta),
                Ok(_) => continue,
                Err(err) => {
                    debug!(
                        path = %entry.path().display(),
                        error = %err,
                        "висячая символическая ссылка пропущена"
                    );
                    continue;
                }
            }
        } else if entry.file_type().is_file() {
            None
        } else {
            continue;
        };
        tally.scanned += 1;

        let Some(index) = tracked_index(entry.path()) else {
            continue;
        };
        let metadata = match link_target {
            Some(meta) => Ok(meta),
            None => entry.metadata().map_err(std::io::Error::from),
        };
        let size = match metadata {
            Ok(meta) => meta.len(),
            Err(err) => {
                tally.errors += 1;
                warn!(
                    path = %entry.path().display(),
                    error = %err,
                    "не удалось прочитать размер файла"
                );
                0
            }
        };
        let bucket = &mut tally.buckets[index];
        bucket.file_count += 1;
        bucket.total_bytes += size;
    }
    tally
}

fn tracked_index(path: &Path) -> Option<usize> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    TRACKED_EXTENSIONS
        .iter()
        .position(|tracked| tracked[1..] == ext)
}

fn summarize(analyzed_folder: PathBuf, tally: WalkTally) -> FileBreakdown {
    let matched: u64 = tally.buckets.iter().map(|b| b.file_count).sum();
    info!(matched, "найдено подходящих файлов");

    let (counts_and_sizes, total_files, demo_values): (Vec<(u64, f64)>, u64, bool) =
        if matched == 0 {
            warn!("подходящих файлов нет, используются демонстрационные значения");
            let demo = TRACKED_EXTENSIONS
                .iter()
                .map(|ext| {
                    DEMO_DATASET
                        .iter()
                        .find(|(demo_ext, _, _)| demo_ext == ext)
                        .map(|(_, count, size)| (*count, *size))
                        .unwrap_or((0, 0.0))
                })
                .collect();
            (demo, DEMO_TOTAL_FILES, true)
        } else {
            let real = tally
                .buckets
                .iter()
                .map(|b| (b.file_count, bytes_to_mib(b.total_bytes)))
                .collect();
            (real, matched, false)
        };

    let extensions = TRACKED_EXTENSIONS
        .iter()
        .zip(counts_and_sizes)
        .map(|(extension, (count, size_mib))| ExtensionStat {
            extension: *extension,
            count,
            size_mib,
            percent: percent_of(count as f64, total_files as f64),
        })
        .collect();

    FileBreakdown {
        analyzed_folder,
        total_scanned: tally.scanned,
        total_files,
        demo_values,
        extensions,
    }
}

#[cfg(test)]
impl FileBreakdown {
    pub fn stat(&self, extension: &str) -> Option<&ExtensionStat> {
        self.extensions.iter().find(|s| s.extension == extension)
    }
}
