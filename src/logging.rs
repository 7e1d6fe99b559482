use anyhow::{Context, Result};
use file_rotate::compression::Compression;
use file_rotate::suffix::{AppendTimestamp, DateFrom, FileLimit};
use file_rotate::{ContentLimit, FileRotate, TimeFrequency};
use std::fs::OpenOptions;
use std::path::Path;

/// Log file used by the daemon unless `LOG_FILE` says otherwise.
pub const DEFAULT_LOG_FILE: &str = "/tmp/litterwatch.log";

/// Rotated files kept next to the live log.
pub const LOG_BACKUPS: usize = 7;

/// Install the global logger.
///
/// Defaults to `info`, overridable with `RUST_LOG`. With `log_file` set,
/// records go to that file instead of stderr. The file is rotated at the
/// first write after local midnight and the last [`LOG_BACKUPS`] days are kept
/// as `<file>.<YYYY-MM-DD>`.
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(path) = log_file {
        builder.target(env_logger::Target::Pipe(Box::new(rotating_writer(path)?)));
    }
    builder
        .try_init()
        .context("logger already initialised")?;
    Ok(())
}

/// Daily rotating writer for `path`.
pub fn rotating_writer(path: &Path) -> Result<FileRotate<AppendTimestamp>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    // FileRotate swallows open errors, so surface them here.
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;

    Ok(FileRotate::new(
        path,
        AppendTimestamp::with_format(
            "%Y-%m-%d",
            FileLimit::MaxFiles(LOG_BACKUPS),
            DateFrom::DateYesterday,
        ),
        ContentLimit::Time(TimeFrequency::Daily),
        Compression::None,
        #[cfg(unix)]
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rotating_writer_writes_to_the_live_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("litterwatch.log");

        let mut writer = rotating_writer(&path).unwrap();
        writer.write_all(b"motion detected\n").unwrap();
        writer.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("motion detected"), "{:?}", contents);
    }

    #[test]
    fn rotating_writer_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tray.log");
        rotating_writer(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn unwritable_log_path_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = match rotating_writer(dir.path()) {
            Ok(_) => panic!("a directory cannot be opened as a log file"),
            Err(e) => e,
        };
        assert!(format!("{:#}", err).contains("open log file"));
    }
}
