use std::path::PathBuf;

#[cfg(target_os = "macos")]
const PLATFORM_LOG_SEGMENTS: &[&str] = &["Library", "Logs", "LmsFilePicker"];
#[cfg(not(target_os = "macos"))]
const PLATFORM_LOG_SEGMENTS: &[&str] = &[".config", "lms-file-picker", "logs"];

/// Default file name, without extension, of the picker's log.
pub const LOG_FILE_STEM: &str = "lms-file-picker";

pub fn log_directory() -> Option<PathBuf> {
    let mut path = dirs::home_dir()?;
    path.extend(PLATFORM_LOG_SEGMENTS);
    Some(path)
}

/// Log file for `stem`, falling back to the default name when `stem` is blank.
pub fn log_file_path(stem: &str) -> Option<PathBuf> {
    let stem = match stem.trim() {
        "" => LOG_FILE_STEM,
        stem => stem,
    };
    Some(log_directory()?.join(format!("{stem}.log")))
}
