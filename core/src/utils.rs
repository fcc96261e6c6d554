use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Default artifact base name for `input`: `<input>.gz`.
pub fn default_output_base(input: &Path) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(".gz");
    PathBuf::from(name)
}

/// One artifact path per engine: `base`, then `base2`, `base3`, ...
pub fn output_file_names(base: &Path, engines: usize) -> Vec<PathBuf> {
    (0..engines)
        .map(|engine| match engine {
            0 => base.to_path_buf(),
            n => {
                let mut name = OsString::from(base.as_os_str());
                name.push((n + 1).to_string());
                PathBuf::from(name)
            }
        })
        .collect()
}

/// Human-readable byte count (KiB/MiB/GiB), for logs.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
