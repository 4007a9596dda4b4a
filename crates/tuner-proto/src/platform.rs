use std::path::{Path, PathBuf};

const APP_DIR: &str = "tuner";

pub fn data_dir() -> PathBuf {
    // XDG layout on unix, including macOS, for consistency
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

/// Resolve a leading `~` component against the home directory.  Other
/// paths, and `~user` forms, come back unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// IPC endpoint for the mpv instance backing one station.  Each station owns
/// its own player process, so the name carries the station index.
#[cfg(unix)]
pub fn mpv_socket_name(station_idx: usize) -> String {
    format!(
        "{}/tuner-mpv-{}-{}.sock",
        std::env::temp_dir().display(),
        std::process::id(),
        station_idx
    )
}

#[cfg(windows)]
pub fn mpv_socket_name(station_idx: usize) -> String {
    format!("tuner-mpv-{}-{}", std::process::id(), station_idx)
}

#[cfg(unix)]
pub fn mpv_socket_arg(station_idx: usize) -> String {
    format!("--input-ipc-server={}", mpv_socket_name(station_idx))
}

#[cfg(windows)]
pub fn mpv_socket_arg(station_idx: usize) -> String {
    format!("--input-ipc-server=\\\\.\\pipe\\{}", mpv_socket_name(station_idx))
}

#[cfg(unix)]
pub fn mpv_binary_name() -> &'static str {
    "mpv"
}

#[cfg(windows)]
pub fn mpv_binary_name() -> &'static str {
    "mpv.exe"
}

/// Find the mpv binary: `MPV_PATH`, then beside the current exe, then PATH.
pub fn find_mpv_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("MPV_PATH") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    let exe_name = mpv_binary_name();

    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(dir) = current_exe.parent() {
            let local_mpv = dir.join(exe_name);
            if local_mpv.exists() {
                return Some(local_mpv);
            }
        }
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(exe_name))
        .find(|p| p.exists())
}
