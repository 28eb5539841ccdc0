use std::path::PathBuf;

const APP_DIR: &str = "onair";

#[cfg(unix)]
pub fn mpv_socket_name() -> String {
    format!("{}/onair-mpv.sock", std::env::temp_dir().display())
}

#[cfg(windows)]
pub fn mpv_socket_name() -> String {
    "onair-mpv".to_string()
}

#[cfg(unix)]
pub fn mpv_socket_arg() -> String {
    format!("--input-ipc-server={}", mpv_socket_name())
}

#[cfg(windows)]
pub fn mpv_socket_arg() -> String {
    format!("--input-ipc-server=\\\\.\\pipe\\{}", mpv_socket_name())
}

/// Log file lives here: `~/.local/share/onair` on Linux and macOS.
pub fn data_dir() -> PathBuf {
    #[cfg(unix)]
    let base = home_relative(&[".local", "share"]);
    #[cfg(windows)]
    let base = dirs::data_local_dir();
    under_app_dir(base)
}

/// `config.toml` lives here: `~/.config/onair` on Linux and macOS.
pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    let base = home_relative(&[".config"]);
    #[cfg(windows)]
    let base = dirs::config_dir();
    under_app_dir(base)
}

#[cfg(unix)]
fn home_relative(parts: &[&str]) -> Option<PathBuf> {
    dirs::home_dir().map(|home| parts.iter().fold(home, |dir, part| dir.join(part)))
}

fn under_app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(std::env::temp_dir).join(APP_DIR)
}

#[cfg(unix)]
fn mpv_binary_name() -> &'static str {
    "mpv"
}

#[cfg(windows)]
fn mpv_binary_name() -> &'static str {
    "mpv.exe"
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.exists())
}

/// Find the mpv binary: `MPV_PATH` override, beside the current exe, then PATH.
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

    find_on_path(exe_name)
}
