//! Where the Ollama runtime lives on each operating system.
//!
//! Everything here is pure: the same OS and home directory always produce
//! the same [`PlatformPaths`].

use std::path::{Path, PathBuf};

/// Operating system family the runtime is managed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum Os {
    #[strum(serialize = "windows")]
    Windows,
    #[strum(serialize = "macos")]
    MacOs,
    #[strum(serialize = "linux")]
    Linux,
}

impl Os {
    /// Map a platform identifier (`std::env::consts::OS` style, or node's
    /// `win32`/`darwin`). Anything unknown is treated as a Unix-like system.
    pub fn from_identifier(id: &str) -> Self {
        match id.to_ascii_lowercase().as_str() {
            "windows" | "win32" => Os::Windows,
            "macos" | "darwin" => Os::MacOs,
            _ => Os::Linux,
        }
    }

    pub fn current() -> Self {
        Self::from_identifier(std::env::consts::OS)
    }
}

/// Install locations and lookup commands for the runtime binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformPaths {
    pub os: Os,
    /// Directory the app installs the runtime into when it has a choice
    pub install_path: PathBuf,
    /// Executable inside `install_path`
    pub exe_path: PathBuf,
    /// Bare command name, resolved through PATH
    pub command_name: String,
    /// Shell command that prints the PATH-resolved binary location
    pub check_command: String,
    /// Shell command that prints the runtime version
    pub version_command: String,
    /// Likely executable locations, most preferred first
    pub candidate_paths: Vec<PathBuf>,
}

const COMMAND: &str = "ollama";

impl PlatformPaths {
    pub fn resolve(os: Os, home: &Path) -> Self {
        let version_command = format!("{COMMAND} --version");
        match os {
            Os::Windows => {
                let install_path = PathBuf::from(r"C:\EODI\ollama");
                let exe_path = install_path.join("ollama.exe");
                Self {
                    os,
                    candidate_paths: vec![
                        exe_path.clone(),
                        home.join(r"AppData\Local\Programs\Ollama\ollama.exe"),
                        PathBuf::from(r"C:\Program Files\Ollama\ollama.exe"),
                    ],
                    install_path,
                    exe_path,
                    command_name: COMMAND.to_string(),
                    check_command: format!("where {COMMAND}"),
                    version_command,
                }
            }
            Os::MacOs => {
                let install_path = home.join("Desktop").join("ollama");
                let exe_path = install_path.join(COMMAND);
                Self {
                    os,
                    candidate_paths: vec![
                        PathBuf::from("/opt/homebrew/bin/ollama"),
                        exe_path.clone(),
                        PathBuf::from("/usr/local/bin/ollama"),
                    ],
                    install_path,
                    exe_path,
                    command_name: COMMAND.to_string(),
                    check_command: format!("which {COMMAND}"),
                    version_command,
                }
            }
            Os::Linux => {
                let install_path = PathBuf::from("/usr/local/bin");
                let exe_path = install_path.join(COMMAND);
                Self {
                    os,
                    candidate_paths: vec![
                        exe_path.clone(),
                        PathBuf::from("/usr/bin/ollama"),
                        home.join(".local").join("bin").join(COMMAND),
                    ],
                    install_path,
                    exe_path,
                    command_name: COMMAND.to_string(),
                    check_command: format!("which {COMMAND}"),
                    version_command,
                }
            }
        }
    }

    /// Paths for the running system, using `$HOME` / `%USERPROFILE%`
    pub fn current() -> Self {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_default();
        Self::resolve(Os::current(), &home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_platform_has_candidates_and_check_command() {
        let home = Path::new("/home/tester");
        for os in Os::iter() {
            let paths = PlatformPaths::resolve(os, home);
            assert!(!paths.candidate_paths.is_empty(), "{os} has no candidates");
            assert!(!paths.check_command.is_empty(), "{os} has no check command");
            assert_eq!(paths, PlatformPaths::resolve(os, home));
        }
    }

    #[test]
    fn homebrew_prefix_is_preferred_on_macos() {
        let paths = PlatformPaths::resolve(Os::MacOs, Path::new("/Users/me"));
        assert_eq!(paths.candidate_paths[0], PathBuf::from("/opt/homebrew/bin/ollama"));
        assert_eq!(
            paths.candidate_paths[1],
            PathBuf::from("/Users/me/Desktop/ollama/ollama")
        );
        assert_eq!(paths.check_command, "which ollama");
    }

    #[test]
    fn windows_uses_where() {
        let paths = PlatformPaths::resolve(Os::Windows, Path::new(r"C:\Users\me"));
        assert_eq!(paths.check_command, "where ollama");
        assert_eq!(paths.candidate_paths[0], paths.exe_path);
    }

    #[test]
    fn unknown_identifiers_fall_back_to_unix() {
        assert_eq!(Os::from_identifier("freebsd"), Os::Linux);
        assert_eq!(Os::from_identifier("darwin"), Os::MacOs);
        assert_eq!(Os::from_identifier("win32"), Os::Windows);
        assert_eq!(
            PlatformPaths::resolve(Os::from_identifier("plan9"), Path::new("/h")).check_command,
            "which ollama"
        );
    }
}
