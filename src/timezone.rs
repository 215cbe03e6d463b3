// ABOUTME: Host IANA timezone resolution, grounded verbatim in
// original_source/claude_config.py::get_host_timezone

use std::path::Path;

/// Precedence: `/etc/timezone` if present and non-empty; else the
/// `zoneinfo/`-suffixed target of the `/etc/localtime` symlink; else `UTC`.
pub fn resolve_host_timezone() -> String {
    resolve_from(Path::new("/etc/timezone"), Path::new("/etc/localtime"))
}

fn resolve_from(timezone_file: &Path, localtime_link: &Path) -> String {
    if let Ok(contents) = std::fs::read_to_string(timezone_file) {
        let trimmed = contents.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    if let Ok(target) = std::fs::read_link(localtime_link) {
        let target = target.to_string_lossy();
        if let Some(idx) = target.find("zoneinfo/") {
            return target[idx + "zoneinfo/".len()..].to_string();
        }
    }

    "UTC".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn prefers_etc_timezone() {
        let tmp = TempDir::new().unwrap();
        let tz_file = tmp.path().join("timezone");
        std::fs::write(&tz_file, "Europe/Berlin\n").unwrap();
        let link = tmp.path().join("localtime");

        assert_eq!(resolve_from(&tz_file, &link), "Europe/Berlin");
    }

    #[test]
    fn falls_back_to_localtime_symlink() {
        let tmp = TempDir::new().unwrap();
        let tz_file = tmp.path().join("missing-timezone");
        let zoneinfo_dir = tmp.path().join("usr/share/zoneinfo/America");
        std::fs::create_dir_all(&zoneinfo_dir).unwrap();
        let target = zoneinfo_dir.join("New_York");
        std::fs::write(&target, "").unwrap();

        let link = tmp.path().join("localtime");
        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert_eq!(resolve_from(&tz_file, &link), "America/New_York");
    }

    #[test]
    fn falls_back_to_utc() {
        let tmp = TempDir::new().unwrap();
        let tz_file = tmp.path().join("missing-timezone");
        let link = tmp.path().join("missing-localtime");
        assert_eq!(resolve_from(&tz_file, &link), "UTC");
    }
}
