pub mod compose;
pub mod error;
pub mod graph;
pub mod job;
pub mod probe;

#[cfg(all(test, unix))]
pub(crate) mod test_support {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\nfor last; do :; done\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Write an executable shell script that stands in for ffmpeg. `$last`
    /// holds the output path.
    pub fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
        script(dir, "fake-ffmpeg", body)
    }

    /// A stand-in for ffprobe that prints the same JSON for every file.
    pub fn fake_ffprobe(dir: &Path, json: &str) -> PathBuf {
        script(dir, "fake-ffprobe", &format!("cat <<'JSON'\n{json}\nJSON"))
    }
}
