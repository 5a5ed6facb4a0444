//! Fixed paths shared by one refinement session
//!
//! A session owns exactly one source path and one output binary. Every
//! superseded candidate is kept next to the source as `<base><N>.<ext>`.

use crate::error::{self, Error, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    source: PathBuf,
    base: PathBuf,
    extension: Option<OsString>,
}

impl Workspace {
    pub fn new(source: impl Into<PathBuf>) -> Result<Self> {
        let source = source.into();
        if source.file_stem().is_none() {
            return Err(Error::invalid_argument("source path has no file name")
                .with_operation("workspace::new")
                .with_context("source", source.display().to_string()));
        }
        let base = source.with_extension("");
        let extension = source.extension().map(|e| e.to_os_string());
        Ok(Self { source, base, extension })
    }

    /// The fixed path every candidate is written to
    pub fn source_path(&self) -> &Path {
        &self.source
    }

    /// Source path without its extension, passed to the compiler's `-o`
    pub fn base_name(&self) -> &Path {
        &self.base
    }

    /// Where the compiled binary is expected to appear
    pub fn executable_path(&self) -> PathBuf {
        let mut name = self.base.as_os_str().to_os_string();
        name.push(std::env::consts::EXE_SUFFIX);
        let path = PathBuf::from(name);

        let bare = path.is_relative()
            && path.parent().map(|p| p.as_os_str().is_empty()).unwrap_or(true);
        if bare {
            Path::new(".").join(path)
        } else {
            path
        }
    }

    /// Archive copy for the candidate displaced by the `index`-th overwrite
    pub fn archive_path(&self, index: usize) -> PathBuf {
        let mut name = self.base.as_os_str().to_os_string();
        name.push(index.to_string());
        if let Some(ext) = &self.extension {
            name.push(".");
            name.push(ext);
        }
        PathBuf::from(name)
    }

    /// Content of the source file if it exists and holds anything but whitespace
    pub fn existing_source(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.source) {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(error::io_at(e, "workspace::existing_source", &self.source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_for_bare_file_name() {
        let ws = Workspace::new("cauchy.f90").unwrap();

        assert_eq!(ws.source_path(), Path::new("cauchy.f90"));
        assert_eq!(ws.base_name(), Path::new("cauchy"));
        assert_eq!(ws.archive_path(1), PathBuf::from("cauchy1.f90"));
        assert_eq!(ws.archive_path(12), PathBuf::from("cauchy12.f90"));

        let exe = format!("cauchy{}", std::env::consts::EXE_SUFFIX);
        assert_eq!(ws.executable_path(), Path::new(".").join(exe));
    }

    #[test]
    fn test_paths_inside_directory() {
        let ws = Workspace::new("build/prog.c").unwrap();
        assert_eq!(ws.base_name(), Path::new("build/prog"));
        assert_eq!(ws.archive_path(2), PathBuf::from("build/prog2.c"));

        let exe = format!("build/prog{}", std::env::consts::EXE_SUFFIX);
        assert_eq!(ws.executable_path(), PathBuf::from(exe));
    }

    #[test]
    fn test_source_without_extension() {
        let ws = Workspace::new("script").unwrap();
        assert_eq!(ws.archive_path(3), PathBuf::from("script3"));
    }

    #[test]
    fn test_existing_source() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path().join("main.f90")).unwrap();
        assert_eq!(ws.existing_source().unwrap(), None);

        std::fs::write(ws.source_path(), "  \n").unwrap();
        assert_eq!(ws.existing_source().unwrap(), None);

        std::fs::write(ws.source_path(), "program p\nend program p\n").unwrap();
        assert_eq!(ws.existing_source().unwrap().as_deref(), Some("program p\nend program p\n"));
    }
}
