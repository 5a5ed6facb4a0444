//! Archiving of superseded candidates
//!
//! Before the fixed source path is overwritten by attempt `N` (N > 1), the
//! file currently there is copied byte for byte to `<base><N-1>.<ext>`.
//! Archive-then-overwrite: callers must await `archive` before writing.

use crate::error::{Error, Result};
use crate::workspace::Workspace;
use std::path::PathBuf;

#[derive(Debug)]
pub struct Archiver {
    workspace: Workspace,
    entries: Vec<PathBuf>,
    last_index: usize,
}

impl Archiver {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            entries: Vec::new(),
            last_index: 0,
        }
    }

    /// Archive copies written so far, oldest first
    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Preserve the current source before attempt `attempt` overwrites it.
    ///
    /// Returns the archive path, or `None` for the first attempt. Each index
    /// is written at most once per session.
    pub async fn archive(&mut self, attempt: usize) -> Result<Option<PathBuf>> {
        if attempt <= 1 {
            return Ok(None);
        }

        let index = attempt - 1;
        if index <= self.last_index {
            return Err(Error::archive_failed(
                self.workspace.archive_path(index).display().to_string(),
                format!("archive index {} already written this session", index),
            )
            .with_operation("archive::archive"));
        }

        let source = self.workspace.source_path();
        let target = self.workspace.archive_path(index);
        tokio::fs::copy(source, &target).await.map_err(|e| {
            Error::archive_failed(target.display().to_string(), e.to_string())
                .with_operation("archive::archive")
                .with_context("source", source.display().to_string())
                .set_source(e)
        })?;

        tracing::debug!(index, archive = %target.display(), "archived previous candidate");
        self.last_index = index;
        self.entries.push(target.clone());
        Ok(Some(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn setup() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path().join("foo.f90")).unwrap();
        (dir, ws)
    }

    #[tokio::test]
    async fn test_first_attempt_archives_nothing() {
        let (_dir, ws) = setup();
        let mut archiver = Archiver::new(ws);

        assert_eq!(archiver.archive(1).await.unwrap(), None);
        assert!(archiver.entries().is_empty());
    }

    #[tokio::test]
    async fn test_archive_copies_current_source() {
        let (_dir, ws) = setup();
        let mut archiver = Archiver::new(ws.clone());

        std::fs::write(ws.source_path(), "attempt one").unwrap();
        let path = archiver.archive(2).await.unwrap().unwrap();
        assert_eq!(path, ws.archive_path(1));
        std::fs::write(ws.source_path(), "attempt two").unwrap();

        archiver.archive(3).await.unwrap();
        std::fs::write(ws.source_path(), "attempt three").unwrap();

        assert_eq!(std::fs::read_to_string(ws.archive_path(1)).unwrap(), "attempt one");
        assert_eq!(std::fs::read_to_string(ws.archive_path(2)).unwrap(), "attempt two");
        assert_eq!(archiver.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_index_is_write_once() {
        let (_dir, ws) = setup();
        let mut archiver = Archiver::new(ws.clone());
        std::fs::write(ws.source_path(), "x").unwrap();

        archiver.archive(2).await.unwrap();
        let err = archiver.archive(2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArchiveFailed);
    }

    #[tokio::test]
    async fn test_missing_source_fails_loudly() {
        let (_dir, ws) = setup();
        let mut archiver = Archiver::new(ws);

        let err = archiver.archive(2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArchiveFailed);
        assert!(err.source_ref().is_some());
    }
}
