use std::io;
use tracing::{debug, info, warn};

use super::ProcessKeeper;
use crate::error::KeeperError;
use crate::process::{self, ProcessHandle};

impl ProcessKeeper {
    /// Read the stored pid, if any.
    ///
    /// Read-and-repair: unparseable content is a rotted record, so the file
    /// is deleted and `None` returned. Only permission problems and genuine
    /// I/O failures surface as errors; a permissions problem is not
    /// self-healing and must not be papered over.
    pub fn pid_from_file(&self) -> Result<Option<u32>, KeeperError> {
        let path = &self.ctx.pid_file;
        if !path.exists() {
            return Ok(None);
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match content.trim().parse::<u32>() {
                Ok(pid) => Ok(Some(pid)),
                Err(_) => {
                    warn!("Discarding unparseable pid file {}", path.display());
                    self.delete_pid()?;
                    Ok(None)
                }
            },
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                Err(KeeperError::PidFileAccess { path: path.clone() })
            }
            Err(source) => Err(KeeperError::PidFileIo {
                path: path.clone(),
                source,
            }),
        }
    }

    /// Resolve a stored pid against the live process table.
    ///
    /// A pid that no longer maps to a running process is a stale record:
    /// the pid file is deleted and `None` returned, so a later launch is
    /// never blocked by it.
    pub fn process_handle(&self, pid: u32) -> Result<Option<ProcessHandle>, KeeperError> {
        let alive = {
            let mut system = self.system.lock().unwrap();
            process::is_alive_in(&mut system, pid)
        };
        if !alive {
            debug!("Pid {} is not running, clearing stale pid file", pid);
            self.delete_pid()?;
            return Ok(None);
        }
        Ok(Some(ProcessHandle::new(pid)))
    }

    /// Remove the pid file. Deleting a file that does not exist is fine.
    pub fn delete_pid(&self) -> Result<(), KeeperError> {
        let path = &self.ctx.pid_file;
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!("Deleted pid file {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(KeeperError::PidFileIo {
                path: path.clone(),
                source,
            }),
        }
    }

    /// Write `pid` as the file's entire content, creating parent
    /// directories as needed and replacing any previous record.
    pub(crate) fn store_pid(&self, pid: u32) -> Result<(), KeeperError> {
        let path = &self.ctx.pid_file;
        let map = |source: io::Error| KeeperError::PidFileIo {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(map)?;
        }
        std::fs::write(path, pid.to_string()).map_err(map)?;
        info!("Stored pid {} in {}", pid, path.display());
        Ok(())
    }
}
