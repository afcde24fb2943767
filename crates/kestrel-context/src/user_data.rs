use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info};

/// Per-process lock files a browser leaves behind in its profile directory.
pub const LOCK_FILES: &[&str] = &["SingletonLock", "SingletonCookie", "SingletonSocket", "lockfile"];

/// Create the browser user-data directory if missing and clear stale lock
/// files from a previous process.
pub fn prepare_user_data_dir(path: &Path) -> io::Result<()> {
  if !path.exists() {
    fs::create_dir_all(path)?;
    info!(path = %path.display(), "user_data_dir_created");
    return Ok(());
  }

  for name in LOCK_FILES {
    let lock = path.join(name);
    // SingletonLock is usually a dangling symlink, so `exists` would miss it
    if fs::symlink_metadata(&lock).is_ok() {
      match fs::remove_file(&lock) {
        Ok(()) => debug!(file = %lock.display(), "stale_lock_removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
      }
    }
  }
  Ok(())
}
