use std::{
    collections::{HashMap, HashSet},
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use log::debug;

pub static EXPORT_PATH: &str = "/sys/class/gpio/gpiochip0/subsystem/export";
pub static UNEXPORT_PATH: &str = "/sys/class/gpio/gpiochip0/subsystem/unexport";

/// Path of the `direction` attribute of an exported pin.
pub fn direction_path(pin: u32) -> String {
    format!("/sys/class/gpio/gpio{}/direction", pin)
}

/// Path of the `value` attribute of an exported pin.
pub fn value_path(pin: u32) -> String {
    format!("/sys/class/gpio/gpio{}/value", pin)
}

/// The raw text I/O primitive the controller is built on.
///
/// Every call is a single open, write or read, close on the named resource.
/// Implementations must not retry or reorder calls.
pub trait SysfsPort {
    fn write_text(&mut self, path: &str, content: &str) -> io::Result<()>;
    fn read_text(&mut self, path: &str) -> io::Result<String>;
}

impl<P: SysfsPort + ?Sized> SysfsPort for &mut P {
    fn write_text(&mut self, path: &str, content: &str) -> io::Result<()> {
        (**self).write_text(path, content)
    }

    fn read_text(&mut self, path: &str) -> io::Result<String> {
        (**self).read_text(path)
    }
}

/// Port backed by the real filesystem.
///
/// The sysfs paths are absolute. With [`SysfsFs::with_root`] they are resolved
/// below another directory instead of `/`, which is useful for staging trees.
///
/// # Example
///
/// ```rust
/// use omega_gpio::sysfs::SysfsFs;
///
/// let port = SysfsFs::new();
/// assert_eq!(port.resolve("/sys/class/gpio/gpio8/value").to_str(), Some("/sys/class/gpio/gpio8/value"));
///
/// let staged = SysfsFs::with_root("/tmp/staging");
/// assert_eq!(staged.resolve("/sys/class/gpio/gpio8/value").to_str(), Some("/tmp/staging/sys/class/gpio/gpio8/value"));
/// ```
#[derive(Debug, Clone)]
pub struct SysfsFs {
    root: PathBuf,
}

impl SysfsFs {
    pub fn new() -> Self {
        Self::with_root("/")
    }

    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        SysfsFs {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl Default for SysfsFs {
    fn default() -> Self {
        Self::new()
    }
}

impl SysfsPort for SysfsFs {
    fn write_text(&mut self, path: &str, content: &str) -> io::Result<()> {
        let resolved = self.resolve(path);
        debug!("write {:?} -> {}", content, resolved.display());

        // sysfs attributes already exist, never create them
        let mut f = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&resolved)?;
        f.write_all(content.as_bytes())
    }

    fn read_text(&mut self, path: &str) -> io::Result<String> {
        let resolved = self.resolve(path);
        let contents = fs::read_to_string(&resolved)?;
        debug!("read {:?} <- {}", contents, resolved.display());
        Ok(contents)
    }
}

/// One call recorded by [`MemorySysfs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SysfsOp {
    Write { path: String, content: String },
    Read { path: String },
}

impl SysfsOp {
    pub fn write(path: &str, content: &str) -> Self {
        SysfsOp::Write {
            path: path.to_string(),
            content: content.to_string(),
        }
    }

    pub fn read(path: &str) -> Self {
        SysfsOp::Read {
            path: path.to_string(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            SysfsOp::Write { path, .. } | SysfsOp::Read { path } => path,
        }
    }
}

/// In-memory port for tests and dry runs.
///
/// Records every call in order, echoes the last content written to a path back
/// on read, and can be told to fail any call on a given path. Failed calls are
/// still recorded.
///
/// # Example
///
/// ```rust
/// use omega_gpio::sysfs::{MemorySysfs, SysfsPort};
///
/// let mut port = MemorySysfs::new();
/// port.write_text("/sys/class/gpio/gpio8/value", "1").unwrap();
/// assert_eq!(port.read_text("/sys/class/gpio/gpio8/value").unwrap(), "1");
/// assert_eq!(port.ops().len(), 2);
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemorySysfs {
    files: HashMap<String, String>,
    failing: HashSet<String>,
    ops: Vec<SysfsOp>,
}

impl MemorySysfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `path` with `content` without recording a call.
    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.insert(path.to_string(), content.to_string());
        self
    }

    /// Makes every subsequent call on `path` fail with `PermissionDenied`.
    pub fn fail_on(&mut self, path: &str) {
        self.failing.insert(path.to_string());
    }

    pub fn ops(&self) -> &[SysfsOp] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    pub fn contents(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Contents written to `path`, in call order.
    pub fn writes_to(&self, path: &str) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                SysfsOp::Write { path: p, content } if p == path => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    fn check(&self, path: &str) -> io::Result<()> {
        if self.failing.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{}: permission denied", path),
            ));
        }
        Ok(())
    }
}

impl SysfsPort for MemorySysfs {
    fn write_text(&mut self, path: &str, content: &str) -> io::Result<()> {
        self.ops.push(SysfsOp::write(path, content));
        self.check(path)?;
        self.files.insert(path.to_string(), content.to_string());
        Ok(())
    }

    fn read_text(&mut self, path: &str) -> io::Result<String> {
        self.ops.push(SysfsOp::read(path));
        self.check(path)?;
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{}: no such file", path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_path_templates() {
        assert_eq!(direction_path(8), "/sys/class/gpio/gpio8/direction");
        assert_eq!(value_path(26), "/sys/class/gpio/gpio26/value");
    }

    #[test]
    fn test_memory_records_failed_calls() {
        let mut port = MemorySysfs::new();
        port.fail_on(UNEXPORT_PATH);

        let err = port.write_text(UNEXPORT_PATH, "8").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(port.ops(), &[SysfsOp::write(UNEXPORT_PATH, "8")]);
        assert_eq!(port.contents(UNEXPORT_PATH), None);
    }

    #[test]
    fn test_memory_read_missing_file() {
        let mut port = MemorySysfs::new();
        let err = port.read_text(&value_path(8)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_fs_write_and_read() {
        let dir = tempdir().unwrap();
        let gpio_dir = dir.path().join("sys/class/gpio/gpio8");
        fs::create_dir_all(&gpio_dir).unwrap();
        fs::write(gpio_dir.join("value"), "").unwrap();

        let mut port = SysfsFs::with_root(dir.path());
        port.write_text(&value_path(8), "1").unwrap();
        assert_eq!(port.read_text(&value_path(8)).unwrap(), "1");
    }

    #[test]
    fn test_fs_does_not_create_attributes() {
        let dir = tempdir().unwrap();
        let mut port = SysfsFs::with_root(dir.path());

        let err = port.write_text(EXPORT_PATH, "8").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!port.resolve(EXPORT_PATH).exists());
    }
}
