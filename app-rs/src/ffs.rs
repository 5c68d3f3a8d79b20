use std::{fs, io, path::PathBuf};

use anyhow::Context;

/// Abstraction over a flat file system (no subdirs), suitable for mocking.
pub trait Ffs {
    /// NOTE: Use [`io::ErrorKind::NotFound`] to detect if a file is missing.
    fn read(&self, filename: &str) -> io::Result<Vec<u8>>;

    fn write(&self, filename: &str, data: &[u8]) -> io::Result<()>;

    /// Delete file.
    fn delete(&self, filename: &str) -> io::Result<()>;

    /// Delete all files in the `Ffs`.
    fn delete_all(&self) -> io::Result<()>;
}

/// File system impl for [`Ffs`] that does real IO.
#[derive(Clone)]
pub struct DiskFs {
    base_dir: PathBuf,
}

impl DiskFs {
    /// Create a new [`DiskFs`] ready for use, creating `base_dir` and any
    /// parent directories if they don't exist yet.
    pub fn create_dir_all(base_dir: PathBuf) -> anyhow::Result<Self> {
        fs::create_dir_all(&base_dir).with_context(|| {
            format!("Failed to create directory ({})", base_dir.display())
        })?;
        Ok(Self { base_dir })
    }
}

impl Ffs for DiskFs {
    fn read(&self, filename: &str) -> io::Result<Vec<u8>> {
        fs::read(self.base_dir.join(filename))
    }

    fn write(&self, filename: &str, data: &[u8]) -> io::Result<()> {
        // NOTE: could use the `atomicwrites` crate to make this a little
        // safer against random crashes. Definitely not free though; costs at
        // least 5ms per write on Linux.
        fs::write(self.base_dir.join(filename), data)
    }

    fn delete(&self, filename: &str) -> io::Result<()> {
        fs::remove_file(self.base_dir.join(filename))
    }

    fn delete_all(&self) -> io::Result<()> {
        fs::remove_dir_all(&self.base_dir)?;
        fs::create_dir(&self.base_dir)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::{
        collections::BTreeMap,
        sync::{Arc, Mutex},
    };

    use super::*;

    fn io_err_not_found(filename: &str) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, filename)
    }

    /// In-memory [`Ffs`] impl for tests.
    #[derive(Clone, Debug)]
    pub(crate) struct MockFfs {
        files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    }

    impl MockFfs {
        pub(crate) fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(BTreeMap::new())),
            }
        }
    }

    impl Ffs for MockFfs {
        fn read(&self, filename: &str) -> io::Result<Vec<u8>> {
            self.files
                .lock()
                .unwrap()
                .get(filename)
                .cloned()
                .ok_or_else(|| io_err_not_found(filename))
        }

        fn write(&self, filename: &str, data: &[u8]) -> io::Result<()> {
            self.files
                .lock()
                .unwrap()
                .insert(filename.to_owned(), data.to_owned());
            Ok(())
        }

        fn delete(&self, filename: &str) -> io::Result<()> {
            match self.files.lock().unwrap().remove(filename) {
                Some(_) => Ok(()),
                None => Err(io_err_not_found(filename)),
            }
        }

        fn delete_all(&self) -> io::Result<()> {
            self.files.lock().unwrap().clear();
            Ok(())
        }
    }
}
