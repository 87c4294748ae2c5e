use color_eyre::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Log file written by the tracing subscriber.
pub const LOG_FILE: &str = "cwicr.log";

/// Registry of known cache files
const CACHE_FILES: &[&str] = &[LOG_FILE];

/// Cache directory holding the log
#[derive(Clone)]
pub struct CacheManager {
    pub(crate) cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(app_name: &str) -> Result<Self> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| color_eyre::eyre::eyre!("Could not determine cache directory"))?
            .join(app_name);

        Ok(Self { cache_dir })
    }

    /// Cache rooted at an explicit directory.
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cache_file(&self, filename: &str) -> PathBuf {
        self.cache_dir.join(filename)
    }

    pub fn ensure_cache_dir(&self) -> Result<()> {
        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir)?;
        }
        Ok(())
    }

    /// Removes every registered cache file. Returns how many were removed.
    pub fn clear_all(&self) -> Result<usize> {
        let mut removed = 0;
        for filename in CACHE_FILES {
            let file_path = self.cache_file(filename);
            if file_path.exists() {
                match fs::remove_file(&file_path) {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        eprintln!("Warning: Could not remove cache file {}: {}", filename, e)
                    }
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clear_all_removes_registered_files() -> Result<()> {
        let temp = TempDir::new()?;
        let cache = CacheManager::with_dir(temp.path().join("cwicr"));
        cache.ensure_cache_dir()?;
        fs::write(cache.cache_file(LOG_FILE), "log")?;
        fs::write(cache.cache_file("other.txt"), "keep")?;
        assert_eq!(cache.clear_all()?, 1);
        assert!(!cache.cache_file(LOG_FILE).exists());
        assert!(cache.cache_file("other.txt").exists());
        assert_eq!(cache.clear_all()?, 0);
        Ok(())
    }
}
