//! Модуль для кэширования фрагментов синтезированной речи
//!
//! Ключ кэша - точный текст фрагмента, значение - нетронутые байты ответа
//! до декодирования. Срока жизни нет. При переполнении хранилище очищается
//! целиком перед следующей записью.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::Mutex;
use walkdir::WalkDir;

use crate::config::CacheConfig;
use crate::error::Result;

const ENTRY_EXTENSION: &str = "audio";

/// Хранилище фрагментов
#[async_trait]
pub trait ChunkCache: Send + Sync {
    /// Найти фрагмент по тексту
    async fn get(&self, text: &str) -> Option<Bytes>;

    /// Сохранить фрагмент
    async fn put(&self, text: &str, data: Bytes) -> Result<()>;

    /// Удалить все записи, вернуть их количество
    async fn clear(&self) -> Result<usize>;

    /// Количество записей
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Кэш в памяти процесса
pub struct MemoryChunkCache {
    entries: Mutex<HashMap<String, Bytes>>,
    max_entries: usize,
}

impl MemoryChunkCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
        }
    }
}

#[async_trait]
impl ChunkCache for MemoryChunkCache {
    async fn get(&self, text: &str) -> Option<Bytes> {
        self.entries.lock().get(text).cloned()
    }

    async fn put(&self, text: &str, data: Bytes) -> Result<()> {
        let mut entries = self.entries.lock();
        if entries.len() > self.max_entries {
            info!("Chunk cache over {} entries, clearing {}", self.max_entries, entries.len());
            entries.clear();
        }
        entries.insert(text.to_string(), data);
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        Ok(count)
    }

    async fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Кэш на диске: один файл на запись, имя - md5 текста
pub struct FileChunkCache {
    dir: PathBuf,
    max_entries: usize,
}

impl FileChunkCache {
    /// Создать кэш в директории, создав ее при необходимости
    pub fn new<P: AsRef<Path>>(dir: P, max_entries: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir, max_entries })
    }

    /// Директория по умолчанию во временной папке системы
    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join("tts-mixdown-cache")
    }

    /// Путь к файлу записи
    fn entry_path(&self, text: &str) -> PathBuf {
        let digest = md5::compute(text.as_bytes());
        self.dir.join(format!("{:x}.{}", digest, ENTRY_EXTENSION))
    }

    fn entry_files(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == ENTRY_EXTENSION))
            .map(|e| e.into_path())
            .collect()
    }

    fn remove_all(&self) -> Result<usize> {
        let files = self.entry_files();
        for file in &files {
            std::fs::remove_file(file)?;
        }
        Ok(files.len())
    }
}

#[async_trait]
impl ChunkCache for FileChunkCache {
    async fn get(&self, text: &str) -> Option<Bytes> {
        let path = self.entry_path(text);
        match tokio::fs::read(&path).await {
            Ok(data) if !data.is_empty() => Some(Bytes::from(data)),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Cache lookup failed for {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn put(&self, text: &str, data: Bytes) -> Result<()> {
        let count = self.entry_files().len();
        if count > self.max_entries {
            info!("Chunk cache over {} entries, clearing {}", self.max_entries, count);
            self.remove_all()?;
        }

        let path = self.entry_path(text);
        tokio::fs::write(&path, &data).await?;
        debug!("Cached {} bytes at {}", data.len(), path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        let removed = self.remove_all()?;
        info!("Removed {} cached chunks from {}", removed, self.dir.display());
        Ok(removed)
    }

    async fn len(&self) -> usize {
        self.entry_files().len()
    }
}

/// Пустой кэш для отключенного кэширования
pub struct NoopChunkCache;

#[async_trait]
impl ChunkCache for NoopChunkCache {
    async fn get(&self, _text: &str) -> Option<Bytes> {
        None
    }

    async fn put(&self, _text: &str, _data: Bytes) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        Ok(0)
    }

    async fn len(&self) -> usize {
        0
    }
}

/// Построить кэш по конфигурации
pub fn from_config(config: &CacheConfig) -> Result<Box<dyn ChunkCache>> {
    if !config.enabled {
        return Ok(Box::new(NoopChunkCache));
    }
    match &config.dir {
        Some(dir) => Ok(Box::new(FileChunkCache::new(dir, config.max_entries)?)),
        None => Ok(Box::new(MemoryChunkCache::new(config.max_entries))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_memory_cache_roundtrip() {
        let cache = MemoryChunkCache::new(10);
        assert!(cache.get("xin chào").await.is_none());
        cache.put("xin chào", Bytes::from_static(b"ID3abc")).await.unwrap();
        assert_eq!(cache.get("xin chào").await.unwrap(), Bytes::from_static(b"ID3abc"));
        // ключ - точный текст
        assert!(cache.get("xin chào ").await.is_none());
    }

    #[tokio::test]
    async fn test_memory_cache_clears_on_overflow() {
        let cache = MemoryChunkCache::new(2);
        for key in ["a", "b", "c"] {
            cache.put(key, Bytes::from_static(b"x")).await.unwrap();
        }
        assert_eq!(cache.len().await, 3);

        cache.put("d", Bytes::from_static(b"y")).await.unwrap();
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("a").await.is_none());
        assert!(cache.get("d").await.is_some());
    }

    #[tokio::test]
    async fn test_file_cache_persists_and_clears() {
        let dir = tempdir().unwrap();
        let cache = FileChunkCache::new(dir.path().join("chunks"), 100).unwrap();

        cache.put("one", Bytes::from_static(b"111")).await.unwrap();
        cache.put("two", Bytes::from_static(b"222")).await.unwrap();
        assert_eq!(cache.len().await, 2);

        let reopened = FileChunkCache::new(dir.path().join("chunks"), 100).unwrap();
        assert_eq!(reopened.get("two").await.unwrap(), Bytes::from_static(b"222"));

        assert_eq!(reopened.clear().await.unwrap(), 2);
        assert!(reopened.is_empty().await);
        assert!(cache.get("one").await.is_none());
    }

    #[tokio::test]
    async fn test_file_cache_overflow() {
        let dir = tempdir().unwrap();
        let cache = FileChunkCache::new(dir.path(), 1).unwrap();
        cache.put("a", Bytes::from_static(b"1")).await.unwrap();
        cache.put("b", Bytes::from_static(b"2")).await.unwrap();
        cache.put("c", Bytes::from_static(b"3")).await.unwrap();
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("c").await.is_some());
    }

    #[test]
    fn test_disabled_cache_is_noop() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        let cache = from_config(&config).unwrap();
        tokio_test::block_on(async {
            tokio_test::assert_ok!(cache.put("a", Bytes::from_static(b"1")).await);
            assert!(cache.get("a").await.is_none());
            assert_eq!(tokio_test::assert_ok!(cache.clear().await), 0);
        });
    }
}
