//! Disc access.
//!
//! The session never touches the file system directly; it reads the BDMV
//! tree through [`DiscAccess`]. Paths are relative to the disc root and use
//! `/` separators (`BDMV/index.bdmv`, `BDMV/STREAM/00001.m2ts`).

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use log::debug;
use parking_lot::Mutex;

/// Sector size of block devices.
pub const BLOCK_SIZE: usize = 2048;

/// A file opened for random access.
pub trait DiscFile: Send {
    fn size(&self) -> u64;

    /// Read at `offset`; returns 0 at end of file.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}

/// Read as much of `buf` as the file provides, looping over short reads.
pub fn read_full(file: &mut dyn DiscFile, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    let mut done = 0;
    while done < buf.len() {
        let n = file.read_at(offset + done as u64, &mut buf[done..])?;
        if n == 0 {
            break;
        }
        done += n;
    }
    Ok(done)
}

/// Access to the files of one disc.
pub trait DiscAccess: Send + Sync {
    fn open_file(&self, path: &str) -> io::Result<Box<dyn DiscFile>>;

    /// File names (not paths) inside a directory.
    fn list_dir(&self, path: &str) -> io::Result<Vec<String>>;

    fn exists(&self, path: &str) -> bool {
        self.open_file(path).is_ok()
    }

    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        let mut file = self.open_file(path)?;
        let mut buf = vec![0u8; file.size() as usize];
        let n = read_full(file.as_mut(), 0, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Location handed to decryption engines, when the disc has one.
    fn root_path(&self) -> Option<&Path> {
        None
    }
}

/// Disc mounted or copied into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryDisc {
    root: PathBuf,
}

impl DirectoryDisc {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        full.extend(path.split('/').filter(|c| !c.is_empty()));
        full
    }
}

struct LocalFile {
    file: File,
    size: u64,
}

impl DiscFile for LocalFile {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read(buf)
    }
}

impl DiscAccess for DirectoryDisc {
    fn open_file(&self, path: &str) -> io::Result<Box<dyn DiscFile>> {
        let file = File::open(self.resolve(path))?;
        let size = file.metadata()?.len();
        Ok(Box::new(LocalFile { file, size }))
    }

    fn list_dir(&self, path: &str) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.resolve(path))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn root_path(&self) -> Option<&Path> {
        Some(&self.root)
    }
}

/// Location of a file on a block device. Files are single contiguous extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileExtent {
    /// First logical block.
    pub lba: u32,
    /// Size in bytes.
    pub size: u64,
}

/// Host callback filling `buf` with `count` blocks starting at `lba`.
/// Returns the number of blocks read.
pub type ReadBlocks = Box<dyn FnMut(&mut [u8], u32, u32) -> io::Result<u32> + Send>;

/// Disc read through a host block-reading callback and a file extent table.
pub struct BlockDisc {
    reader: Arc<Mutex<ReadBlocks>>,
    files: HashMap<String, FileExtent>,
}

impl BlockDisc {
    pub fn new(read_blocks: ReadBlocks) -> Self {
        Self {
            reader: Arc::new(Mutex::new(read_blocks)),
            files: HashMap::new(),
        }
    }

    /// Register the extent of a file as resolved by the host.
    pub fn add_file(&mut self, path: &str, extent: FileExtent) {
        self.files.insert(path.trim_start_matches('/').to_string(), extent);
    }
}

struct BlockFile {
    reader: Arc<Mutex<ReadBlocks>>,
    extent: FileExtent,
}

impl DiscFile for BlockFile {
    fn size(&self) -> u64 {
        self.extent.size
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.extent.size || buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min((self.extent.size - offset) as usize);
        let skip = (offset % BLOCK_SIZE as u64) as usize;
        let lba = self.extent.lba as u64 + offset / BLOCK_SIZE as u64;
        let lba = u32::try_from(lba)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "block address overflow"))?;
        let count = (skip + len).div_ceil(BLOCK_SIZE);

        let mut blocks = vec![0u8; count * BLOCK_SIZE];
        let got = {
            let mut read_blocks = self.reader.lock();
            (*read_blocks)(&mut blocks, lba, count as u32)? as usize
        };
        let avail = (got.min(count) * BLOCK_SIZE).saturating_sub(skip).min(len);
        buf[..avail].copy_from_slice(&blocks[skip..skip + avail]);
        Ok(avail)
    }
}

impl DiscAccess for BlockDisc {
    fn open_file(&self, path: &str) -> io::Result<Box<dyn DiscFile>> {
        let extent = self
            .files
            .get(path)
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?;
        Ok(Box::new(BlockFile {
            reader: self.reader.clone(),
            extent,
        }))
    }

    fn list_dir(&self, path: &str) -> io::Result<Vec<String>> {
        Ok(list_children(self.files.keys(), path))
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}

fn list_children<'a>(paths: impl Iterator<Item = &'a String>, dir: &str) -> Vec<String> {
    let prefix = format!("{}/", dir.trim_end_matches('/'));
    let mut names: Vec<String> = paths
        .filter_map(|p| p.strip_prefix(&prefix))
        .filter(|rest| !rest.is_empty() && !rest.contains('/'))
        .map(str::to_string)
        .collect();
    names.sort();
    names
}

/// Disc image held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDisc {
    files: HashMap<String, Bytes>,
}

impl MemoryDisc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, data: impl Into<Bytes>) {
        let data = data.into();
        debug!("[Disc] Memory file {} ({} bytes)", path, data.len());
        self.files.insert(path.to_string(), data);
    }

    pub fn remove(&mut self, path: &str) -> Option<Bytes> {
        self.files.remove(path)
    }
}

struct MemoryFile {
    data: Bytes,
}

impl DiscFile for MemoryFile {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }
}

impl DiscAccess for MemoryDisc {
    fn open_file(&self, path: &str) -> io::Result<Box<dyn DiscFile>> {
        let data = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?;
        Ok(Box::new(MemoryFile { data }))
    }

    fn list_dir(&self, path: &str) -> io::Result<Vec<String>> {
        Ok(list_children(self.files.keys(), path))
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_memory_disc_listing_and_reads() {
        let mut disc = MemoryDisc::new();
        disc.insert("BDMV/index.bdmv", vec![1u8, 2, 3]);
        disc.insert("BDMV/PLAYLIST/00001.mpls", vec![0u8; 4]);
        disc.insert("BDMV/PLAYLIST/00000.mpls", vec![0u8; 4]);

        assert_eq!(
            disc.list_dir("BDMV/PLAYLIST").unwrap(),
            vec!["00000.mpls", "00001.mpls"]
        );
        assert_eq!(disc.list_dir("BDMV").unwrap(), vec!["index.bdmv"]);
        assert_eq!(disc.read_file("BDMV/index.bdmv").unwrap(), vec![1, 2, 3]);
        assert!(disc.exists("BDMV/index.bdmv"));
        assert!(!disc.exists("BDMV/MovieObject.bdmv"));

        let mut file = disc.open_file("BDMV/index.bdmv").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(file.read_at(1, &mut buf).unwrap(), 2);
        assert_eq!(file.read_at(3, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_directory_disc() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("BDMV/PLAYLIST")).unwrap();
        let mut f = File::create(dir.path().join("BDMV/PLAYLIST/00002.mpls")).unwrap();
        f.write_all(b"MPLS0200").unwrap();

        let disc = DirectoryDisc::new(dir.path());
        assert_eq!(disc.list_dir("BDMV/PLAYLIST").unwrap(), vec!["00002.mpls"]);
        assert_eq!(
            disc.read_file("BDMV/PLAYLIST/00002.mpls").unwrap(),
            b"MPLS0200".to_vec()
        );
        assert!(disc.exists("BDMV/PLAYLIST/00002.mpls"));
        assert!(disc.open_file("BDMV/index.bdmv").is_err());
        assert_eq!(disc.root_path(), Some(dir.path()));
    }

    #[test]
    fn test_block_disc_unaligned_reads() {
        // Image of 4 blocks where every byte holds (offset % 251).
        let image: Vec<u8> = (0..4 * BLOCK_SIZE).map(|i| (i % 251) as u8).collect();
        let mut disc = BlockDisc::new(Box::new(move |buf: &mut [u8], lba: u32, count: u32| -> io::Result<u32> {
            let start = lba as usize * BLOCK_SIZE;
            let end = (start + count as usize * BLOCK_SIZE).min(image.len());
            let n = end.saturating_sub(start);
            buf[..n].copy_from_slice(&image[start..end]);
            Ok((n / BLOCK_SIZE) as u32)
        }));
        disc.add_file(
            "BDMV/STREAM/00001.m2ts",
            FileExtent {
                lba: 1,
                size: 3000,
            },
        );

        assert_eq!(disc.list_dir("BDMV/STREAM").unwrap(), vec!["00001.m2ts"]);
        let mut file = disc.open_file("BDMV/STREAM/00001.m2ts").unwrap();
        let mut buf = vec![0u8; 100];
        assert_eq!(file.read_at(2000, &mut buf).unwrap(), 100);
        let expected: Vec<u8> = (BLOCK_SIZE + 2000..BLOCK_SIZE + 2100)
            .map(|i| (i % 251) as u8)
            .collect();
        assert_eq!(buf, expected);

        let data = disc.read_file("BDMV/STREAM/00001.m2ts").unwrap();
        assert_eq!(data.len(), 3000);
        assert_eq!(file.read_at(3000, &mut buf).unwrap(), 0);
    }
}
