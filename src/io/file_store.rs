use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use regex::RegexBuilder;
use serde::Serialize;
use uuid::Uuid;

use super::DiskAllocator;
use crate::kernel::lock;

/// Directories that always exist, recreated by every wipe.
pub const TOP_LEVEL_DIRECTORIES: [&str; 6] = ["Desktop", "Documents", "Downloads", "Pictures", "Music", "System"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileKind {
    Directory,
    Text,
    Document,
    Image,
    Audio,
    Video,
    Archive,
    Executable,
    Other,
}

impl FileKind {
    pub fn from_name(name: &str) -> FileKind {
        let Some((_, extension)) = name.rsplit_once('.') else {
            return FileKind::Other;
        };

        match extension.to_ascii_lowercase().as_str() {
            "txt" | "md" | "log" | "csv" | "json" | "xml" | "ini" | "cfg" => FileKind::Text,
            "doc" | "docx" | "pdf" | "odt" | "rtf" => FileKind::Document,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "svg" => FileKind::Image,
            "mp3" | "wav" | "ogg" | "flac" => FileKind::Audio,
            "mp4" | "avi" | "mkv" | "mov" => FileKind::Video,
            "zip" | "tar" | "gz" | "7z" | "rar" => FileKind::Archive,
            "exe" | "bin" | "sh" | "bat" | "app" => FileKind::Executable,
            _ => FileKind::Other,
        }
    }
}

/// A named piece of content. Hidden entries are directory markers.
#[derive(Debug, Clone, Serialize)]
pub struct VirtualFile {
    pub id: Uuid,
    pub name: String,
    pub path: String,
    pub content: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub read_only: bool,
    pub hidden: bool,
}

impl VirtualFile {
    fn new(name: &str, path: &str, content: Vec<u8>, hidden: bool) -> VirtualFile {
        let now = Utc::now();
        VirtualFile {
            id: Uuid::new_v4(),
            name: name.to_string(),
            path: path.to_string(),
            content,
            created_at: now,
            modified_at: now,
            read_only: false,
            hidden,
        }
    }

    pub fn full_path(&self) -> String {
        join(&self.path, &self.name)
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }

    pub fn kind(&self) -> FileKind {
        if self.hidden {
            FileKind::Directory
        } else {
            FileKind::from_name(&self.name)
        }
    }

    pub fn is_directory(&self) -> bool {
        self.hidden
    }
}

/// Normalizes a directory path: forward slashes, one leading slash, no trailing slash.
pub fn normalize_dir(path: &str) -> String {
    let parts: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|part| !part.is_empty())
        .collect();

    format!("/{}", parts.join("/"))
}

fn join(dir: &str, name: &str) -> String {
    let dir = normalize_dir(dir);
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Case-insensitive lookup key. Also the name of the entry's disk blocks.
fn key_for(full_path: &str) -> String {
    normalize_dir(full_path).to_lowercase()
}

fn glob_to_regex(pattern: &str) -> String {
    let mut translated = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');
    translated
}

/// In-memory hierarchical file store. Disk space for every file is reserved through the
/// disk allocator under the file's lowercased full path.
///
/// Every operation holds the store lock for its whole duration.
pub struct FileStore {
    disk: Arc<DiskAllocator>,
    entries: Mutex<HashMap<String, VirtualFile>>,
}

impl FileStore {
    pub fn new(disk: Arc<DiskAllocator>) -> FileStore {
        let store = FileStore {
            disk,
            entries: Mutex::new(HashMap::new()),
        };
        Self::seed_directories(&mut lock(&store.entries));
        store
    }

    fn seed_directories(entries: &mut HashMap<String, VirtualFile>) {
        for name in TOP_LEVEL_DIRECTORIES {
            let marker = VirtualFile::new(name, "/", Vec::new(), true);
            entries.insert(key_for(&marker.full_path()), marker);
        }
    }

    fn valid_name(name: &str) -> bool {
        !name.trim().is_empty() && !name.contains(['/', '\\'])
    }

    /// Creates a file. Fails if the full path is taken, ignoring case, or the disk is full.
    pub fn create(&self, name: &str, path: &str, content: &[u8]) -> Option<VirtualFile> {
        if !Self::valid_name(name) {
            return None;
        }

        let file = VirtualFile::new(name, &normalize_dir(path), content.to_vec(), false);
        let key = key_for(&file.full_path());

        let mut entries = lock(&self.entries);
        if entries.contains_key(&key) {
            debug!("create: '{}' already exists", file.full_path());
            return None;
        }

        if self.disk.allocate(&key, DiskAllocator::units_for(content.len())).is_none() {
            warn!("create: not enough disk space for '{}'", file.full_path());
            return None;
        }

        debug!("created '{}' ({} bytes)", file.full_path(), file.size());
        entries.insert(key, file.clone());
        Some(file)
    }

    /// Creates a directory marker. Markers take no disk space.
    pub fn create_directory(&self, name: &str, path: &str) -> Option<VirtualFile> {
        if !Self::valid_name(name) {
            return None;
        }

        let marker = VirtualFile::new(name, &normalize_dir(path), Vec::new(), true);
        let key = key_for(&marker.full_path());

        let mut entries = lock(&self.entries);
        if entries.contains_key(&key) {
            return None;
        }

        debug!("created directory '{}'", marker.full_path());
        entries.insert(key, marker.clone());
        Some(marker)
    }

    pub fn read(&self, full_path: &str) -> Option<Vec<u8>> {
        lock(&self.entries)
            .get(&key_for(full_path))
            .filter(|entry| !entry.hidden)
            .map(|entry| entry.content.clone())
    }

    pub fn read_to_string(&self, full_path: &str) -> Option<String> {
        self.read(full_path)
            .map(|content| String::from_utf8_lossy(&content).into_owned())
    }

    pub fn info(&self, full_path: &str) -> Option<VirtualFile> {
        lock(&self.entries).get(&key_for(full_path)).cloned()
    }

    pub fn exists(&self, full_path: &str) -> bool {
        lock(&self.entries).contains_key(&key_for(full_path))
    }

    /// Replaces the content of a writable file.
    ///
    /// The disk reservation made at creation is left as is, even if the new content is larger.
    pub fn update(&self, full_path: &str, content: &[u8]) -> bool {
        let mut entries = lock(&self.entries);
        let Some(entry) = entries.get_mut(&key_for(full_path)) else {
            return false;
        };
        if entry.read_only || entry.hidden {
            return false;
        }

        entry.content = content.to_vec();
        entry.modified_at = Utc::now();
        debug!("updated '{}' ({} bytes)", entry.full_path(), entry.size());
        true
    }

    /// Removes a writable file, or an empty directory, and releases its disk space.
    pub fn delete(&self, full_path: &str) -> bool {
        let key = key_for(full_path);
        let mut entries = lock(&self.entries);

        let Some(entry) = entries.get(&key) else {
            return false;
        };
        if entry.read_only {
            return false;
        }
        if entry.hidden {
            let dir = key.as_str();
            if entries.values().any(|child| child.path.to_lowercase() == dir) {
                debug!("delete: directory '{}' is not empty", full_path);
                return false;
            }
        }

        entries.remove(&key);
        self.disk.deallocate_by_name(&key);
        debug!("deleted '{}'", full_path);
        true
    }

    pub fn set_read_only(&self, full_path: &str, read_only: bool) -> bool {
        match lock(&self.entries).get_mut(&key_for(full_path)) {
            Some(entry) => {
                entry.read_only = read_only;
                true
            }
            None => false,
        }
    }

    /// Copies a file into `dest_dir`, optionally under a new name. The copy is writable.
    pub fn copy(&self, source: &str, dest_dir: &str, new_name: Option<&str>) -> Option<VirtualFile> {
        let (name, content) = {
            let entries = lock(&self.entries);
            let entry = entries.get(&key_for(source)).filter(|entry| !entry.hidden)?;
            (entry.name.clone(), entry.content.clone())
        };

        self.create(new_name.unwrap_or(name.as_str()), dest_dir, &content)
    }

    /// Moves a file into `dest_dir`, keeping its name.
    pub fn move_to(&self, source: &str, dest_dir: &str) -> bool {
        match self.info(source) {
            Some(entry) if !entry.read_only && !entry.hidden => {}
            _ => return false,
        }

        let Some(copied) = self.copy(source, dest_dir, None) else {
            return false;
        };

        if self.delete(source) {
            true
        } else {
            self.delete(&copied.full_path());
            false
        }
    }

    /// Entries directly inside `dir_path`, sorted by name. Directory markers are included.
    pub fn list(&self, dir_path: &str) -> Vec<VirtualFile> {
        let dir = key_for(dir_path);
        let mut listing: Vec<VirtualFile> = lock(&self.entries)
            .values()
            .filter(|entry| entry.path.to_lowercase() == dir)
            .cloned()
            .collect();

        listing.sort_by_key(|entry| entry.name.to_lowercase());
        listing
    }

    /// Files whose name matches a glob (`*` any run, `?` one character), ignoring case.
    pub fn search(&self, pattern: &str) -> Vec<VirtualFile> {
        let regex = match RegexBuilder::new(&glob_to_regex(pattern)).case_insensitive(true).build() {
            Ok(regex) => regex,
            Err(err) => {
                warn!("search: unusable pattern '{}': {}", pattern, err);
                return Vec::new();
            }
        };

        let mut found: Vec<VirtualFile> = lock(&self.entries)
            .values()
            .filter(|entry| !entry.hidden && regex.is_match(&entry.name))
            .cloned()
            .collect();

        found.sort_by_key(VirtualFile::full_path);
        found
    }

    /// Removes every entry and recreates the top-level directories. Refused outside kernel mode.
    pub fn clear_all(&self, is_privileged: bool) -> bool {
        if !is_privileged {
            warn!("file store wipe refused: kernel mode required");
            return false;
        }

        let mut entries = lock(&self.entries);
        for key in entries.keys() {
            self.disk.deallocate_by_name(key);
        }
        entries.clear();
        Self::seed_directories(&mut entries);

        info!("file store wiped");
        true
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}
