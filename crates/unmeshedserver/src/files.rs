use crate::error::ApiError;
use std::collections::{BTreeMap, BTreeSet};
use unmeshedcore::{DeleteFileResponse, FileEntry, ListFilesResponse, UploadFileResponse};

/// Prefix clients may put in front of stored paths
const FILES_ROOT: &str = "/app/files";

/// Turn any client path into `/a/b/c` form
pub fn normalize(path: &str) -> String {
    let path = path.trim();
    let path = match path.strip_prefix(FILES_ROOT) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    };
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    format!("/{}", segments.join("/"))
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Files kept in memory, keyed by absolute path; folders exist through their files
#[derive(Default)]
pub struct FileStore {
    files: BTreeMap<String, Vec<u8>>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload(&mut self, folder: &str, name: &str, content: Vec<u8>) -> Result<UploadFileResponse, ApiError> {
        let name = name.trim();
        if name.is_empty() || name.contains('/') {
            return Err(ApiError::BadRequest(format!("Invalid file name '{}'", name)));
        }
        let path = normalize(&format!("{}/{}", normalize(folder), name));
        let size = content.len() as u64;
        tracing::info!("Stored {} ({} bytes)", path, size);
        self.files.insert(path.clone(), content);
        Ok(UploadFileResponse {
            path,
            name: name.to_string(),
            size,
        })
    }

    pub fn download(&self, path: &str) -> Result<(String, &[u8]), ApiError> {
        let path = normalize(path);
        match self.files.get(&path) {
            Some(content) => Ok((path, content.as_slice())),
            None => Err(ApiError::NotFound(format!("File {} not found", path))),
        }
    }

    /// Direct children of a folder, folders first
    pub fn list(&self, path: &str) -> Result<ListFilesResponse, ApiError> {
        let dir = normalize(path);
        let prefix = if dir == "/" { dir.clone() } else { format!("{}/", dir) };

        let mut folders: BTreeMap<String, u64> = BTreeMap::new();
        let mut files = Vec::new();
        for (key, content) in self.files.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((folder, _)) => *folders.entry(folder.to_string()).or_default() += content.len() as u64,
                None => files.push(FileEntry {
                    name: rest.to_string(),
                    path: key.clone(),
                    folder: false,
                    size: content.len() as u64,
                }),
            }
        }

        if dir != "/" && folders.is_empty() && files.is_empty() {
            return Err(ApiError::NotFound(format!("Folder {} not found", dir)));
        }

        let mut entries: Vec<FileEntry> = folders
            .into_iter()
            .map(|(name, size)| FileEntry {
                path: format!("{}{}", prefix, name),
                name,
                folder: true,
                size,
            })
            .collect();
        entries.extend(files);
        Ok(ListFilesResponse { path: dir, entries })
    }

    /// Remove a file, or every file below a folder
    pub fn delete(&mut self, path: &str) -> DeleteFileResponse {
        let path = normalize(path);
        if self.files.remove(&path).is_some() {
            return DeleteFileResponse {
                message: format!("Deleted file {}", file_name(&path)),
                path,
                deleted: true,
            };
        }

        let prefix = if path == "/" { path.clone() } else { format!("{}/", path) };
        let doomed: BTreeSet<String> = self
            .files
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.files.remove(key);
        }

        if doomed.is_empty() {
            DeleteFileResponse {
                message: format!("Nothing found at {}", path),
                path,
                deleted: false,
            }
        } else {
            DeleteFileResponse {
                message: format!("Deleted folder with {} files", doomed.len()),
                path,
                deleted: true,
            }
        }
    }
}
