use crate::convert::filename::{extension_for_mime, extension_of, unique_name};
use crate::download::fetch::{Fetcher, decode_data_url};
use crate::download::{DownloadId, DownloadItem, DownloadManager, DownloadObserver, DownloadRequest, FilenameDecision};
use crate::error::{Result, TakeoutError};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Download capability that saves into a directory.
///
/// `data:` URLs are decoded in place, everything else goes through the
/// [`Fetcher`]. Downloads complete synchronously inside [`DownloadManager::create`],
/// raising `on_created` and (when no name was requested)
/// `on_determining_filename` on the observer first.
pub struct FsDownloads {
    dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    observer: Mutex<Option<Weak<dyn DownloadObserver>>>,
    entries: Mutex<Vec<(DownloadId, PathBuf)>>,
    next: AtomicUsize,
}

impl FsDownloads {
    pub fn new(dir: impl Into<PathBuf>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            dir: dir.into(),
            fetcher,
            observer: Mutex::new(None),
            entries: Mutex::new(Vec::new()),
            next: AtomicUsize::new(0),
        }
    }

    pub fn set_observer(&self, observer: Weak<dyn DownloadObserver>) {
        *self.observer.lock() = Some(observer);
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where a download was saved, if it is still in the history
    pub fn path_of(&self, id: &DownloadId) -> Option<PathBuf> {
        self.entries
            .lock()
            .iter()
            .find(|(entry, _)| entry == id)
            .map(|(_, path)| path.clone())
    }

    /// Saved files still in the history, oldest first
    pub fn completed(&self) -> Vec<PathBuf> {
        self.entries.lock().iter().map(|(_, path)| path.clone()).collect()
    }

    fn observer(&self) -> Option<Arc<dyn DownloadObserver>> {
        self.observer.lock().as_ref().and_then(Weak::upgrade)
    }

    fn target_path(&self, name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let taken: HashSet<String> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        Ok(self.dir.join(unique_name(name, &taken)))
    }
}

/// Last path component only; callers may not write outside the directory
fn file_component(name: &str) -> Option<String> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.trim().is_empty())
        .map(str::to_string)
}

fn default_name(url: &str, mime: Option<&str>) -> String {
    let from_url = if url.starts_with("data:") {
        None
    } else {
        url::Url::parse(url).ok().and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
                .filter(|s| !s.is_empty())
        })
    };
    let name = from_url.unwrap_or_else(|| "download".to_string());
    if extension_of(&name).is_some() {
        return name;
    }
    let ext = mime.and_then(extension_for_mime).unwrap_or("");
    format!("{}{}", name, ext)
}

impl DownloadManager for FsDownloads {
    fn create(&self, request: DownloadRequest) -> Result<DownloadId> {
        let id = DownloadId::new(format!("fs-{}", self.next.fetch_add(1, Ordering::SeqCst) + 1));
        if request.save_as {
            log::debug!("Save-as prompts are not available, saving {} into {}", id, self.dir.display());
        }

        let file = if request.url.starts_with("data:") {
            decode_data_url(&request.url)?
        } else {
            self.fetcher.fetch(&request.url)?
        };

        let mut item = DownloadItem::new(id.as_str(), request.url.as_str());
        item.filename = request.filename.clone();
        item.mime = file.mime.clone();

        let observer = self.observer();
        if let Some(observer) = &observer {
            observer.on_created(&item);
        }

        let name = match (&request.filename, &observer) {
            (Some(name), _) => file_component(name),
            (None, Some(observer)) => match observer.on_determining_filename(&item) {
                FilenameDecision::Suggest(name) => file_component(&name),
                FilenameDecision::Default => None,
            },
            (None, None) => None,
        }
        .unwrap_or_else(|| default_name(&request.url, file.mime.as_deref()));

        let path = self.target_path(&name)?;
        std::fs::write(&path, &file.bytes)
            .map_err(|e| TakeoutError::Io(std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e))))?;
        log::info!("Saved {} ({} bytes)", path.display(), file.bytes.len());

        self.entries.lock().push((id.clone(), path));
        Ok(id)
    }

    fn cancel(&self, id: &DownloadId) -> Result<()> {
        // Downloads finish inside create; nothing is ever in flight
        log::debug!("Cancel requested for {}", id);
        Ok(())
    }

    fn erase(&self, id: &DownloadId) -> Result<()> {
        self.entries.lock().retain(|(entry, _)| entry != id);
        Ok(())
    }

    fn saved_name(&self, id: &DownloadId) -> Option<String> {
        self.path_of(id)
            .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
    }
}
