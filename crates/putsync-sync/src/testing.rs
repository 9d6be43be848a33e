//! In-memory fakes of the port traits for job and engine tests

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::io::AsyncReadExt;
use tokio::sync::broadcast;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use putsync_core::domain::{PersistedState, RelPath, TEMP_DIR_NAME};
use putsync_core::ports::{
    ByteReader, IChangeNotifier, IRemoteFileService, IStateStore, RemoteChange, RemoteFile,
    UploadResult,
};
use putsync_remote::RemoteError;

use crate::dircache::DirCache;
use crate::jobs::JobContext;

pub fn rp(s: &str) -> RelPath {
    RelPath::new(s).unwrap()
}

// ============================================================================
// MemoryStateStore
// ============================================================================

#[derive(Default)]
pub struct MemoryStateStore {
    states: Mutex<BTreeMap<String, PersistedState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, PersistedState> {
        self.states.lock().unwrap().clone()
    }

    pub fn state(&self, path: &str) -> Option<PersistedState> {
        self.states.lock().unwrap().get(path).cloned()
    }

    pub fn insert(&self, path: &str, state: PersistedState) {
        self.states.lock().unwrap().insert(path.to_string(), state);
    }
}

#[async_trait::async_trait]
impl IStateStore for MemoryStateStore {
    async fn get_all(&self) -> Result<Vec<(RelPath, PersistedState)>> {
        Ok(self
            .states
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (rp(k), v.clone()))
            .collect())
    }

    async fn get(&self, path: &RelPath) -> Result<Option<PersistedState>> {
        Ok(self.state(path.as_str()))
    }

    async fn put(&self, path: &RelPath, state: &PersistedState) -> Result<()> {
        self.insert(path.as_str(), state.clone());
        Ok(())
    }

    async fn delete(&self, path: &RelPath) -> Result<()> {
        self.states.lock().unwrap().remove(path.as_str());
        Ok(())
    }

    async fn rename_key(&self, from: &RelPath, to: &RelPath) -> Result<()> {
        let mut states = self.states.lock().unwrap();
        let state = states
            .remove(from.as_str())
            .ok_or_else(|| anyhow!("no state for {}", from))?;
        states.insert(to.as_str().to_string(), state);
        Ok(())
    }
}

// ============================================================================
// MemoryRemote
// ============================================================================

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub meta: RemoteFile,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub name: String,
    pub parent_id: i64,
    pub size: u64,
    pub received: Vec<u8>,
}

#[derive(Default)]
struct RemoteInner {
    files: HashMap<i64, StoredFile>,
    sessions: HashMap<String, Session>,
    next_id: i64,
    read_offsets: Vec<(i64, u64)>,
    append_offsets: Vec<(String, u64)>,
    terminated: Vec<String>,
    unauthorized: bool,
    stall_reads: bool,
    stall_appends: bool,
    reported_offsets: HashMap<String, u64>,
}

/// Remote tree held in memory; folder 0 is the account root
pub struct MemoryRemote {
    inner: Mutex<RemoteInner>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self {
            inner: Mutex::new(RemoteInner {
                next_id: 100,
                ..Default::default()
            }),
        }
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_folder(&self, parent_id: i64, name: &str) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.files.insert(
            id,
            StoredFile {
                meta: RemoteFile {
                    id,
                    parent_id,
                    name: name.to_string(),
                    size: 0,
                    crc32: String::new(),
                    is_dir: true,
                },
                content: Vec::new(),
            },
        );
        id
    }

    pub fn add_file(&self, parent_id: i64, name: &str, content: &[u8]) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.files.insert(
            id,
            StoredFile {
                meta: RemoteFile {
                    id,
                    parent_id,
                    name: name.to_string(),
                    size: content.len() as u64,
                    crc32: fake_crc(content),
                    is_dir: false,
                },
                content: content.to_vec(),
            },
        );
        id
    }

    pub fn file(&self, id: i64) -> Option<StoredFile> {
        self.inner.lock().unwrap().files.get(&id).cloned()
    }

    pub fn find(&self, parent_id: i64, name: &str) -> Option<StoredFile> {
        self.inner
            .lock()
            .unwrap()
            .files
            .values()
            .find(|f| f.meta.parent_id == parent_id && f.meta.name == name)
            .cloned()
    }

    pub fn file_count(&self) -> usize {
        self.inner.lock().unwrap().files.len()
    }

    pub fn add_session(&self, url: &str, session: Session) {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .insert(url.to_string(), session);
    }

    pub fn session(&self, url: &str) -> Option<Session> {
        self.inner.lock().unwrap().sessions.get(url).cloned()
    }

    pub fn read_offsets(&self) -> Vec<(i64, u64)> {
        self.inner.lock().unwrap().read_offsets.clone()
    }

    pub fn append_offsets(&self) -> Vec<(String, u64)> {
        self.inner.lock().unwrap().append_offsets.clone()
    }

    pub fn terminated(&self) -> Vec<String> {
        self.inner.lock().unwrap().terminated.clone()
    }

    /// Makes every call fail as if the token had been revoked
    pub fn revoke_token(&self) {
        self.inner.lock().unwrap().unauthorized = true;
    }

    /// Makes reads deliver the first half of the file, then hang
    pub fn stall_reads(&self) {
        self.inner.lock().unwrap().stall_reads = true;
    }

    pub fn resume_reads(&self) {
        self.inner.lock().unwrap().stall_reads = false;
    }

    /// Makes appends take a few bytes of the body, then hang
    pub fn stall_appends(&self) {
        self.inner.lock().unwrap().stall_appends = true;
    }

    /// Makes the service claim to hold `offset` bytes of a session
    pub fn set_upload_offset(&self, url: &str, offset: u64) {
        self.inner
            .lock()
            .unwrap()
            .reported_offsets
            .insert(url.to_string(), offset);
    }

    fn check_auth(&self) -> Result<()> {
        if self.inner.lock().unwrap().unauthorized {
            return Err(RemoteError::Unauthorized("fake".to_string()).into());
        }
        Ok(())
    }
}

/// Deterministic stand-in for a content checksum
pub fn fake_crc(content: &[u8]) -> String {
    let sum = content
        .iter()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(*b)));
    format!("{:08x}", sum)
}

/// Reader that yields some bytes and then never completes
struct StallingReader {
    head: Cursor<Vec<u8>>,
}

impl tokio::io::AsyncRead for StallingReader {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let pos = self.head.position() as usize;
        if pos < self.head.get_ref().len() {
            return std::pin::Pin::new(&mut self.head).poll_read(cx, buf);
        }
        std::task::Poll::Pending
    }
}

#[async_trait::async_trait]
impl IRemoteFileService for MemoryRemote {
    async fn list(&self, folder_id: i64) -> Result<Vec<RemoteFile>> {
        self.check_auth()?;
        let inner = self.inner.lock().unwrap();
        let mut children: Vec<RemoteFile> = inner
            .files
            .values()
            .filter(|f| f.meta.parent_id == folder_id)
            .map(|f| f.meta.clone())
            .collect();
        children.sort_by_key(|f| std::cmp::Reverse(f.id));
        Ok(children)
    }

    async fn get(&self, file_id: i64) -> Result<RemoteFile> {
        self.check_auth()?;
        self.file(file_id)
            .map(|f| f.meta)
            .ok_or_else(|| RemoteError::NotFound(format!("file {}", file_id)).into())
    }

    async fn create_folder(&self, name: &str, parent_id: i64) -> Result<RemoteFile> {
        self.check_auth()?;
        let id = self.add_folder(parent_id, name);
        Ok(self.file(id).map(|f| f.meta).unwrap())
    }

    async fn delete(&self, file_ids: &[i64]) -> Result<()> {
        self.check_auth()?;
        let mut inner = self.inner.lock().unwrap();
        for id in file_ids {
            inner.files.remove(id);
        }
        Ok(())
    }

    async fn move_file(&self, file_id: i64, parent_id: i64, new_name: &str) -> Result<()> {
        self.check_auth()?;
        let mut inner = self.inner.lock().unwrap();
        let file = inner
            .files
            .get_mut(&file_id)
            .ok_or_else(|| RemoteError::NotFound(format!("file {}", file_id)))?;
        file.meta.parent_id = parent_id;
        file.meta.name = new_name.to_string();
        Ok(())
    }

    async fn open_read(&self, file_id: i64, offset: u64) -> Result<ByteReader> {
        self.check_auth()?;
        let mut inner = self.inner.lock().unwrap();
        inner.read_offsets.push((file_id, offset));
        let file = inner
            .files
            .get(&file_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("file {}", file_id)))?;
        let rest = file.content[offset as usize..].to_vec();
        if inner.stall_reads {
            let half = rest[..rest.len() / 2].to_vec();
            return Ok(Box::new(StallingReader {
                head: Cursor::new(half),
            }));
        }
        Ok(Box::new(Cursor::new(rest)))
    }

    async fn create_upload(&self, name: &str, parent_id: i64, size: u64) -> Result<String> {
        self.check_auth()?;
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let url = format!("https://upload.test/files/{}", inner.next_id);
        inner.sessions.insert(
            url.clone(),
            Session {
                name: name.to_string(),
                parent_id,
                size,
                received: Vec::new(),
            },
        );
        Ok(url)
    }

    async fn append_upload(
        &self,
        session_url: &str,
        offset: u64,
        mut body: ByteReader,
    ) -> Result<UploadResult> {
        self.check_auth()?;
        let stall = {
            let mut inner = self.inner.lock().unwrap();
            inner.append_offsets.push((session_url.to_string(), offset));
            inner.stall_appends
        };
        if stall {
            let mut head = [0u8; 16];
            body.read(&mut head).await?;
            std::future::pending::<()>().await;
        }
        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;

        let session = {
            let mut inner = self.inner.lock().unwrap();
            let session = inner
                .sessions
                .get_mut(session_url)
                .ok_or_else(|| RemoteError::NotFound(session_url.to_string()))?;
            session.received.truncate(offset as usize);
            session.received.extend_from_slice(&data);
            session.clone()
        };

        if session.received.len() as u64 != session.size {
            return Err(anyhow!("incomplete upload"));
        }
        let file_id = self.add_file(session.parent_id, &session.name, &session.received);
        self.inner.lock().unwrap().sessions.remove(session_url);
        Ok(UploadResult {
            file_id,
            crc32: fake_crc(&session.received),
        })
    }

    async fn upload_offset(&self, session_url: &str) -> Result<u64> {
        self.check_auth()?;
        let reported = self.inner.lock().unwrap().reported_offsets.get(session_url).copied();
        if let Some(offset) = reported {
            return Ok(offset);
        }
        self.session(session_url)
            .map(|s| s.received.len() as u64)
            .ok_or_else(|| RemoteError::NotFound(session_url.to_string()).into())
    }

    async fn terminate_upload(&self, session_url: &str) -> Result<()> {
        self.check_auth()?;
        let mut inner = self.inner.lock().unwrap();
        inner.terminated.push(session_url.to_string());
        inner.sessions.remove(session_url);
        Ok(())
    }
}

// ============================================================================
// ManualNotifier
// ============================================================================

pub struct ManualNotifier {
    tx: broadcast::Sender<RemoteChange>,
}

impl ManualNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    pub fn emit(&self, file_id: Option<i64>) {
        let _ = self.tx.send(RemoteChange {
            file_id,
            name: None,
        });
    }
}

impl IChangeNotifier for ManualNotifier {
    fn is_connected(&self) -> bool {
        true
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteChange> {
        self.tx.subscribe()
    }
}

pub const SHORT_STALL: Duration = Duration::from_millis(200);

// ============================================================================
// Fixture
// ============================================================================

/// A temp local root, an in-memory remote with a root folder and a store
pub struct Fixture {
    _dir: TempDir,
    pub root: PathBuf,
    pub remote: Arc<MemoryRemote>,
    pub store: Arc<MemoryStateStore>,
    pub notifier: Arc<ManualNotifier>,
    pub root_id: i64,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("sync");
        std::fs::create_dir_all(root.join(TEMP_DIR_NAME)).unwrap();
        let remote = Arc::new(MemoryRemote::new());
        let root_id = remote.add_folder(0, "putio-sync");
        Self {
            _dir: dir,
            root,
            remote,
            store: Arc::new(MemoryStateStore::new()),
            notifier: Arc::new(ManualNotifier::new()),
            root_id,
        }
    }

    pub fn context(&self) -> JobContext {
        JobContext {
            local_root: self.root.clone(),
            remote: self.remote.clone(),
            store: self.store.clone(),
            notifier: Some(self.notifier.clone()),
            dircache: tokio::sync::Mutex::new(DirCache::new(self.root_id)),
            stall_timeout: SHORT_STALL,
            cancel: CancellationToken::new(),
        }
    }

    pub fn temp_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.root.join(TEMP_DIR_NAME))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }
}
