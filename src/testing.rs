//! In-memory doubles shared by the unit tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::broadcast;

use crate::error::FsError;
use crate::fs::path_utils::{parent_remote_path, resolve_link_target};
use crate::fs::sftp::{RawAttrs, RawKind, SftpPrimitives};
use crate::fs::{FileOperations, SftpFileOperations, UPLOAD_CHUNK_SIZE};
use crate::prompt::UsernamePrompt;
use crate::ssh::{AuthFailureLevel, Connector, PooledConnection, SshError};

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
    Symlink(String),
}

#[derive(Debug, Clone)]
struct Entry {
    node: Node,
    atime: u64,
    mtime: u64,
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<String, Entry>,
    log: Vec<String>,
    max_write_chunk: usize,
    failing_renames: Vec<String>,
}

/// A remote tree held in memory, rooted at `/`, with `/home/alice` as the
/// login directory.
#[derive(Clone)]
pub struct MemoryFs {
    state: Arc<Mutex<State>>,
}

fn normalize(path: &str) -> String {
    if path == "/" {
        return path.to_string();
    }
    path.trim_end_matches('/').to_string()
}

fn dir_entry() -> Entry {
    Entry {
        node: Node::Dir,
        atime: 0,
        mtime: 0,
    }
}

impl MemoryFs {
    pub fn new() -> Self {
        let mut state = State::default();
        state.nodes.insert("/".to_string(), dir_entry());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn insert(&self, path: &str, entry: Entry) {
        let path = normalize(path);
        let mut state = self.state.lock();
        let mut parent = parent_remote_path(&path);
        while parent != "/" && !state.nodes.contains_key(&parent) {
            state.nodes.insert(parent.clone(), dir_entry());
            parent = parent_remote_path(&parent);
        }
        state.nodes.insert(path, entry);
    }

    pub fn add_dir(&self, path: &str) {
        self.insert(path, dir_entry());
    }

    pub fn add_file(&self, path: &str, content: &[u8]) {
        self.add_file_with_times(path, content, 0, 0);
    }

    pub fn add_file_with_times(&self, path: &str, content: &[u8], atime: u64, mtime: u64) {
        self.insert(
            path,
            Entry {
                node: Node::File(content.to_vec()),
                atime,
                mtime,
            },
        );
    }

    pub fn add_symlink(&self, path: &str, target: &str) {
        self.insert(
            path,
            Entry {
                node: Node::Symlink(target.to_string()),
                atime: 0,
                mtime: 0,
            },
        );
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state.lock().nodes.contains_key(&normalize(path))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(
            self.state.lock().nodes.get(&normalize(path)).map(|e| &e.node),
            Some(Node::Dir)
        )
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        match self.state.lock().nodes.get(&normalize(path)).map(|e| &e.node) {
            Some(Node::File(content)) => Some(content.clone()),
            _ => None,
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    /// Make every later rename of `path` fail with a server `Failure`
    pub fn fail_renames_from(&self, path: &str) {
        self.state.lock().failing_renames.push(normalize(path));
    }

    /// Names directly under `dir`, sorted
    pub fn names_in(&self, dir: &str) -> Vec<String> {
        self.children(&normalize(dir))
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    pub fn max_write_chunk(&self) -> usize {
        self.state.lock().max_write_chunk
    }

    fn record(&self, op: &str, path: &str) {
        self.state.lock().log.push(format!("{} {}", op, path));
    }

    fn lookup(&self, path: &str) -> Result<Entry, FsError> {
        self.state
            .lock()
            .nodes
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| FsError::FileNotFound(path.to_string()))
    }

    fn follow(&self, path: &str) -> Result<(String, Entry), FsError> {
        let mut current = normalize(path);
        for _ in 0..40 {
            let entry = self.lookup(&current)?;
            match &entry.node {
                Node::Symlink(target) => current = normalize(&resolve_link_target(&current, target)),
                _ => return Ok((current, entry)),
            }
        }
        Err(FsError::Unknown(format!("{}: too many levels of symbolic links", path)))
    }

    fn children(&self, dir: &str) -> Vec<(String, Entry)> {
        let state = self.state.lock();
        state
            .nodes
            .iter()
            .filter(|(path, _)| path.as_str() != "/" && parent_remote_path(path) == dir)
            .map(|(path, entry)| {
                let name = path.rsplit('/').next().unwrap_or_default().to_string();
                (name, entry.clone())
            })
            .collect()
    }

    fn require_parent_dir(&self, path: &str) -> Result<(), FsError> {
        let parent = parent_remote_path(&normalize(path));
        match self.follow(&parent)?.1.node {
            Node::Dir => Ok(()),
            _ => Err(FsError::FileNotADirectory(parent)),
        }
    }

    fn store_file(&self, path: &str, content: Vec<u8>) -> Result<(), FsError> {
        self.require_parent_dir(path)?;
        if let Ok(Entry { node: Node::Dir, .. }) = self.lookup(path) {
            return Err(FsError::FileIsADirectory(path.to_string()));
        }
        self.state.lock().nodes.insert(
            normalize(path),
            Entry {
                node: Node::File(content),
                atime: 0,
                mtime: 0,
            },
        );
        Ok(())
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

fn attrs(entry: &Entry) -> RawAttrs {
    let (kind, size) = match &entry.node {
        Node::File(content) => (RawKind::File, content.len() as u64),
        Node::Dir => (RawKind::Directory, 4096),
        Node::Symlink(target) => (RawKind::Symlink, target.len() as u64),
    };
    RawAttrs {
        kind,
        size,
        atime: entry.atime,
        mtime: entry.mtime,
    }
}

#[async_trait]
impl SftpPrimitives for MemoryFs {
    async fn lstat(&self, path: &str) -> Result<RawAttrs, FsError> {
        self.record("lstat", path);
        Ok(attrs(&self.lookup(path)?))
    }

    async fn stat(&self, path: &str) -> Result<RawAttrs, FsError> {
        self.record("stat", path);
        Ok(attrs(&self.follow(path)?.1))
    }

    async fn read_link(&self, path: &str) -> Result<String, FsError> {
        self.record("read_link", path);
        match self.lookup(path)?.node {
            Node::Symlink(target) => Ok(target),
            _ => Err(FsError::Unknown(format!("{}: invalid argument", path))),
        }
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<(String, RawAttrs)>, FsError> {
        self.record("read_dir", path);
        let (dir, entry) = self.follow(path)?;
        if !matches!(entry.node, Node::Dir) {
            return Err(FsError::FileNotADirectory(path.to_string()));
        }

        let mut listing = vec![
            (".".to_string(), attrs(&dir_entry())),
            ("..".to_string(), attrs(&dir_entry())),
        ];
        listing.extend(
            self.children(&dir)
                .into_iter()
                .map(|(name, entry)| (name, attrs(&entry))),
        );
        Ok(listing)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, FsError> {
        self.record("read", path);
        match self.follow(path)?.1.node {
            Node::File(content) => Ok(content),
            _ => Err(FsError::FileIsADirectory(path.to_string())),
        }
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        self.record("write", path);
        self.store_file(path, content.to_vec())
    }

    async fn write_from(
        &self,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, FsError> {
        self.record("write_from", path);
        let mut content = Vec::new();
        let mut buffer = vec![0u8; UPLOAD_CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            {
                let mut state = self.state.lock();
                state.max_write_chunk = state.max_write_chunk.max(n);
            }
            content.extend_from_slice(&buffer[..n]);
        }
        let len = content.len() as u64;
        self.store_file(path, content)?;
        Ok(len)
    }

    async fn create_dir(&self, path: &str) -> Result<(), FsError> {
        self.record("create_dir", path);
        if self.exists(path) {
            return Err(FsError::Unknown("Failure".to_string()));
        }
        self.require_parent_dir(path)?;
        self.state.lock().nodes.insert(normalize(path), dir_entry());
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), FsError> {
        self.record("remove_file", path);
        if let Node::Dir = self.lookup(path)?.node {
            return Err(FsError::FileIsADirectory(path.to_string()));
        }
        self.state.lock().nodes.remove(&normalize(path));
        Ok(())
    }

    async fn remove_dir(&self, path: &str) -> Result<(), FsError> {
        self.record("remove_dir", path);
        if !matches!(self.lookup(path)?.node, Node::Dir) {
            return Err(FsError::FileNotADirectory(path.to_string()));
        }
        if !self.children(&normalize(path)).is_empty() {
            return Err(FsError::Unknown("Failure: directory not empty".to_string()));
        }
        self.state.lock().nodes.remove(&normalize(path));
        Ok(())
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> Result<(), FsError> {
        self.record("rename", old_path);
        let old = normalize(old_path);
        let new = normalize(new_path);
        self.lookup(&old)?;
        if self.exists(&new) || self.state.lock().failing_renames.contains(&old) {
            return Err(FsError::Unknown("Failure".to_string()));
        }
        self.require_parent_dir(&new)?;

        let mut state = self.state.lock();
        let prefix = format!("{}/", old);
        let moved: Vec<String> = state
            .nodes
            .keys()
            .filter(|k| **k == old || k.starts_with(&prefix))
            .cloned()
            .collect();
        for key in moved {
            if let Some(entry) = state.nodes.remove(&key) {
                let renamed = format!("{}{}", new, &key[old.len()..]);
                state.nodes.insert(renamed, entry);
            }
        }
        Ok(())
    }

    async fn canonicalize(&self, path: &str) -> Result<String, FsError> {
        self.record("canonicalize", path);
        if path == "." {
            return Ok("/home/alice".to_string());
        }
        Ok(self.follow(path)?.0)
    }
}

struct MockInner {
    id: u64,
    username: String,
    connected: AtomicBool,
    closed: AtomicBool,
    close_tx: broadcast::Sender<()>,
    operations: Arc<dyn FileOperations>,
}

/// Connection handed out by [`MockConnector`], backed by a fresh [`MemoryFs`]
#[derive(Clone)]
pub struct MockConnection {
    inner: Arc<MockInner>,
}

impl MockConnection {
    fn new(id: u64, username: &str) -> Self {
        let (close_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(MockInner {
                id,
                username: username.to_string(),
                connected: AtomicBool::new(true),
                closed: AtomicBool::new(false),
                close_tx,
                operations: Arc::new(SftpFileOperations::new(MemoryFs::new())),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn username(&self) -> &str {
        &self.inner.username
    }

    /// `close()` was called by the pool
    pub fn was_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn mark_disconnected(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
    }

    pub fn notify_closed(&self) {
        let _ = self.inner.close_tx.send(());
    }

    /// The remote end went away
    pub fn drop_transport(&self) {
        self.mark_disconnected();
        self.notify_closed();
    }
}

#[async_trait]
impl PooledConnection for MockConnection {
    fn subscribe_close(&self) -> broadcast::Receiver<()> {
        self.inner.close_tx.subscribe()
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn file_operations(&self) -> Arc<dyn FileOperations> {
        self.inner.operations.clone()
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.drop_transport();
    }
}

/// Counts dials; optionally slow, failing, or picky about usernames
pub struct MockConnector {
    dials: AtomicUsize,
    next_id: AtomicU64,
    delay: Duration,
    accepted: Option<Vec<String>>,
    failure: Option<SshError>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            dials: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            delay: Duration::ZERO,
            accepted: None,
            failure: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Reject every other username as an unknown user
    pub fn accepting(mut self, usernames: &[&str]) -> Self {
        self.accepted = Some(usernames.iter().map(|u| u.to_string()).collect());
        self
    }

    pub fn failing_with(mut self, err: SshError) -> Self {
        self.failure = Some(err);
        self
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self, host: &str, username: &str) -> Result<MockConnection, SshError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        if let Some(accepted) = &self.accepted {
            if !accepted.iter().any(|u| u == username) {
                return Err(SshError::AuthenticationFailed {
                    level: AuthFailureLevel::WrongUser,
                    username: username.to_string(),
                    host: host.to_string(),
                    message: format!("failed to look up local user {:?}", username),
                });
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection::new(id, username))
    }
}

/// Gives the same answer every time and records what it was asked
pub struct ScriptedPrompt {
    answer: Option<String>,
    prompts: AtomicUsize,
    failures: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn answering(answer: Option<&str>) -> Self {
        Self {
            answer: answer.map(str::to_string),
            prompts: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    /// `user@host` of every reported failure
    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().clone()
    }
}

#[async_trait]
impl UsernamePrompt for ScriptedPrompt {
    async fn prompt_for_username(&self, _host: &str) -> Option<String> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }

    async fn notify_auth_failure(&self, host: &str, username: &str, _level: AuthFailureLevel) {
        self.failures.lock().push(format!("{}@{}", username, host));
    }
}
