/*
 * Created on Sun Apr 14 2024
 *
 * This file is a part of Stattree
 * Stattree is a free and open-source in-process telemetry registry written by
 * Sayan Nandan ("the Author") with the vision to expose live statistics
 * sources and metric tables through a simple virtual filesystem surface.
 *
 * Copyright (c) 2024, Sayan Nandan <nandansayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

/*
    in-memory host
    ---
    the reference PublishHost: a node table addressed by id, directories as
    name -> id maps, and a descriptor table whose open files carry the
    per-open snapshot (or, for value files, resolve fresh on every read).
    cookie callbacks never run under the filesystem lock; an open resolves
    the node first, releases the lock, builds the snapshot, and only then
    installs the descriptor.
*/

use {
    super::{NodeId, PublishHost, SchemaCookie, ValueCookie, SCHEMA_FILE_NAME},
    crate::{
        config::MountOptions,
        error::{StatError, StatResult},
        metrics::{Metric, MetricCookie},
        stats::Source,
    },
    parking_lot::RwLock,
    std::{collections::HashMap, sync::Arc},
};

pub type Fd = u64;

const ROOT: NodeId = 0;
const WRITE_BITS: u16 = 0o222;

pub struct MemFs {
    inner: RwLock<MemFsInner>,
}

struct MemFsInner {
    nodes: HashMap<NodeId, MemNode>,
    fds: HashMap<Fd, OpenFile>,
    next_node: NodeId,
    next_fd: Fd,
}

struct MemNode {
    parent: Option<NodeId>,
    uid: u32,
    gid: u32,
    mode: u16,
    kind: NodeKind,
}

enum NodeKind {
    Dir { children: HashMap<Box<str>, NodeId> },
    Value(ValueCookie),
    Schema(SchemaCookie),
    Metric(MetricCookie),
}

enum OpenFile {
    /// resolves fresh on every read so revocation and tree changes are
    /// visible immediately; the strong reference pins the source for the
    /// open's lifetime
    Value {
        cookie: ValueCookie,
        writable: bool,
        pos: usize,
        _hold: Arc<Source>,
    },
    /// schema snapshot, frozen at open
    Snapshot { buf: Vec<u8>, pos: usize },
    /// metric snapshot, frozen at open; pins the metric
    Metric {
        buf: Vec<u8>,
        pos: usize,
        _hold: Arc<Metric>,
    },
}

impl MemFs {
    pub fn new() -> Self {
        Self::with_options(MountOptions::new())
    }
    pub fn with_options(options: MountOptions) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT,
            MemNode {
                parent: None,
                uid: options.uid,
                gid: options.gid,
                mode: options.mode,
                kind: NodeKind::Dir {
                    children: HashMap::new(),
                },
            },
        );
        Self {
            inner: RwLock::new(MemFsInner {
                nodes,
                fds: HashMap::new(),
                next_node: ROOT + 1,
                next_fd: 0,
            }),
        }
    }
    /// Mount with options parsed from a `uid=,gid=,mode=` string
    pub fn mount(options: &str) -> StatResult<Self> {
        Ok(Self::with_options(MountOptions::parse(options)?))
    }
}

/*
    path surface
*/

impl MemFs {
    fn resolve(inner: &MemFsInner, path: &str) -> StatResult<NodeId> {
        let mut at = ROOT;
        for comp in path.split('/').filter(|c| !c.is_empty()) {
            let node = inner.nodes.get(&at).ok_or(StatError::NotFound)?;
            match node.kind {
                NodeKind::Dir { ref children } => {
                    at = *children.get(comp).ok_or(StatError::NotFound)?;
                }
                _ => return Err(StatError::NotFound),
            }
        }
        Ok(at)
    }
    pub fn exists(&self, path: &str) -> bool {
        let inner = self.inner.read();
        Self::resolve(&inner, path).is_ok()
    }
    pub fn mode_of(&self, path: &str) -> StatResult<u16> {
        let inner = self.inner.read();
        let id = Self::resolve(&inner, path)?;
        match inner.nodes.get(&id) {
            Some(node) => Ok(node.mode),
            None => Err(StatError::NotFound),
        }
    }
    pub fn owner_of(&self, path: &str) -> StatResult<(u32, u32)> {
        let inner = self.inner.read();
        let id = Self::resolve(&inner, path)?;
        match inner.nodes.get(&id) {
            Some(node) => Ok((node.uid, node.gid)),
            None => Err(StatError::NotFound),
        }
    }
    /// Sorted listing of a directory
    pub fn readdir(&self, path: &str) -> StatResult<Vec<String>> {
        let inner = self.inner.read();
        let id = Self::resolve(&inner, path)?;
        match inner.nodes.get(&id) {
            Some(MemNode {
                kind: NodeKind::Dir { children },
                ..
            }) => {
                let mut names: Vec<String> = children.keys().map(|k| k.to_string()).collect();
                names.sort();
                Ok(names)
            }
            _ => Err(StatError::NotFound),
        }
    }
    pub fn open(&self, path: &str) -> StatResult<Fd> {
        self.open_with(path, false)
    }
    pub fn open_rw(&self, path: &str) -> StatResult<Fd> {
        self.open_with(path, true)
    }
    fn open_with(&self, path: &str, write: bool) -> StatResult<Fd> {
        enum FileRef {
            Value(ValueCookie),
            Schema(SchemaCookie),
            Metric(MetricCookie),
        }
        // resolve under the lock, snapshot outside it: producer callbacks
        // and schema rendering take source locks of their own
        let (file, mode) = {
            let inner = self.inner.read();
            let id = Self::resolve(&inner, path)?;
            let node = inner.nodes.get(&id).ok_or(StatError::NotFound)?;
            match node.kind {
                NodeKind::Dir { .. } => return Err(StatError::InvalidArgument),
                NodeKind::Value(ref c) => (FileRef::Value(c.clone()), node.mode),
                NodeKind::Schema(ref c) => (FileRef::Schema(c.clone()), node.mode),
                NodeKind::Metric(ref c) => (FileRef::Metric(c.clone()), node.mode),
            }
        };
        if write && mode & WRITE_BITS == 0 {
            return Err(StatError::InvalidArgument);
        }
        let open = match file {
            FileRef::Value(cookie) => {
                let hold = cookie.open()?;
                OpenFile::Value {
                    cookie,
                    writable: write,
                    pos: 0,
                    _hold: hold,
                }
            }
            FileRef::Schema(cookie) => OpenFile::Snapshot {
                buf: cookie.snapshot()?,
                pos: 0,
            },
            FileRef::Metric(cookie) => {
                let (buf, hold) = cookie.open()?;
                OpenFile::Metric {
                    buf,
                    pos: 0,
                    _hold: hold,
                }
            }
        };
        let mut inner = self.inner.write();
        let fd = inner.next_fd;
        inner.next_fd += 1;
        inner.fds.insert(fd, open);
        Ok(fd)
    }
    /// Read up to `max` bytes from the descriptor's cursor
    pub fn read(&self, fd: Fd, max: usize) -> StatResult<Vec<u8>> {
        // snapshot-backed descriptors are served under the lock; value
        // files re-render outside it first
        let (cookie, pos) = {
            let mut inner = self.inner.write();
            match inner.fds.get_mut(&fd) {
                Some(OpenFile::Snapshot { buf, pos })
                | Some(OpenFile::Metric { buf, pos, .. }) => {
                    let chunk = slice_at(buf, *pos, max);
                    *pos += chunk.len();
                    return Ok(chunk);
                }
                Some(OpenFile::Value { cookie, pos, .. }) => (cookie.clone(), *pos),
                None => return Err(StatError::NotFound),
            }
        };
        let rendered = cookie.read()?;
        let chunk = slice_at(&rendered, pos, max);
        let mut inner = self.inner.write();
        if let Some(OpenFile::Value { pos, .. }) = inner.fds.get_mut(&fd) {
            *pos += chunk.len();
        }
        Ok(chunk)
    }
    /// Convenience: read the whole file from the current cursor
    pub fn read_to_end(&self, fd: Fd) -> StatResult<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let chunk = self.read(fd, 4096)?;
            if chunk.is_empty() {
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
        }
    }
    pub fn write(&self, fd: Fd, payload: &[u8]) -> StatResult<usize> {
        let cookie = {
            let inner = self.inner.read();
            match inner.fds.get(&fd) {
                Some(OpenFile::Value {
                    cookie, writable, ..
                }) => {
                    if !*writable {
                        return Err(StatError::InvalidArgument);
                    }
                    cookie.clone()
                }
                Some(_) => return Err(StatError::InvalidArgument),
                None => return Err(StatError::NotFound),
            }
        };
        cookie.write(payload)?;
        Ok(payload.len())
    }
    /// Release the descriptor: snapshot buffers and pinned references die
    /// here
    pub fn close(&self, fd: Fd) {
        // dropping the open outside the lock: releasing the last pin on a
        // source runs its teardown, which calls back into remove_recursive
        let removed = {
            let mut inner = self.inner.write();
            inner.fds.remove(&fd)
        };
        drop(removed);
    }
}

fn slice_at(buf: &[u8], pos: usize, max: usize) -> Vec<u8> {
    if pos >= buf.len() {
        return Vec::new();
    }
    let end = usize::min(pos + max, buf.len());
    buf[pos..end].to_vec()
}

/*
    host seam
*/

impl MemFsInner {
    fn insert_node(&mut self, parent: NodeId, node_name: &str, kind: NodeKind, mode: u16) -> StatResult<NodeId> {
        let (uid, gid) = match self.nodes.get(&ROOT) {
            Some(root) => (root.uid, root.gid),
            None => (0, 0),
        };
        let id = self.next_node;
        let parent_node = self.nodes.get_mut(&parent).ok_or(StatError::NotFound)?;
        match parent_node.kind {
            NodeKind::Dir { ref mut children } => {
                if children.contains_key(node_name) {
                    return Err(StatError::AlreadyExists);
                }
                children.insert(Box::from(node_name), id);
            }
            _ => return Err(StatError::InvalidArgument),
        }
        self.next_node += 1;
        self.nodes.insert(
            id,
            MemNode {
                parent: Some(parent),
                uid,
                gid,
                mode,
                kind,
            },
        );
        Ok(id)
    }
}

impl PublishHost for MemFs {
    fn mount_root(&self) -> NodeId {
        ROOT
    }
    fn create_dir(&self, name: &str, parent: NodeId) -> StatResult<NodeId> {
        self.inner.write().insert_node(
            parent,
            name,
            NodeKind::Dir {
                children: HashMap::new(),
            },
            0o755,
        )
    }
    fn create_value_file(
        &self,
        name: &str,
        mode: u16,
        parent: NodeId,
        cookie: ValueCookie,
    ) -> StatResult<NodeId> {
        self.inner
            .write()
            .insert_node(parent, name, NodeKind::Value(cookie), mode)
    }
    fn create_schema_file(&self, parent: NodeId, cookie: SchemaCookie) -> StatResult<NodeId> {
        self.inner.write().insert_node(
            parent,
            SCHEMA_FILE_NAME,
            NodeKind::Schema(cookie),
            super::SCHEMA_FILE_MODE,
        )
    }
    fn create_metric_file(
        &self,
        name: &str,
        parent: NodeId,
        cookie: MetricCookie,
    ) -> StatResult<NodeId> {
        self.inner
            .write()
            .insert_node(parent, name, NodeKind::Metric(cookie), super::METRIC_FILE_MODE)
    }
    fn remove_recursive(&self, node: NodeId) {
        let mut inner = self.inner.write();
        // tolerate a node an ancestor's removal already took out
        let parent = match inner.nodes.get(&node) {
            Some(n) => n.parent,
            None => return,
        };
        if let Some(parent) = parent {
            if let Some(MemNode {
                kind: NodeKind::Dir { children },
                ..
            }) = inner.nodes.get_mut(&parent)
            {
                children.retain(|_, id| *id != node);
            }
        }
        let mut stack = vec![node];
        while let Some(at) = stack.pop() {
            if let Some(removed) = inner.nodes.remove(&at) {
                if let NodeKind::Dir { children } = removed.kind {
                    stack.extend(children.into_values());
                }
            }
        }
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}
