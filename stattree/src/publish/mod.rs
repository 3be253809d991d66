/*
 * Created on Sat Apr 06 2024
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

//! # Publishing
//!
//! The tree is mirrored into a host filesystem through the narrow
//! [`PublishHost`] seam: one directory per source, one file per value, one
//! `.schema` file per source. The host hands back opaque node handles and
//! calls back into the cookies it was given when a file is opened, read or
//! written. The mount root is created by the host at startup; sources become
//! publishable only once a [`StatsMount`] wraps that root (two-phase
//! initialisation, no ambient globals).

mod memfs;
mod schema;

pub use memfs::{Fd, MemFs};

use {
    crate::{
        error::{StatError, StatResult},
        metrics::MetricCookie,
        stats::{Source, SourceInner, ValueDesc},
    },
    std::sync::{Arc, Weak},
};

/// Opaque host-side handle for a directory or file
pub type NodeId = u64;

pub const SCHEMA_FILE_NAME: &str = ".schema";
pub const SCHEMA_FILE_MODE: u16 = 0o444;
pub const METRIC_FILE_MODE: u16 = 0o444;

/// What the core requires from the host filesystem. Implementations must
/// tolerate [`PublishHost::remove_recursive`] on a node that is already
/// gone (teardown paths can race an ancestor's removal).
pub trait PublishHost: Send + Sync {
    /// The mount root, created by the host at startup
    fn mount_root(&self) -> NodeId;
    fn create_dir(&self, name: &str, parent: NodeId) -> StatResult<NodeId>;
    fn create_value_file(
        &self,
        name: &str,
        mode: u16,
        parent: NodeId,
        cookie: ValueCookie,
    ) -> StatResult<NodeId>;
    fn create_schema_file(&self, parent: NodeId, cookie: SchemaCookie) -> StatResult<NodeId>;
    fn create_metric_file(
        &self,
        name: &str,
        parent: NodeId,
        cookie: MetricCookie,
    ) -> StatResult<NodeId>;
    fn remove_recursive(&self, node: NodeId);
}

/// A source's published directory; dropping the source takes it down
pub(crate) struct PublishedDir {
    pub(crate) host: Arc<dyn PublishHost>,
    pub(crate) dir: NodeId,
}

/*
    cookies
    ---
    the inode payload: everything the host needs to route an open/read/write
    back to (source, descriptor). Cookies hold weak references; an open
    upgrades (the try-get that fails once the refcount is zero) and keeps
    the strong reference for the lifetime of the open.
*/

#[derive(Clone)]
pub struct ValueCookie {
    source: Weak<Source>,
    desc: &'static ValueDesc,
}

impl ValueCookie {
    pub(crate) fn new(source: &Arc<Source>, desc: &'static ValueDesc) -> Self {
        Self {
            source: Arc::downgrade(source),
            desc,
        }
    }
    /// Take a strong reference for an open file descriptor
    pub fn open(&self) -> StatResult<Arc<Source>> {
        self.source.upgrade().ok_or(StatError::NotFound)
    }
    /// Resolve and render the value: decimal ASCII, newline terminated,
    /// signed iff the descriptor's type is signed
    pub fn read(&self) -> StatResult<Vec<u8>> {
        let src = self.open()?;
        let raw = src.value_of(self.desc)?;
        let mut out = if self.desc.ty().is_signed() {
            (raw as i64).to_string()
        } else {
            raw.to_string()
        };
        out.push('\n');
        Ok(out.into_bytes())
    }
    /// The only legal payload is the integer zero, which clears the value;
    /// everything else is [`StatError::InvalidArgument`]. The write bit on
    /// the file mode is the host's check, not ours.
    pub fn write(&self, payload: &[u8]) -> StatResult<()> {
        if payload.trim_ascii() != b"0" {
            return Err(StatError::InvalidArgument);
        }
        let src = self.open()?;
        src.clear(self.desc)
    }
}

#[derive(Clone)]
pub struct SchemaCookie {
    source: Weak<Source>,
}

impl SchemaCookie {
    pub(crate) fn new(source: &Arc<Source>) -> Self {
        Self {
            source: Arc::downgrade(source),
        }
    }
    /// Render the per-open snapshot buffer; it lives until the open closes
    pub fn snapshot(&self) -> StatResult<Vec<u8>> {
        let src = self.source.upgrade().ok_or(StatError::NotFound)?;
        Ok(schema::render(&src))
    }
}

/*
    mount
*/

/// Handle to a mounted stats surface. Construct the host first (it creates
/// the mount root), then register sources.
pub struct StatsMount {
    host: Arc<dyn PublishHost>,
    root: NodeId,
}

impl StatsMount {
    pub fn open(host: Arc<dyn PublishHost>) -> Self {
        let root = host.mount_root();
        Self { host, root }
    }
    /// Publish `source` and its whole subtree under the mount root.
    /// Partially created files unwind on error.
    pub fn register(&self, source: &Arc<Source>) -> StatResult<()> {
        publish_tree(source, &self.host, self.root)?;
        log::debug!("published source `{}`", source.name());
        Ok(())
    }
    /// Remove `source`'s subtree from the surface. The source itself stays
    /// alive and can be registered again.
    pub fn unregister(&self, source: &Arc<Source>) -> StatResult<()> {
        if source.inner.read().published.is_none() {
            return Err(StatError::NotFound);
        }
        unpublish_tree(source);
        log::debug!("unpublished source `{}`", source.name());
        Ok(())
    }
}

/*
    tree publication
*/

pub(crate) fn publish_tree(
    src: &Arc<Source>,
    host: &Arc<dyn PublishHost>,
    parent_dir: NodeId,
) -> StatResult<()> {
    let mut inner = src.inner.write();
    if inner.published.is_some() {
        return Err(StatError::AlreadyExists);
    }
    let dir = host.create_dir(&src.name, parent_dir)?;
    if let Err(e) = publish_node_files(src, &mut *inner, host, dir) {
        for b in inner.bindings.iter_mut() {
            b.files_created = false;
        }
        host.remove_recursive(dir);
        return Err(e);
    }
    inner.published = Some(PublishedDir {
        host: Arc::clone(host),
        dir,
    });
    for idx in 0..inner.subordinates.len() {
        let child = Arc::clone(&inner.subordinates[idx]);
        if let Err(e) = publish_tree(&child, host, dir) {
            inner.published = None;
            for b in inner.bindings.iter_mut() {
                b.files_created = false;
            }
            for prev in 0..idx {
                let prev = Arc::clone(&inner.subordinates[prev]);
                clear_published(&prev);
            }
            host.remove_recursive(dir);
            return Err(e);
        }
    }
    Ok(())
}

fn publish_node_files(
    src: &Arc<Source>,
    inner: &mut SourceInner,
    host: &Arc<dyn PublishHost>,
    dir: NodeId,
) -> StatResult<()> {
    host.create_schema_file(dir, SchemaCookie::new(src))?;
    for b in inner.bindings.iter_mut() {
        if b.files_created {
            continue;
        }
        for d in b.values {
            host.create_value_file(d.name(), d.file_mode(), dir, ValueCookie::new(src, d))?;
        }
        b.files_created = true;
    }
    Ok(())
}

/// Create files for bindings added after the source was published. Called
/// with the source's write lock held; the caller backs the binding out if
/// this fails.
pub(crate) fn publish_pending_bindings(
    src: &Arc<Source>,
    inner: &mut SourceInner,
) -> StatResult<()> {
    let (host, dir) = match inner.published {
        Some(ref p) => (Arc::clone(&p.host), p.dir),
        None => return Ok(()),
    };
    for i in 0..inner.bindings.len() {
        if inner.bindings[i].files_created {
            continue;
        }
        let mut created = Vec::new();
        let mut failed = None;
        for d in inner.bindings[i].values {
            match host.create_value_file(d.name(), d.file_mode(), dir, ValueCookie::new(src, d)) {
                Ok(id) => created.push(id),
                Err(e) => {
                    failed = Some(e);
                    break;
                }
            }
        }
        match failed {
            None => inner.bindings[i].files_created = true,
            Some(e) => {
                for id in created {
                    host.remove_recursive(id);
                }
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Tear the subtree's published state down: one host removal at the top,
/// handle and idempotency flags cleared everywhere below
pub(crate) fn unpublish_tree(src: &Source) {
    let mut inner = src.inner.write();
    let published = inner.published.take();
    for b in inner.bindings.iter_mut() {
        b.files_created = false;
    }
    for idx in 0..inner.subordinates.len() {
        let child = Arc::clone(&inner.subordinates[idx]);
        clear_published(&child);
    }
    drop(inner);
    if let Some(p) = published {
        p.host.remove_recursive(p.dir);
    }
}

fn clear_published(src: &Source) {
    let mut inner = src.inner.write();
    inner.published = None;
    for b in inner.bindings.iter_mut() {
        b.files_created = false;
    }
    for idx in 0..inner.subordinates.len() {
        let child = Arc::clone(&inner.subordinates[idx]);
        clear_published(&child);
    }
}
