/*
 * Created on Sat Mar 16 2024
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

//! # Sources
//!
//! A source is the addressable unit of publication: a named tree node
//! carrying value bindings, labels and subordinate sources. One rwlock per
//! node guards the mutable interior; readers aggregate, writers mutate the
//! tree shape. Lock order is strictly parent before child along the link
//! direction, which is why the subordinate graph must stay a tree (producer
//! contract, not checked at runtime).
//!
//! Reference counting rides on [`Arc`]: the creator, every linking parent
//! and every open file descriptor each hold one strong reference. The
//! try-get that must fail once the count is zero is
//! [`std::sync::Weak::upgrade`], so no open can race a destructor and no
//! reader ever observes a node mid teardown.

use {
    super::desc::ValueDesc,
    crate::{
        error::{StatError, StatResult},
        publish::{self, PublishedDir},
    },
    core::ptr,
    parking_lot::RwLock,
    std::sync::Arc,
};

/// Attachment of a value array to a source at a base address. A null base
/// marks a pure aggregate binding (no storage of its own) or a revoked one.
pub(crate) struct ValueBinding {
    pub(crate) values: &'static [ValueDesc],
    pub(crate) base: *mut u8,
    pub(crate) files_created: bool,
}

impl ValueBinding {
    pub(crate) fn matches_array(&self, values: &'static [ValueDesc]) -> bool {
        ptr::eq(self.values.as_ptr(), values.as_ptr())
    }
    /// true if `desc` is an element of this binding's array
    pub(crate) fn owns(&self, desc: &ValueDesc) -> bool {
        self.values.iter().any(|d| ptr::eq(d, desc))
    }
    pub(crate) fn is_live(&self) -> bool {
        !self.base.is_null()
    }
}

// Safety: `base` is only ever dereferenced through volatile primitive
// accesses while the binding is live, and the producer contract (revoke
// before the backing object is freed) keeps it valid for exactly that span
unsafe impl Send for ValueBinding {}
unsafe impl Sync for ValueBinding {}

pub(crate) struct SourceInner {
    pub(crate) labels: Vec<(Box<str>, Box<str>)>,
    pub(crate) bindings: Vec<ValueBinding>,
    pub(crate) subordinates: Vec<Arc<Source>>,
    pub(crate) published: Option<PublishedDir>,
}

/// A named node in the stats tree
pub struct Source {
    pub(crate) name: Box<str>,
    pub(crate) label_key: Box<str>,
    pub(crate) inner: RwLock<SourceInner>,
}

impl Source {
    /// Create a detached source. Label 0 is always `(label_key, name)`.
    pub fn new(name: impl Into<Box<str>>, label_key: impl Into<Box<str>>) -> Arc<Self> {
        let name = name.into();
        let label_key = label_key.into();
        let labels = vec![(label_key.clone(), name.clone())];
        Arc::new(Self {
            name,
            label_key,
            inner: RwLock::new(SourceInner {
                labels,
                bindings: Vec::new(),
                subordinates: Vec::new(),
                published: None,
            }),
        })
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn label_key(&self) -> &str {
        &self.label_key
    }
    /// Snapshot of the label list, leaf first, then ancestors in link order
    pub fn labels(&self) -> Vec<(Box<str>, Box<str>)> {
        self.inner.read().labels.clone()
    }
    /// Attach `values` at `base`. Rejected with [`StatError::AlreadyExists`]
    /// if a binding with the same array *and* the same base is already
    /// present. If the source is published, one file per descriptor is
    /// materialised immediately.
    ///
    /// ## Safety
    /// `base` must point at the backing object the offsets in `values` were
    /// taken from, and the caller must keep that object alive until it calls
    /// [`Source::revoke`] (or the base is never dereferenced again because
    /// the source itself was torn down first)
    pub unsafe fn bind(
        self: &Arc<Self>,
        values: &'static [ValueDesc],
        base: *mut u8,
    ) -> StatResult<()> {
        let mut inner = self.inner.write();
        if inner
            .bindings
            .iter()
            .any(|b| b.matches_array(values) && b.base == base)
        {
            return Err(StatError::AlreadyExists);
        }
        inner.bindings.push(ValueBinding {
            values,
            base,
            files_created: false,
        });
        if inner.published.is_some() {
            if let Err(e) = publish::publish_pending_bindings(self, &mut *inner) {
                inner.bindings.pop();
                return Err(e);
            }
        }
        Ok(())
    }
    /// Attach `values` as a pure aggregate binding (no storage of its own)
    pub fn bind_aggregates(self: &Arc<Self>, values: &'static [ValueDesc]) -> StatResult<()> {
        unsafe {
            // UNSAFE(@ohsayan): a null base is never dereferenced
            self.bind(values, ptr::null_mut())
        }
    }
    /// Link `child` as a subordinate: the child gains one strong reference,
    /// a deep copy of this node's label list, and (if this node is
    /// published) a directory subtree of its own
    pub fn link(self: &Arc<Self>, child: &Arc<Source>) -> StatResult<()> {
        let mut parent = self.inner.write();
        parent.subordinates.push(Arc::clone(child));
        {
            // parent before child, matching the link direction
            let mut c = child.inner.write();
            let copied: Vec<_> = parent.labels.clone();
            c.labels.extend(copied);
        }
        let published = parent
            .published
            .as_ref()
            .map(|p| (Arc::clone(&p.host), p.dir));
        if let Some((host, dir)) = published {
            if let Err(e) = publish::publish_tree(child, &host, dir) {
                // back the link out; the lock was held throughout, so our
                // push is still the last element
                parent.subordinates.pop();
                let mut c = child.inner.write();
                let keep = c.labels.len() - parent.labels.len();
                c.labels.truncate(keep);
                return Err(e);
            }
        }
        Ok(())
    }
    /// Detach `child` (located by identity). Its published files disappear
    /// and the reference taken by [`Source::link`] is dropped; the node
    /// itself is destroyed only when the last reference goes away.
    pub fn unlink(&self, child: &Arc<Source>) -> StatResult<()> {
        let mut parent = self.inner.write();
        match parent
            .subordinates
            .iter()
            .position(|s| Arc::ptr_eq(s, child))
        {
            Some(idx) => {
                let removed = parent.subordinates.remove(idx);
                drop(parent);
                publish::unpublish_tree(&removed);
                drop(removed);
                Ok(())
            }
            None => Err(StatError::NotFound),
        }
    }
    /// Disconnect every binding on this node (not on children) from its
    /// base. The producer calls this immediately before freeing the backing
    /// object; aggregation silently skips revoked bindings and simple reads
    /// resolve to zero.
    pub fn revoke(&self) {
        let mut inner = self.inner.write();
        for b in inner.bindings.iter_mut() {
            b.base = ptr::null_mut();
        }
    }
}

#[cfg(test)]
impl Source {
    pub(crate) fn binding_count(&self) -> usize {
        self.inner.read().bindings.len()
    }
    pub(crate) fn subordinate_count(&self) -> usize {
        self.inner.read().subordinates.len()
    }
}

impl Drop for Source {
    fn drop(&mut self) {
        // children unlink themselves when their own last reference dies; we
        // only have to take the published directory down with us
        if let Some(p) = self.inner.get_mut().published.take() {
            p.host.remove_recursive(p.dir);
        }
    }
}
