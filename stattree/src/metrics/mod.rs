/*
 * Created on Sun May 05 2024
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

//! # Metric tables
//!
//! The second, independent facade: a registered metric is a producer
//! callback plus a little schema (description, up to two field names, value
//! kind, cumulative flag), published as four files under
//! `<subsys>/<metric>/`. Every open of `values` allocates a private 64 KiB
//! snapshot, runs the callback once against it, and serves the frozen bytes
//! back through a plain cursor until the open closes.
//!
//! Callbacks run on the opener's thread with no registry or host lock held;
//! they must not block on locks that can in turn wait on an open.

mod emit;

pub use emit::{escape, unescape, Emitter, VALUES_BUF_SIZE};

use {
    crate::{
        error::{StatError, StatResult},
        publish::{NodeId, PublishHost},
    },
    bytes::BytesMut,
    parking_lot::RwLock,
    std::{
        collections::{hash_map::Entry, HashMap},
        sync::{Arc, Weak},
    },
};

pub const ANNOTATIONS_BUF_SIZE: usize = 1024;
pub const FIELDS_BUF_SIZE: usize = 1024;
pub const VERSION_BUF_SIZE: usize = 8;

const VERSION_PAYLOAD: &[u8] = b"1\n";
const _: () = assert!(VERSION_PAYLOAD.len() <= VERSION_BUF_SIZE);

const FILE_ANNOTATIONS: &str = "annotations";
const FILE_FIELDS: &str = "fields";
const FILE_VALUES: &str = "values";
const FILE_VERSION: &str = "version";

type MetricFn = Box<dyn Fn(&mut Emitter<'_>) + Send + Sync>;

/// Definition of a metric, handed to [`MetricsRegistry::register`]
pub struct MetricDef {
    name: Box<str>,
    description: Box<str>,
    fields: Vec<Box<str>>,
    string_valued: bool,
    cumulative: bool,
    producer: MetricFn,
}

impl MetricDef {
    fn new(
        name: impl Into<Box<str>>,
        description: impl Into<Box<str>>,
        string_valued: bool,
        producer: impl Fn(&mut Emitter<'_>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            fields: Vec::new(),
            string_valued,
            cumulative: false,
            producer: Box::new(producer),
        }
    }
    /// An integer-valued metric
    pub fn new_int(
        name: impl Into<Box<str>>,
        description: impl Into<Box<str>>,
        producer: impl Fn(&mut Emitter<'_>) + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, description, false, producer)
    }
    /// A string-valued metric
    pub fn new_str(
        name: impl Into<Box<str>>,
        description: impl Into<Box<str>>,
        producer: impl Fn(&mut Emitter<'_>) + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, description, true, producer)
    }
    /// Declare a field (at most two; validated at registration)
    pub fn field(mut self, name: impl Into<Box<str>>) -> Self {
        self.fields.push(name.into());
        self
    }
    pub fn cumulative(mut self) -> Self {
        self.cumulative = true;
        self
    }
}

/// A registered metric. Refcounted the same way sources are: the registry
/// holds the strong reference, cookies hold weak ones, and every open of a
/// metric file pins it for the open's lifetime.
pub struct Metric {
    name: Box<str>,
    description: Box<str>,
    fields: Vec<Box<str>>,
    string_valued: bool,
    cumulative: bool,
    producer: MetricFn,
}

impl Metric {
    pub fn name(&self) -> &str {
        &self.name
    }
    fn render_annotations(&self) -> StatResult<Vec<u8>> {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"DESCRIPTION \"");
        emit::escape_into(&mut buf, &self.description);
        buf.extend_from_slice(b"\"\n");
        if self.cumulative {
            buf.extend_from_slice(b"CUMULATIVE\n");
        }
        if buf.len() > ANNOTATIONS_BUF_SIZE {
            return Err(StatError::OutOfMemory);
        }
        Ok(buf.to_vec())
    }
    fn render_fields(&self) -> StatResult<Vec<u8>> {
        let mut buf = BytesMut::new();
        for f in &self.fields {
            buf.extend_from_slice(f.as_bytes());
            buf.extend_from_slice(b" ");
        }
        buf.extend_from_slice(b"value\n");
        for _ in &self.fields {
            buf.extend_from_slice(b"str ");
        }
        buf.extend_from_slice(if self.string_valued { b"str\n" } else { b"int\n" });
        if buf.len() > FIELDS_BUF_SIZE {
            return Err(StatError::OutOfMemory);
        }
        Ok(buf.to_vec())
    }
    fn snapshot_values(&self) -> Vec<u8> {
        let mut emitter = Emitter::new(&self.name, self.fields.len());
        (self.producer)(&mut emitter);
        emitter.into_bytes()
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum MetricFileKind {
    Annotations = 0,
    Fields = 1,
    Values = 2,
    Version = 3,
}

#[derive(Clone)]
/// Inode payload for one of the four files of a metric
pub struct MetricCookie {
    metric: Weak<Metric>,
    kind: MetricFileKind,
}

impl MetricCookie {
    fn new(metric: &Arc<Metric>, kind: MetricFileKind) -> Self {
        Self {
            metric: Arc::downgrade(metric),
            kind,
        }
    }
    /// Build the per-open snapshot and pin the metric for the open's
    /// lifetime. Over-long `annotations`/`fields` renderings fail the whole
    /// open with [`StatError::OutOfMemory`]; `values` truncates instead.
    pub fn open(&self) -> StatResult<(Vec<u8>, Arc<Metric>)> {
        let metric = self.metric.upgrade().ok_or(StatError::NotFound)?;
        let buf = match self.kind {
            MetricFileKind::Annotations => metric.render_annotations()?,
            MetricFileKind::Fields => metric.render_fields()?,
            MetricFileKind::Values => metric.snapshot_values(),
            MetricFileKind::Version => VERSION_PAYLOAD.to_vec(),
        };
        Ok((buf, metric))
    }
}

struct Registered {
    metric: Arc<Metric>,
    dir: NodeId,
}

struct Subsystem {
    dir: NodeId,
    metrics: HashMap<Box<str>, Registered>,
}

/// Handle to the metrics surface of a mount; the companion of
/// [`crate::publish::StatsMount`]
pub struct MetricsRegistry {
    host: Arc<dyn PublishHost>,
    root: NodeId,
    subsystems: RwLock<HashMap<Box<str>, Subsystem>>,
}

impl MetricsRegistry {
    pub fn open(host: Arc<dyn PublishHost>) -> Self {
        let root = host.mount_root();
        Self {
            host,
            root,
            subsystems: RwLock::new(HashMap::new()),
        }
    }
    /// Publish `def` as `<subsys>/<name>/{annotations,fields,values,version}`
    pub fn register(&self, subsys: &str, def: MetricDef) -> StatResult<()> {
        if def.fields.len() > 2 {
            return Err(StatError::InvalidArgument);
        }
        // field names travel unescaped in the header line
        for f in &def.fields {
            if f.is_empty() || f.contains(' ') || f.contains('"') {
                return Err(StatError::InvalidArgument);
            }
        }
        let mut subsystems = self.subsystems.write();
        let sub = match subsystems.entry(Box::from(subsys)) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => {
                let dir = self.host.create_dir(subsys, self.root)?;
                v.insert(Subsystem {
                    dir,
                    metrics: HashMap::new(),
                })
            }
        };
        if sub.metrics.contains_key(&def.name) {
            return Err(StatError::AlreadyExists);
        }
        let metric = Arc::new(Metric {
            name: def.name,
            description: def.description,
            fields: def.fields,
            string_valued: def.string_valued,
            cumulative: def.cumulative,
            producer: def.producer,
        });
        let dir = self.host.create_dir(&metric.name, sub.dir)?;
        if let Err(e) = self.create_metric_files(&metric, dir) {
            self.host.remove_recursive(dir);
            return Err(e);
        }
        log::debug!("registered metric `{}/{}`", subsys, metric.name);
        sub.metrics.insert(
            metric.name.clone(),
            Registered { metric, dir },
        );
        Ok(())
    }
    fn create_metric_files(&self, metric: &Arc<Metric>, dir: NodeId) -> StatResult<()> {
        for (name, kind) in [
            (FILE_ANNOTATIONS, MetricFileKind::Annotations),
            (FILE_FIELDS, MetricFileKind::Fields),
            (FILE_VALUES, MetricFileKind::Values),
            (FILE_VERSION, MetricFileKind::Version),
        ] {
            self.host
                .create_metric_file(name, dir, MetricCookie::new(metric, kind))?;
        }
        Ok(())
    }
    /// Drop a metric from the surface. Snapshots of still-open files stay
    /// readable; the metric object dies with its last open.
    pub fn unregister(&self, subsys: &str, name: &str) -> StatResult<()> {
        let mut subsystems = self.subsystems.write();
        let sub = subsystems.get_mut(subsys).ok_or(StatError::NotFound)?;
        let registered = sub.metrics.remove(name).ok_or(StatError::NotFound)?;
        self.host.remove_recursive(registered.dir);
        log::debug!("unregistered metric `{subsys}/{name}`");
        Ok(())
    }
}
