/*
 * Created on Sat Mar 23 2024
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

//! # Aggregation
//!
//! A value read resolves against the queried source's *own* bindings only;
//! the subtree below contributes when (and only when) the descriptor is an
//! aggregate. During the walk, a binding contributes iff its array pointer
//! is identical to the aggregate's reference array and its base is live;
//! everything else is a silent skip, never an error. The walk holds the
//! root's read lock throughout and takes each descendant's read lock under
//! its parent's.

use {
    super::{
        desc::{AggrKind, ValueDesc},
        source::{Source, SourceInner, ValueBinding},
    },
    crate::error::{StatError, StatResult},
};

/// Running state of one subtree walk. Extremes start at the sentinel values
/// of the 64-bit signed/unsigned space: a walk with no contributors reduces
/// MIN to TypeMax and MAX to TypeMin, by contract.
struct Accumulator {
    signed: bool,
    sum: u64,
    count: u64,
    count_zero: u64,
    min: u64,
    max: u64,
}

impl Accumulator {
    fn new(signed: bool) -> Self {
        Self {
            signed,
            sum: 0,
            count: 0,
            count_zero: 0,
            min: if signed { i64::MAX as u64 } else { u64::MAX },
            max: if signed { i64::MIN as u64 } else { 0 },
        }
    }
    fn fold(&mut self, v: u64) {
        // two's complement addition is sign-agnostic on the bit pattern
        self.sum = self.sum.wrapping_add(v);
        self.count += 1;
        self.count_zero += (v == 0) as u64;
        if self.signed {
            if (v as i64) < (self.min as i64) {
                self.min = v;
            }
            if (v as i64) > (self.max as i64) {
                self.max = v;
            }
        } else {
            if v < self.min {
                self.min = v;
            }
            if v > self.max {
                self.max = v;
            }
        }
    }
    fn reduce(&self, kind: AggrKind) -> u64 {
        match kind {
            AggrKind::Sum => self.sum,
            AggrKind::Min => self.min,
            AggrKind::Max => self.max,
            AggrKind::CountZero => self.count_zero,
            AggrKind::Avg => {
                if self.count == 0 {
                    0
                } else if self.signed {
                    ((self.sum as i64) / (self.count as i64)) as u64
                } else {
                    self.sum / self.count
                }
            }
            // a simple descriptor only lands here through a base-less
            // binding; it has nothing to read
            AggrKind::None => 0,
        }
    }
}

impl Source {
    /// Resolve `desc` on this source and return the 64-bit bit pattern of
    /// the result (reinterpret with `as i64` for signed descriptors). Fails
    /// with [`StatError::NotFound`] if no binding on this source owns the
    /// descriptor.
    pub fn value_of(&self, desc: &ValueDesc) -> StatResult<u64> {
        let inner = self.inner.read();
        let binding = locate(&inner, desc).ok_or(StatError::NotFound)?;
        Ok(read_resolved(&inner, binding, desc))
    }
    /// The by-name variant: subordinates are never searched, and when two
    /// descriptors share a name the binding added first wins
    pub fn value_by_name(&self, name: &str) -> StatResult<u64> {
        let inner = self.inner.read();
        let (binding, desc) = locate_by_name(&inner, name).ok_or(StatError::NotFound)?;
        Ok(read_resolved(&inner, binding, desc))
    }
    /// Zero a simple value, or every contributing simple value in the
    /// subtree for an aggregate (aggregates themselves have no storage)
    pub fn clear(&self, desc: &ValueDesc) -> StatResult<()> {
        let inner = self.inner.read();
        let binding = locate(&inner, desc).ok_or(StatError::NotFound)?;
        clear_resolved(&inner, binding, desc);
        Ok(())
    }
    pub fn clear_by_name(&self, name: &str) -> StatResult<()> {
        let inner = self.inner.read();
        let (binding, desc) = locate_by_name(&inner, name).ok_or(StatError::NotFound)?;
        clear_resolved(&inner, binding, desc);
        Ok(())
    }
}

fn locate<'a>(inner: &'a SourceInner, desc: &ValueDesc) -> Option<&'a ValueBinding> {
    inner.bindings.iter().find(|b| b.owns(desc))
}

fn locate_by_name<'a>(
    inner: &'a SourceInner,
    name: &str,
) -> Option<(&'a ValueBinding, &'static ValueDesc)> {
    for b in &inner.bindings {
        if let Some(d) = b.values.iter().find(|d| d.name() == name) {
            return Some((b, d));
        }
    }
    None
}

fn read_resolved(inner: &SourceInner, binding: &ValueBinding, desc: &ValueDesc) -> u64 {
    if !desc.is_aggregate() {
        return if binding.is_live() {
            unsafe {
                // UNSAFE(@ohsayan): live base, offset taken from this array
                desc.ty().load(binding.base, desc.offset())
            }
        } else {
            // revoked
            0
        };
    }
    let mut acc = Accumulator::new(desc.ty().is_signed());
    accumulate(inner, binding.values, desc, &mut acc);
    acc.reduce(desc.aggr())
}

fn accumulate(
    inner: &SourceInner,
    key: &'static [ValueDesc],
    desc: &ValueDesc,
    acc: &mut Accumulator,
) {
    for b in &inner.bindings {
        if b.is_live() && b.matches_array(key) {
            acc.fold(unsafe {
                // UNSAFE(@ohsayan): identical array, so the offset is valid
                // for this base too
                desc.ty().load(b.base, desc.offset())
            });
        }
    }
    for child in &inner.subordinates {
        let g = child.inner.read();
        accumulate(&g, key, desc, acc);
    }
}

fn clear_resolved(inner: &SourceInner, binding: &ValueBinding, desc: &ValueDesc) {
    if !desc.is_aggregate() {
        if binding.is_live() {
            unsafe {
                // UNSAFE(@ohsayan): live base, offset taken from this array
                desc.ty().store_zero(binding.base, desc.offset())
            }
        }
        return;
    }
    clear_walk(inner, binding.values, desc);
}

fn clear_walk(inner: &SourceInner, key: &'static [ValueDesc], desc: &ValueDesc) {
    for b in &inner.bindings {
        if b.is_live() && b.matches_array(key) {
            unsafe {
                // UNSAFE(@ohsayan): identical array, so the offset is valid
                // for this base too
                desc.ty().store_zero(b.base, desc.offset())
            }
        }
    }
    for child in &inner.subordinates {
        let g = child.inner.read();
        clear_walk(&g, key, desc);
    }
}
