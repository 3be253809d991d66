/*
 * Created on Tue Mar 12 2024
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

use core::ptr;

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
/// The primitive backing a value. Every read is widened to a `u64` bit
/// pattern; signed primitives are sign-extended on the way up, so the caller
/// reinterprets with `as i64` when [`ValueType::is_signed`] says so.
pub enum ValueType {
    U8 = 0,
    U16 = 1,
    U32 = 2,
    U64 = 3,
    Bool = 4,
    S8 = 5,
    S16 = 6,
    S32 = 7,
    S64 = 8,
}

impl ValueType {
    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::S8 | Self::S16 | Self::S32 | Self::S64)
    }
    /// Load the primitive at `base + offset`, widened to the u64 bit pattern.
    ///
    /// Volatile, so a producer racing its own counter update can tear a read
    /// across *different* calls but never within one primitive access.
    ///
    /// ## Safety
    /// `base + offset` must point at a live, aligned primitive of this type
    /// (the binding contract: the producer revokes before freeing)
    pub(crate) unsafe fn load(&self, base: *const u8, offset: usize) -> u64 {
        let p = base.add(offset);
        match self {
            Self::U8 => ptr::read_volatile(p) as u64,
            Self::U16 => ptr::read_volatile(p.cast::<u16>()) as u64,
            Self::U32 => ptr::read_volatile(p.cast::<u32>()) as u64,
            Self::U64 => ptr::read_volatile(p.cast::<u64>()),
            Self::Bool => ptr::read_volatile(p.cast::<bool>()) as u64,
            Self::S8 => ptr::read_volatile(p.cast::<i8>()) as i64 as u64,
            Self::S16 => ptr::read_volatile(p.cast::<i16>()) as i64 as u64,
            Self::S32 => ptr::read_volatile(p.cast::<i32>()) as i64 as u64,
            Self::S64 => ptr::read_volatile(p.cast::<i64>()) as u64,
        }
    }
    /// Write the primitive's zero at `base + offset` (the clear operation)
    ///
    /// ## Safety
    /// Same contract as [`ValueType::load`]
    pub(crate) unsafe fn store_zero(&self, base: *mut u8, offset: usize) {
        let p = base.add(offset);
        match self {
            Self::U8 | Self::S8 => ptr::write_volatile(p, 0),
            Self::U16 | Self::S16 => ptr::write_volatile(p.cast::<u16>(), 0),
            Self::U32 | Self::S32 => ptr::write_volatile(p.cast::<u32>(), 0),
            Self::U64 | Self::S64 => ptr::write_volatile(p.cast::<u64>(), 0),
            Self::Bool => ptr::write_volatile(p.cast::<bool>(), false),
        }
    }
}

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
/// How a value is obtained. [`AggrKind::None`] is a simple value read
/// straight from memory; every other kind is computed by walking the
/// subtree. The dispatch key is the product (signedness, kind), never a
/// packed bitfield.
pub enum AggrKind {
    None = 0,
    Sum = 1,
    Min = 2,
    Max = 3,
    CountZero = 4,
    Avg = 5,
}

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ValueFlag {
    Cumulative = 0,
    Gauge = 1,
}

impl ValueFlag {
    pub const fn schema_name(&self) -> &'static str {
        match self {
            Self::Cumulative => "CUMULATIVE",
            Self::Gauge => "GAUGE",
        }
    }
}

#[derive(Debug)]
/// One immutable schema row: a named, typed field at a byte offset into a
/// backing object, plus how it is aggregated and published. Descriptors are
/// identified by address, so tables are `'static` arrays and a descriptor is
/// never copied out of its table.
pub struct ValueDesc {
    name: &'static str,
    description: &'static str,
    offset: usize,
    ty: ValueType,
    aggr: AggrKind,
    flag: ValueFlag,
    mode: u16,
}

impl ValueDesc {
    const DEFAULT_FILE_MODE: u16 = 0o644;
    pub const fn new(
        name: &'static str,
        description: &'static str,
        offset: usize,
        ty: ValueType,
        aggr: AggrKind,
        flag: ValueFlag,
    ) -> Self {
        Self {
            name,
            description,
            offset,
            ty,
            aggr,
            flag,
            mode: 0,
        }
    }
    /// Override the published file's permission bits (0 selects the default
    /// 0644)
    pub const fn with_mode(mut self, mode: u16) -> Self {
        self.mode = mode;
        self
    }
    pub const fn name(&self) -> &'static str {
        self.name
    }
    pub const fn description(&self) -> &'static str {
        self.description
    }
    pub const fn offset(&self) -> usize {
        self.offset
    }
    pub const fn ty(&self) -> ValueType {
        self.ty
    }
    pub const fn aggr(&self) -> AggrKind {
        self.aggr
    }
    pub const fn flag(&self) -> ValueFlag {
        self.flag
    }
    pub const fn is_aggregate(&self) -> bool {
        !matches!(self.aggr, AggrKind::None)
    }
    pub const fn file_mode(&self) -> u16 {
        if self.mode == 0 {
            Self::DEFAULT_FILE_MODE
        } else {
            self.mode
        }
    }
}
