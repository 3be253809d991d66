/*
 * Created on Sat Mar 09 2024
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

use core::fmt;

pub type StatResult<T> = Result<T, StatError>;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
/// Errors surfaced at the facade boundary. Lookup misses *inside* an
/// aggregation walk are never errors; a node that lacks the sought array
/// simply contributes nothing.
pub enum StatError {
    /// descriptor absent from the source, source already torn down, or an
    /// open raced destruction
    NotFound,
    /// a binding with the same value array and the same base already exists
    /// on this source (or a name collision on the publish surface)
    AlreadyExists,
    /// a snapshot or publish step ran past its size cap
    OutOfMemory,
    /// a malformed input: a value-file write that is not the integer zero,
    /// a bad mount option value, or an illegal field name
    InvalidArgument,
}

impl StatError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::OutOfMemory => "out of memory",
            Self::InvalidArgument => "invalid argument",
        }
    }
}

impl fmt::Display for StatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for StatError {}
