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

mod aggr;
mod desc;
mod source;
#[cfg(test)]
mod tests;

pub use self::{
    desc::{AggrKind, ValueDesc, ValueFlag, ValueType},
    source::Source,
};
pub(crate) use self::source::SourceInner;
