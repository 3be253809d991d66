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

//! # Stattree
//!
//! Two telemetry facades over one virtual filesystem surface:
//!
//! - the **stats source tree** ([`stats`]): named, reference-counted nodes
//!   carrying typed value descriptors bound to producer memory, with
//!   recursive SUM/MIN/MAX/AVG/COUNT_ZERO aggregation across subtrees;
//! - the **metric tables** ([`metrics`]): producer callbacks rendered into
//!   per-open snapshot buffers with atomic row emission and escaping.
//!
//! Both surfaces publish through the [`publish::PublishHost`] seam; the
//! in-memory host ([`publish::MemFs`]) is the reference implementation and
//! what the test suite drives. Producers construct sources, bind value
//! arrays pointing into their own structs, link sources into a tree and
//! register the root on a mount; readers open files and the adapter
//! resolves, locks, aggregates and renders.

#[macro_use]
mod macros;
pub mod config;
pub mod error;
pub mod metrics;
pub mod publish;
pub mod stats;

pub use self::{
    config::MountOptions,
    error::{StatError, StatResult},
};
