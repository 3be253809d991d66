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

use {crate::stats::Source, bytes::BytesMut};

/// Render the `.schema` snapshot: the label list (leaf first, then
/// ancestors in link order) followed by one METRIC block per descriptor
/// across every binding, in binding order:
///
/// ```text
/// LABEL
/// <key> <value>
/// …
///
/// METRIC
/// NAME <name>
/// FLAG <CUMULATIVE|GAUGE>
/// TYPE INT
/// DESC <description>
/// ```
pub(crate) fn render(src: &Source) -> Vec<u8> {
    let inner = src.inner.read();
    let mut buf = BytesMut::new();
    buf.extend_from_slice(b"LABEL\n");
    for (key, value) in &inner.labels {
        buf.extend_from_slice(key.as_bytes());
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\n");
    }
    for binding in &inner.bindings {
        for desc in binding.values {
            buf.extend_from_slice(b"\nMETRIC\n");
            buf.extend_from_slice(b"NAME ");
            buf.extend_from_slice(desc.name().as_bytes());
            buf.extend_from_slice(b"\nFLAG ");
            buf.extend_from_slice(desc.flag().schema_name().as_bytes());
            buf.extend_from_slice(b"\nTYPE INT\nDESC ");
            buf.extend_from_slice(desc.description().as_bytes());
            buf.extend_from_slice(b"\n");
        }
    }
    buf.to_vec()
}
