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

use bytes::{BufMut, BytesMut};

/// Size of the per-open `values` snapshot buffer
pub const VALUES_BUF_SIZE: usize = 64 * 1024;

/// Per-open scratch buffer handed to a metric's producer callback. Row
/// emission is atomic: the row either fits into the remaining space of the
/// 64 KiB snapshot in full, or the cursor stays where it was and this row
/// *and every subsequent one* are dropped. Truncation is the documented
/// policy, not an error.
pub struct Emitter<'a> {
    metric: &'a str,
    declared_fields: usize,
    buf: BytesMut,
    row: BytesMut,
    full: bool,
}

enum RowValue<'v> {
    Int(i64),
    Str(&'v str),
}

impl<'a> Emitter<'a> {
    pub(super) fn new(metric: &'a str, declared_fields: usize) -> Self {
        Self {
            metric,
            declared_fields,
            buf: BytesMut::with_capacity(VALUES_BUF_SIZE),
            row: BytesMut::new(),
            full: false,
        }
    }
    /// Emit one integer-valued row
    pub fn emit_int(&mut self, value: i64, f0: Option<&str>, f1: Option<&str>) {
        self.emit_row(RowValue::Int(value), f0, f1)
    }
    /// Emit one string-valued row (the value is escaped)
    pub fn emit_str(&mut self, value: &str, f0: Option<&str>, f1: Option<&str>) {
        self.emit_row(RowValue::Str(value), f0, f1)
    }
    fn emit_row(&mut self, value: RowValue<'_>, f0: Option<&str>, f1: Option<&str>) {
        if self.full {
            return;
        }
        let provided = f0.is_some() as usize + f1.is_some() as usize;
        if provided != self.declared_fields {
            // diagnostic only; the row still goes out
            log::warn!(
                "metric `{}`: row carries {} field(s) but {} are declared",
                self.metric,
                provided,
                self.declared_fields
            );
        }
        self.row.clear();
        for field in [f0, f1].into_iter().flatten() {
            escape_into(&mut self.row, field);
            self.row.put_u8(b' ');
        }
        match value {
            RowValue::Int(i) => self.row.extend_from_slice(i.to_string().as_bytes()),
            RowValue::Str(s) => escape_into(&mut self.row, s),
        }
        self.row.put_u8(b'\n');
        if self.buf.len() + self.row.len() > VALUES_BUF_SIZE {
            self.full = true;
            return;
        }
        self.buf.extend_from_slice(&self.row);
    }
    pub(super) fn into_bytes(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

pub(super) fn escape_into(buf: &mut BytesMut, s: &str) {
    for &b in s.as_bytes() {
        match b {
            b'\\' => buf.extend_from_slice(b"\\\\"),
            b' ' => buf.extend_from_slice(b"\\ "),
            b'\n' => buf.extend_from_slice(b"\\n"),
            _ => buf.put_u8(b),
        }
    }
}

/// Escape a field or string value the way the `values` file does: `\`
/// escapes itself and space, and a newline becomes `\n`
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ' ' => out.push_str("\\ "),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// The reader-side inverse of [`escape`]: interprets `\\`, `\ ` and `\n`.
/// Unknown escapes pass through untouched.
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut it = s.chars();
    while let Some(c) = it.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match it.next() {
            Some('\\') => out.push('\\'),
            Some(' ') => out.push(' '),
            Some('n') => out.push('\n'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
