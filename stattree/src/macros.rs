/*
 * Created on Sun Mar 10 2024
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

#[cfg(test)]
macro_rules! multi_assert_eq {
    ($($lhs:expr),* => $rhs:expr) => {
        $(assert_eq!($lhs, $rhs);)*
    };
}

/// Build a `[ValueDesc; N]` table of simple (non-aggregate) values over the
/// fields of a backing struct. Offsets are taken from the field layout, so
/// the table stays correct across layout changes:
///
/// ```
/// use stattree::{stat_values, stats::ValueDesc};
/// struct NicCounters {
///     rx: u64,
///     tx: u64,
/// }
/// static NIC_VALUES: [ValueDesc; 2] = stat_values! {
///     NicCounters => {
///         "rx": rx as U64, Cumulative, "bytes received";
///         "tx": tx as U64, Cumulative, "bytes transmitted";
///     }
/// };
/// ```
#[macro_export]
macro_rules! stat_values {
    ($base:ty => { $($name:literal: $field:ident as $ty:ident, $flag:ident, $desc:literal);* $(;)? }) => {
        [$($crate::stats::ValueDesc::new(
            $name,
            $desc,
            ::core::mem::offset_of!($base, $field),
            $crate::stats::ValueType::$ty,
            $crate::stats::AggrKind::None,
            $crate::stats::ValueFlag::$flag,
        )),*]
    };
}
